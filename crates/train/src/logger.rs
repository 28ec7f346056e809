//! Appending writer for `loss_log.txt`.
//!
//! Every run opens the file in append mode and writes a timestamped header;
//! each logged step becomes one [`LossLogLine`] and is echoed through
//! `tracing`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use autogan_common::{run_header, LossLogLine, LossRecord, Result};

pub const LOSS_LOG_FILE: &str = "loss_log.txt";

pub struct LossLogger {
    path: PathBuf,
    file: File,
}

impl LossLogger {
    /// Open `<dir>/loss_log.txt` for appending and write the run header.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOSS_LOG_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let timestamp = chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string();
        writeln!(file, "{}", run_header(&timestamp))?;
        Ok(Self { path, file })
    }

    /// Append one step line.
    pub fn log(
        &mut self,
        epoch: usize,
        iters: usize,
        time: f64,
        data: f64,
        records: &[LossRecord],
    ) -> Result<LossLogLine> {
        let line = LossLogLine::new(epoch, iters, time, data, records);
        let text = line.format();
        tracing::info!("{text}");
        writeln!(self.file, "{text}")?;
        self.file.flush()?;
        Ok(line)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autogan_common::{parse_loss_log, LossName};

    #[test]
    fn appends_header_per_run() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut logger = LossLogger::open(dir.path()).unwrap();
            let records = [
                LossRecord::new(LossName::GGan, 0.5),
                LossRecord::new(LossName::Psnr, 21.25),
            ];
            logger.log(1, 4, 0.25, 0.125, &records).unwrap();
        }
        let mut logger = LossLogger::open(dir.path()).unwrap();
        logger
            .log(2, 8, 0.5, 0.0, &[LossRecord::new(LossName::DFake, 0.75)])
            .unwrap();

        let text = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with('=')).count(), 2);

        let lines = parse_loss_log(&text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].epoch, 1);
        assert_eq!(lines[0].get(LossName::Psnr), 21.25);
        assert_eq!(lines[1].get(LossName::DFake), 0.75);
        assert_eq!(lines[1].get(LossName::GGan), 0.0);
    }
}
