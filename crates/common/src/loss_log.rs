//! Loss records and the text format of `loss_log.txt`.
//!
//! One line per logged step:
//!
//! ```text
//! (epoch: 3, iters: 400, time: 0.051, data: 0.002) G_GAN: 0.912 G_L1: 0.083 D_real: 0.604 D_fake: 0.551 val_G_GAN: 0.887 val_G_L1: 0.091 SSIM: 0.612 PSNR: 20.734
//! ```
//!
//! Lines starting with `=` (run headers) or shorter than 26 characters are
//! separators and are skipped by readers.

use std::fmt;

use crate::error::{AutoGanError, Result};

/// Lines shorter than this carry no step record.
pub const MIN_RECORD_LINE_LEN: usize = 26;

// ── Loss names ──────────────────────────────────────────────────────────────

/// Role of a logged scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossName {
    GGan,
    GL1,
    DReal,
    DFake,
    ValGGan,
    ValGL1,
    Ssim,
    Psnr,
}

impl LossName {
    /// Every name, in log order.
    pub const ALL: [LossName; 8] = [
        LossName::GGan,
        LossName::GL1,
        LossName::DReal,
        LossName::DFake,
        LossName::ValGGan,
        LossName::ValGL1,
        LossName::Ssim,
        LossName::Psnr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GGan => "G_GAN",
            Self::GL1 => "G_L1",
            Self::DReal => "D_real",
            Self::DFake => "D_fake",
            Self::ValGGan => "val_G_GAN",
            Self::ValGL1 => "val_G_L1",
            Self::Ssim => "SSIM",
            Self::Psnr => "PSNR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == s)
    }

    /// Position in [`LossName::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LossName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar loss or metric tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossRecord {
    pub name: LossName,
    pub value: f32,
}

impl LossRecord {
    pub fn new(name: LossName, value: f32) -> Self {
        Self { name, value }
    }
}

// ── Log lines ───────────────────────────────────────────────────────────────

/// One parsed (or to-be-written) step line.
#[derive(Debug, Clone, PartialEq)]
pub struct LossLogLine {
    pub epoch: usize,
    pub iters: usize,
    /// Seconds of compute per sample.
    pub time: f64,
    /// Seconds of data loading per sample.
    pub data: f64,
    /// Values indexed by [`LossName::index`].
    pub values: [f32; 8],
}

impl LossLogLine {
    pub fn new(epoch: usize, iters: usize, time: f64, data: f64, records: &[LossRecord]) -> Self {
        let mut values = [0.0f32; 8];
        for r in records {
            values[r.name.index()] = r.value;
        }
        Self {
            epoch,
            iters,
            time,
            data,
            values,
        }
    }

    pub fn get(&self, name: LossName) -> f32 {
        self.values[name.index()]
    }

    /// Format as a log line (no trailing newline).
    pub fn format(&self) -> String {
        let mut line = format!(
            "(epoch: {}, iters: {}, time: {:.3}, data: {:.3}) ",
            self.epoch, self.iters, self.time, self.data
        );
        for name in LossName::ALL {
            line.push_str(&format!("{}: {:.3} ", name, self.get(name)));
        }
        line
    }

    /// Parse one line. `Ok(None)` for header/separator lines.
    ///
    /// A run of `=` glued onto the last value (a header written without a
    /// preceding newline) is tolerated; anything else that does not match the
    /// format is [`AutoGanError::MalformedLogLine`].
    pub fn parse(line: &str, line_no: usize) -> Result<Option<Self>> {
        // Length is measured without the line terminator.
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with('=') || line.len() < MIN_RECORD_LINE_LEN {
            return Ok(None);
        }
        let malformed = |reason: String| AutoGanError::MalformedLogLine {
            line: line_no,
            reason,
        };

        let normalised = line.replace([':', ','], " ");
        let mut tokens = normalised.split_whitespace();

        if tokens.next() != Some("(epoch") {
            return Err(malformed("missing '(epoch' prefix".to_string()));
        }
        let epoch = parse_num::<usize>(tokens.next(), "epoch").map_err(malformed)?;
        expect_key(tokens.next(), "iters").map_err(malformed)?;
        let iters = parse_num::<usize>(tokens.next(), "iters").map_err(malformed)?;
        expect_key(tokens.next(), "time").map_err(malformed)?;
        let time = parse_num::<f64>(tokens.next(), "time").map_err(malformed)?;
        expect_key(tokens.next(), "data").map_err(malformed)?;
        let data_tok = tokens.next().map(|t| t.trim_end_matches(')'));
        let data = parse_num::<f64>(data_tok, "data").map_err(malformed)?;

        let mut values = [0.0f32; 8];
        let mut seen = [false; 8];
        while let Some(key) = tokens.next() {
            let name = LossName::from_str(key)
                .ok_or_else(|| malformed(format!("unknown field '{key}'")))?;
            let raw = tokens
                .next()
                .ok_or_else(|| malformed(format!("missing value for {name}")))?;
            // Separator merged onto the value: keep the numeric prefix and
            // drop the rest of the line.
            let (raw, merged) = match raw.find('=') {
                Some(pos) => (&raw[..pos], true),
                None => (raw, false),
            };
            values[name.index()] = raw
                .parse::<f32>()
                .map_err(|e| malformed(format!("{name} value '{raw}': {e}")))?;
            seen[name.index()] = true;
            if merged {
                break;
            }
        }
        if let Some(missing) = LossName::ALL.into_iter().find(|n| !seen[n.index()]) {
            return Err(malformed(format!("missing field {missing}")));
        }

        Ok(Some(Self {
            epoch,
            iters,
            time,
            data,
            values,
        }))
    }
}

fn expect_key(tok: Option<&str>, key: &str) -> std::result::Result<(), String> {
    match tok {
        Some(t) if t == key => Ok(()),
        Some(t) => Err(format!("expected '{key}', found '{t}'")),
        None => Err(format!("missing '{key}'")),
    }
}

fn parse_num<T>(tok: Option<&str>, field: &str) -> std::result::Result<T, String>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let tok = tok.ok_or_else(|| format!("missing {field}"))?;
    tok.parse::<T>()
        .map_err(|e| format!("{field} value '{tok}': {e}"))
}

/// Parse a whole log, skipping separators.
pub fn parse_loss_log(text: &str) -> Result<Vec<LossLogLine>> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(parsed) = LossLogLine::parse(line, i + 1)? {
            out.push(parsed);
        }
    }
    Ok(out)
}

/// Header written at the start of every training run.
pub fn run_header(timestamp: &str) -> String {
    format!("================ Training Loss ({timestamp}) ================")
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> LossLogLine {
        let records: Vec<LossRecord> = LossName::ALL
            .into_iter()
            .enumerate()
            .map(|(i, n)| LossRecord::new(n, 0.25 * (i as f32 + 1.0)))
            .collect();
        LossLogLine::new(3, 400, 0.051, 0.002, &records)
    }

    #[test]
    fn formatted_line_parses_back() {
        let line = sample_line();
        let text = line.format();
        assert!(text.starts_with("(epoch: 3, iters: 400, time: 0.051, data: 0.002) G_GAN: 0.250"));
        let parsed = LossLogLine::parse(&text, 1).unwrap().unwrap();
        assert_eq!(parsed.epoch, 3);
        assert_eq!(parsed.iters, 400);
        assert_eq!(parsed.get(LossName::Psnr), 2.0);
        assert_eq!(parsed.get(LossName::DReal), 0.75);
    }

    #[test]
    fn separators_are_skipped() {
        assert!(LossLogLine::parse(&run_header("2024-01-01"), 1)
            .unwrap()
            .is_none());
        assert!(LossLogLine::parse("short line", 2).unwrap().is_none());
        assert!(LossLogLine::parse("", 3).unwrap().is_none());
    }

    #[test]
    fn terminator_does_not_count_towards_length() {
        let short = "x".repeat(MIN_RECORD_LINE_LEN - 1);
        assert!(LossLogLine::parse(&format!("{short}\n"), 1).unwrap().is_none());
        assert!(LossLogLine::parse(&format!("{short}\r\n"), 2).unwrap().is_none());
        // Long enough without the newline, so it must parse as a record.
        let long = "x".repeat(MIN_RECORD_LINE_LEN);
        assert!(matches!(
            LossLogLine::parse(&long, 3),
            Err(AutoGanError::MalformedLogLine { line: 3, .. })
        ));
    }

    #[test]
    fn merged_separator_is_tolerated() {
        let text = format!("{}{}", sample_line().format().trim_end(), run_header("x"));
        let parsed = LossLogLine::parse(&text, 1).unwrap().unwrap();
        assert_eq!(parsed.get(LossName::Psnr), 2.0);
    }

    #[test]
    fn missing_field_is_malformed() {
        let text = "(epoch: 1, iters: 10, time: 0.1, data: 0.1) G_GAN: 0.5 G_L1: 0.1 ";
        let err = LossLogLine::parse(text, 4).unwrap_err();
        assert!(matches!(err, AutoGanError::MalformedLogLine { line: 4, .. }));
    }

    #[test]
    fn non_numeric_value_is_malformed() {
        let text = sample_line().format().replace("G_L1: 0.500", "G_L1: abc");
        assert!(matches!(
            LossLogLine::parse(&text, 2),
            Err(AutoGanError::MalformedLogLine { .. })
        ));
    }

    #[test]
    fn unrecognised_line_is_malformed() {
        let text = "this line is long enough but is not a record";
        assert!(LossLogLine::parse(text, 1).is_err());
    }

    #[test]
    fn whole_log() {
        let text = format!(
            "{}\n{}\n{}\n",
            run_header("t"),
            sample_line().format(),
            sample_line().format()
        );
        let lines = parse_loss_log(&text).unwrap();
        assert_eq!(lines.len(), 2);
    }
}
