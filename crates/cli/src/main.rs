use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use autogan_common::{AutoGanConfig, FrequencyCadence, LossRecord, PairedImageLoader};
use autogan_plot::LossPlotter;
use autogan_train::{
    AutoGanTrainer, LossLogger, LrPolicy, LrScheduler, StepExecutor, TrainerConfig,
    ValidationLosses, LOSS_LOG_FILE,
};

#[derive(Parser, Debug)]
#[command(name = "autogan", about = "Adaptive-frequency pix2pix training")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a generator/discriminator pair on an aligned dataset.
    Train(TrainArgs),
    /// Render graph.png from an experiment's loss log.
    Plot(PlotArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FrequencyUpdate {
    Epoch,
    Steps,
}

// ── Train ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Dataset root containing `train/` and optionally `val/`.
    #[arg(long)]
    dataroot: PathBuf,
    #[arg(long, default_value = "experiment")]
    name: String,
    #[arg(long, default_value = "checkpoints")]
    checkpoints_dir: PathBuf,
    /// Model config; created with defaults if missing. Defaults to
    /// `<checkpoints-dir>/<name>/config.json`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Epochs at the initial learning rate.
    #[arg(long, default_value_t = 100)]
    n_epochs: usize,
    /// Epochs of linear learning-rate decay afterwards.
    #[arg(long, default_value_t = 100)]
    n_epochs_decay: usize,
    #[arg(long, default_value = "linear", value_parser = ["linear", "constant"])]
    lr_policy: String,
    /// Resume from `latest_net_*.safetensors` in the experiment directory.
    #[arg(long)]
    continue_train: bool,
    /// Starting epoch (use with --continue-train).
    #[arg(long, default_value_t = 1)]
    epoch_count: usize,
    #[arg(long, default_value_t = 1)]
    batch_size: usize,
    /// Steps between loss-log lines (and validation passes).
    #[arg(long, default_value_t = 100)]
    print_freq: usize,
    #[arg(long, default_value_t = 5)]
    save_epoch_freq: usize,
    /// Override the config's update-frequency cadence.
    #[arg(long, value_enum)]
    frequency_update: Option<FrequencyUpdate>,
    #[arg(long, default_value_t = 100)]
    frequency_update_steps: usize,
    #[arg(long)]
    no_flip: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Re-render graph.png after every epoch.
    #[arg(long)]
    plot: bool,
    #[arg(long, default_value_t = 1)]
    smooth: usize,
}

// ── Plot ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct PlotArgs {
    #[arg(long, default_value = "experiment")]
    name: String,
    #[arg(long, default_value = "checkpoints")]
    checkpoints_dir: PathBuf,
    /// Centred rolling-average window (odd; 1 = none).
    #[arg(long, default_value_t = 1)]
    smooth: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => cmd_train(args),
        Command::Plot(args) => cmd_plot(args),
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn load_or_create_config(path: &Path) -> Result<AutoGanConfig> {
    if path.exists() {
        AutoGanConfig::load(path).with_context(|| format!("load config {}", path.display()))
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let default = AutoGanConfig::default();
        default.save(path)?;
        eprintln!("Created default config at {}", path.display());
        Ok(default)
    }
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let exp_dir = args.checkpoints_dir.join(&args.name);
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| exp_dir.join("config.json"));
    let mut config = load_or_create_config(&config_path)?;
    match args.frequency_update {
        Some(FrequencyUpdate::Epoch) => config.frequency_cadence = FrequencyCadence::Epoch,
        Some(FrequencyUpdate::Steps) => {
            anyhow::ensure!(
                args.frequency_update_steps > 0,
                "--frequency-update-steps must be positive"
            );
            config.frequency_cadence = FrequencyCadence::Steps(args.frequency_update_steps);
        }
        None => {}
    }

    let trainer_config = TrainerConfig {
        n_epochs: args.n_epochs,
        n_epochs_decay: args.n_epochs_decay,
        epoch_count: args.epoch_count,
        batch_size: args.batch_size,
        print_freq: args.print_freq.max(1),
        save_epoch_freq: args.save_epoch_freq.max(1),
        flip: !args.no_flip,
        seed: args.seed.unwrap_or_else(rand::random),
        output_dir: exp_dir.clone(),
    };

    let device = Device::cuda_if_available(0)?;
    let mut loader = PairedImageLoader::new(
        &args.dataroot,
        &config,
        trainer_config.batch_size,
        trainer_config.flip,
        trainer_config.seed,
    )?;
    tracing::info!(
        samples = loader.num_samples(),
        batches = loader.num_batches(),
        seed = trainer_config.seed,
        cadence = ?config.frequency_cadence,
        "Dataset loaded"
    );

    let mut executor = StepExecutor::new(&config, device.clone())?;
    if args.continue_train {
        executor
            .load(&exp_dir, "latest")
            .with_context(|| format!("resume from {}", exp_dir.display()))?;
        eprintln!("Resumed from {}", exp_dir.display());
    }
    config.save(&exp_dir.join("config.json"))?;

    let mut scheduler = LrScheduler::new(
        config.lr,
        trainer_config.n_epochs,
        trainer_config.n_epochs_decay,
        trainer_config.epoch_count,
        LrPolicy::from_str(&args.lr_policy),
    );
    executor.set_learning_rate(scheduler.current_lr());

    let mut trainer = AutoGanTrainer::new(executor, &config);
    let mut logger = LossLogger::open(&exp_dir)?;
    let plotter = LossPlotter::new(&exp_dir, LOSS_LOG_FILE).with_smoothing(args.smooth);

    let style = ProgressStyle::default_bar()
        .template("epoch {msg} [{elapsed_precise}] {bar:40} {pos}/{len}")?
        .progress_chars("=>-");
    let mut latest_val = ValidationLosses::default();

    for epoch in trainer_config.epoch_count..=trainer_config.last_epoch() {
        let epoch_start = Instant::now();
        let mut epoch_iter = 0usize;
        loader.shuffle();

        let pb = ProgressBar::new(loader.num_batches() as u64);
        pb.set_style(style.clone());
        pb.set_message(epoch.to_string());

        for b in 0..loader.num_batches() {
            let data_start = Instant::now();
            let batch = loader.batch(b, &device)?;
            let t_data = data_start.elapsed().as_secs_f64();
            let batch_len = batch.real_a.dim(0)?;

            let step_start = Instant::now();
            let losses = trainer.optimize_step(&batch)?;
            trainer.on_step_end()?;
            epoch_iter += batch_len;

            if trainer.global_step % trainer_config.print_freq == 0 {
                if let Some(v) = trainer.validate(&batch)? {
                    latest_val = v;
                }
                let t_comp = step_start.elapsed().as_secs_f64() / batch_len as f64;
                let records: Vec<LossRecord> = losses
                    .records()
                    .into_iter()
                    .chain(latest_val.records())
                    .collect();
                pb.suspend(|| logger.log(epoch, epoch_iter, t_comp, t_data, &records))?;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        trainer.on_epoch_end()?;

        if epoch % trainer_config.save_epoch_freq == 0 {
            let executor = trainer.step_executor();
            executor.save(&exp_dir, "latest")?;
            executor.save(&exp_dir, &epoch.to_string())?;
            tracing::info!(epoch, total_steps = trainer.global_step, "Saved checkpoints");
        }

        let (_, lr) = scheduler.advance();
        trainer.step_executor_mut().set_learning_rate(lr);

        tracing::info!(
            epoch,
            last_epoch = trainer_config.last_epoch(),
            secs = epoch_start.elapsed().as_secs(),
            counter = trainer.controller().counter(),
            "End of epoch"
        );

        if args.plot {
            if let Some(path) = plotter.plot()? {
                tracing::debug!(path = %path.display(), "Chart updated");
            }
        }
    }

    let (g_path, _) = trainer.step_executor().save(&exp_dir, "latest")?;
    eprintln!("Training done. Saved to {}", g_path.display());
    Ok(())
}

fn cmd_plot(args: PlotArgs) -> Result<()> {
    let exp_dir = args.checkpoints_dir.join(&args.name);
    let plotter = LossPlotter::new(&exp_dir, LOSS_LOG_FILE).with_smoothing(args.smooth);
    match plotter
        .plot()
        .with_context(|| format!("plot {}", plotter.log_path().display()))?
    {
        Some(path) => eprintln!("Wrote {}", path.display()),
        None => eprintln!("Fewer than two epochs logged; nothing to plot"),
    }
    Ok(())
}
