use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use simultrans::checkpoint::{load_run_config, save_run_config, CheckpointManager};
use simultrans::config::{AppConfig, ConfigOverrides, Workspace};
use simultrans::corpus::{Corpus, TextCorpus};
use simultrans::decode::{CopyTranslator, SimultaneousDecoder};
use simultrans::policy::{self, PolicyKind};
use simultrans::stats::RewardType;
use simultrans::training::{JsonlMonitor, TrainOutcome, Trainer, Validator};

/// Train a simultaneous translation read/write policy.
#[derive(Parser)]
#[command(name = "train", about = "Train a simultaneous translation policy")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Run id; reuses the stored configuration and checkpoints of that run
    #[arg(long)]
    id: Option<String>,

    /// Workspace root holding .policy, .config, .translate and .log
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long)]
    train_source: Option<PathBuf>,

    #[arg(long)]
    train_target: Option<PathBuf>,

    #[arg(long)]
    valid_source: Option<PathBuf>,

    #[arg(long)]
    valid_target: Option<PathBuf>,

    /// Policy to train: wait_k or linear
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Reward function: A, B, C or D (or 0-3)
    #[arg(long)]
    reward: Option<RewardType>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Sampled episodes per sentence
    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Skip training pairs whose source has at most this many tokens
    #[arg(long)]
    min_source_len: Option<usize>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Override policy learning rate
    #[arg(long)]
    lr: Option<f32>,

    /// Validate once and exit with status 2
    #[arg(long)]
    upper: bool,

    /// Append windowed averages to .log/<id>.jsonl
    #[arg(long)]
    remote: bool,

    /// Finetune the translator during training
    #[arg(long)]
    finetune: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let flag = |set: bool| set.then_some(true);
        ConfigOverrides {
            workspace: self.workspace.clone(),
            seed: self.seed,
            batch_size: self.batch_size,
            samples: self.samples,
            reward_type: self.reward,
            policy: self.policy,
            learning_rate: self.lr,
            min_source_len: self.min_source_len,
            upper: flag(self.upper),
            remote: flag(self.remote),
            max_iterations: self.max_iterations,
            finetune: flag(self.finetune),
            train_source: self.train_source.clone(),
            train_target: self.train_target.clone(),
            valid_source: self.valid_source.clone(),
            valid_target: self.valid_target.clone(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if cli.dump_config {
        println!("{}", AppConfig::default_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let base = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let overrides = cli.overrides();

    let run_id = match &cli.id {
        Some(id) => id.clone(),
        None => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("run-{secs}")
        }
    };
    let stored = match &cli.id {
        Some(id) => {
            let root = overrides
                .workspace
                .clone()
                .unwrap_or_else(|| base.training.workspace.clone());
            load_run_config(&Workspace::new(root), id)
                .with_context(|| format!("loading stored config of run {id}"))?
        }
        None => None,
    };
    if stored.is_some() {
        info!(run_id = %run_id, "using stored run configuration");
    }

    let config = AppConfig::layered(base, stored, &overrides)?;
    let workspace = config.workspace();
    workspace
        .prepare()
        .with_context(|| format!("preparing workspace {}", workspace.root().display()))?;
    save_run_config(&workspace, &run_id, &config)?;

    info!(run_id = %run_id, "use the reward function {}", config.reward.kind);
    let mut rng = StdRng::seed_from_u64(config.training.seed);

    let corpus = &config.corpus;
    let mut train = TextCorpus::open(
        &corpus.train_source,
        &corpus.train_target,
        corpus.batch_size,
        Some(corpus.max_len),
    )
    .context("loading training corpus")?;
    let mut valid = TextCorpus::open(
        &corpus.valid_source,
        &corpus.valid_target,
        corpus.valid_batch_size,
        None,
    )
    .context("loading validation corpus")?;
    info!(
        "training pairs: {}, validation pairs: {}",
        train.num(),
        valid.num()
    );

    let policy = policy::build(&config.policy, &mut rng)?;
    let mut runner = SimultaneousDecoder::new(
        CopyTranslator::new(),
        policy,
        config.decoder.clone(),
        config.reward.clone(),
    );

    let checkpoints = CheckpointManager::new(&workspace, &run_id, config.checkpoint.clone());
    let mut trainer = Trainer::new(
        config.training.clone(),
        run_id.clone(),
        checkpoints,
        Validator::new(workspace.translate_dir()),
        config.decoder.samples,
    );
    if config.training.remote {
        let path = workspace.log_dir().join(format!("{run_id}.jsonl"));
        let monitor = JsonlMonitor::create(&path, &run_id)
            .with_context(|| format!("opening {}", path.display()))?;
        trainer = trainer.with_monitor(Box::new(monitor));
    }

    match trainer.train(&mut runner, &mut train, &mut valid, &mut rng)? {
        TrainOutcome::Completed { iterations } => {
            info!(iterations, "done");
            Ok(ExitCode::SUCCESS)
        }
        TrainOutcome::UpperBoundProbe { summary } => {
            info!(
                quality = summary.quality,
                corpus_bleu = summary.corpus_bleu,
                "upper-bound probe, exiting"
            );
            Ok(ExitCode::from(2))
        }
    }
}
