use anyhow::Context;
use clap::Parser;
use ecoprint::{Category, Engine, EngineConfig, FootprintReport, ModelStore, TrainingSample, UserProfile};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Personalized carbon footprint reports
#[derive(Parser, Debug)]
#[command(name = "ecoprint")]
#[command(about = "Carbon footprint estimates and recommendations from similar users", long_about = None)]
struct Args {
    /// JSON array of user profiles
    #[arg(short, long)]
    profiles: PathBuf,

    /// JSON object mapping a category to its training samples
    #[arg(short, long)]
    training: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to restore trained models from and save them to
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Only report this user
    #[arg(short, long)]
    user: Option<String>,

    /// Neighbors consulted per user (defaults to the configured value)
    #[arg(short)]
    k: Option<usize>,

    /// Give up on the similarity index after this many milliseconds
    #[arg(long, default_value_t = 30_000)]
    rebuild_timeout_ms: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {:?}", path))
}

/// Rebuild the index on a blocking thread, asking it to give up after
/// `timeout`. Returns whether the index was published.
async fn rebuild_with_deadline(
    engine: Arc<Engine>,
    profiles: Arc<Vec<UserProfile>>,
    timeout: Duration,
) -> anyhow::Result<bool> {
    let abort = Arc::new(AtomicBool::new(false));
    let worker_abort = abort.clone();
    let mut handle = tokio::task::spawn_blocking(move || engine.rebuild_with_abort(&profiles, &worker_abort));

    let outcome = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            abort.store(true, Ordering::Release);
            warn!(timeout_ms = timeout.as_millis() as u64, "similarity index rebuild deadline passed, abort requested");
            // The rebuild may be past its last abort check and publish anyway
            handle.await
        }
    };

    match outcome.context("rebuild task panicked")? {
        Ok(()) => Ok(true),
        Err(ecoprint::Error::RebuildAborted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Reports go to stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Ecoprint v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("loading config {:?}", path))?,
        None => EngineConfig::default(),
    };
    let k = args.k.unwrap_or(config.default_k);
    let engine = Arc::new(Engine::new(config)?);

    let store = args.model_dir.as_ref().map(ModelStore::new).transpose()?;
    if let Some(store) = &store {
        let restored = store.load_into(engine.estimator())?;
        info!("Restored {} models from {:?}", restored, store.dir());
    }

    if let Some(path) = &args.training {
        let training: BTreeMap<Category, Vec<TrainingSample>> = read_json(path)?;
        for (category, samples) in &training {
            let quality = engine.train(*category, samples)?;
            info!("Trained {} model on {} samples, R² {:.3}", category, samples.len(), quality);
        }
        if let Some(store) = &store {
            let saved = store.save(engine.estimator())?;
            info!("Saved {} models to {:?}", saved, store.dir());
        }
    }

    let profiles: Arc<Vec<UserProfile>> = Arc::new(read_json(&args.profiles)?);
    info!("Loaded {} profiles", profiles.len());

    let indexed = rebuild_with_deadline(
        engine.clone(),
        profiles.clone(),
        Duration::from_millis(args.rebuild_timeout_ms),
    )
    .await?;
    if !indexed {
        warn!("Reporting without recommendations from similar users");
    }

    let reports = profiles
        .iter()
        .filter(|p| args.user.as_deref().map_or(true, |u| p.user_id == u))
        .map(|p| engine.report(p, k))
        .collect::<ecoprint::Result<Vec<FootprintReport>>>()?;

    if reports.is_empty() {
        if let Some(user) = &args.user {
            anyhow::bail!("no profile for user '{}'", user);
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    info!("{:?}", engine.stats());
    Ok(())
}
