use anyhow::Context;
use clap::Parser;
use lease_lock::{config::Config, LockFactory, LockMetrics, PolicyConfig, RedisStore};
use std::{process::ExitCode, sync::Arc};
use tokio::{process::Command, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// sysexits.h EX_TEMPFAIL
const EXIT_NOT_ACQUIRED: u8 = 75;

/// Run a command while holding a lease lock in Redis.
#[derive(Parser, Debug)]
#[command(name = "lease-lock", version)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "LEASE_LOCK_REDIS_URL")]
    redis_url: Option<String>,

    /// Redis database index
    #[arg(long, env = "LEASE_LOCK_DATABASE")]
    database: Option<u32>,

    /// Lease TTL in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    expiry_ms: Option<i64>,

    /// How long to wait for the lock in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    wait_ms: Option<i64>,

    /// Number of automatic lease renewals
    #[arg(long, allow_negative_numbers = true)]
    renewals: Option<i64>,

    /// Delay between acquisition attempts in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    retry_ms: Option<i64>,

    /// Print lock metrics as JSON on exit
    #[arg(long)]
    metrics: bool,

    /// Resource to lock
    resource: String,

    /// Command to run while the lock is held
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        config.policy = PolicyConfig {
            expiry_ms: self.expiry_ms.unwrap_or(config.policy.expiry_ms),
            max_wait_ms: self.wait_ms.unwrap_or(config.policy.max_wait_ms),
            renewal_budget: self.renewals.unwrap_or(config.policy.renewal_budget),
            retry_interval_ms: self.retry_ms.unwrap_or(config.policy.retry_interval_ms),
        };
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lease_lock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.apply(Config::from_env()?);
    let policy = config.lock_policy()?;

    let store = RedisStore::open(&config.redis_url)
        .with_context(|| format!("invalid redis url {}", config.redis_url))?;
    let metrics = LockMetrics::new();
    let factory = LockFactory::new(Arc::new(store), config.database).with_metrics(metrics.clone());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling lock wait");
            interrupt.cancel();
        }
    });

    let mut handle = factory.acquire(&cli.resource, policy, &cancel).await?;
    if !handle.is_acquired() {
        warn!(resource = %cli.resource, "Lock is held elsewhere, giving up");
        return Ok(ExitCode::from(EXIT_NOT_ACQUIRED));
    }

    let (program, args) = cli
        .command
        .split_first()
        .context("no command given")?;
    info!(resource = %cli.resource, key = handle.key(), command = %program, "Running command under lock");

    let status = Command::new(program).args(args).status().await;
    handle.release().await;

    if cli.metrics {
        println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    }

    let status = status.with_context(|| format!("failed to run {}", program))?;
    let code = status.code().unwrap_or(1).clamp(0, 255) as u8;
    Ok(ExitCode::from(code))
}
