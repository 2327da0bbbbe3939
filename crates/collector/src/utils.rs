use anyhow::{anyhow, Error};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use clima_core::{find_config_file, load_config, ConfigSource, DEFAULT_DATA_DIR, DEFAULT_TIMEZONE};
use slog::{o, Drain, Level, Logger};
use std::{
    env,
    path::PathBuf,
    time::{Duration, Instant},
};
use tokio::time::sleep;

use crate::{Granularity, RetryPolicy, SqliteTarget, ARCHIVE_URL, FORECAST_URL};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "Clima Collector - Incremental Open-Meteo collection for a municipality catalog"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $CLIMA_COLLECTOR_CONFIG, ./collector.toml,
    /// $XDG_CONFIG_HOME/clima-ingest/collector.toml, /etc/clima-ingest/collector.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "CLIMA_COLLECTOR_LEVEL")]
    pub level: Option<String>,

    /// Root folder for partitions, catalog and state
    #[arg(short, long, env = "CLIMA_COLLECTOR_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Municipality catalog CSV (codigo_ibge, nome, nome_uf, latitude, longitude)
    #[arg(long, env = "CLIMA_COLLECTOR_CATALOG")]
    pub catalog: Option<String>,

    /// File holding the last collected date
    #[arg(long, env = "CLIMA_COLLECTOR_WATERMARK")]
    pub watermark: Option<String>,

    /// IANA timezone that defines "today" and is sent with every request
    #[arg(long, env = "CLIMA_COLLECTOR_TIMEZONE")]
    pub timezone: Option<String>,

    /// Which granularities to collect
    #[arg(short, long, value_enum, env = "CLIMA_COLLECTOR_MODE")]
    pub mode: Option<CollectionMode>,

    /// First date of an explicit backfill range (YYYY-MM-DD)
    #[arg(long, env = "CLIMA_COLLECTOR_START_DATE")]
    pub start_date: Option<NaiveDate>,

    /// Last date of an explicit backfill range (YYYY-MM-DD)
    #[arg(long, env = "CLIMA_COLLECTOR_END_DATE")]
    pub end_date: Option<NaiveDate>,

    /// Only collect municipalities in these regions (comma separated)
    #[arg(long, value_delimiter = ',', env = "CLIMA_COLLECTOR_REGIONS")]
    pub regions: Option<Vec<String>>,

    /// Attempts per municipality for daily requests
    #[arg(long, env = "CLIMA_COLLECTOR_DAILY_MAX_ATTEMPTS")]
    pub daily_max_attempts: Option<u32>,

    /// Attempts per municipality for hourly requests
    #[arg(long, env = "CLIMA_COLLECTOR_HOURLY_MAX_ATTEMPTS")]
    pub hourly_max_attempts: Option<u32>,

    /// Base retry delay in milliseconds, multiplied by the attempt number
    #[arg(long, env = "CLIMA_COLLECTOR_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, env = "CLIMA_COLLECTOR_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Rate limiter refill rate in tokens per second
    #[arg(short, long, env = "CLIMA_COLLECTOR_REFILL_RATE")]
    pub refill_rate: Option<f64>,

    /// Rate limiter token capacity
    #[arg(short, long, env = "CLIMA_COLLECTOR_TOKEN_CAPACITY")]
    pub token_capacity: Option<usize>,

    /// HTTP User-Agent header for Open-Meteo requests
    #[arg(short, long, env = "CLIMA_COLLECTOR_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Override for the historical archive endpoint
    #[arg(long, env = "CLIMA_COLLECTOR_ARCHIVE_URL")]
    pub archive_url: Option<String>,

    /// Override for the forecast endpoint used by the hourly fallback
    #[arg(long, env = "CLIMA_COLLECTOR_FORECAST_URL")]
    pub forecast_url: Option<String>,

    /// Upload partitions to this S3 bucket (needs the `s3` feature)
    #[arg(long, env = "CLIMA_COLLECTOR_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO
    #[arg(long, env = "CLIMA_COLLECTOR_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Named AWS profile
    #[arg(long, env = "CLIMA_COLLECTOR_S3_PROFILE")]
    pub s3_profile: Option<String>,

    /// Append partitions to this SQLite database
    #[arg(long, env = "CLIMA_COLLECTOR_SQLITE_PATH")]
    pub sqlite_path: Option<String>,

    /// Table prefix for the SQLite sink; the category is appended
    #[arg(long, env = "CLIMA_COLLECTOR_SQLITE_TABLE")]
    pub sqlite_table: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    #[value(alias = "diario")]
    #[serde(alias = "diario")]
    Daily,
    #[value(alias = "horario")]
    #[serde(alias = "horario")]
    Hourly,
    #[default]
    #[value(alias = "ambos")]
    #[serde(alias = "ambos")]
    Both,
}

impl CollectionMode {
    pub fn granularities(&self) -> Vec<Granularity> {
        match self {
            CollectionMode::Daily => vec![Granularity::Daily],
            CollectionMode::Hourly => vec![Granularity::Hourly],
            CollectionMode::Both => vec![Granularity::Daily, Granularity::Hourly],
        }
    }
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(
            self.data_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        )
    }

    pub fn catalog(&self) -> PathBuf {
        match &self.catalog {
            Some(path) => PathBuf::from(path),
            None => self
                .data_dir()
                .join("lista_municipios")
                .join("lista_mun.csv"),
        }
    }

    pub fn watermark(&self) -> PathBuf {
        match &self.watermark {
            Some(path) => PathBuf::from(path),
            None => self.data_dir().join("state").join("watermark.txt"),
        }
    }

    pub fn timezone(&self) -> Result<Tz, Error> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone '{}': {}", name, e))
    }

    pub fn mode(&self) -> CollectionMode {
        self.mode.unwrap_or_default()
    }

    /// Explicit backfill range; both bounds or neither.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, Error> {
        match (self.start_date, self.end_date) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) if start <= end => Ok(Some((start, end))),
            (Some(start), Some(end)) => Err(anyhow!(
                "start date {} is after end date {}",
                start,
                end
            )),
            _ => Err(anyhow!(
                "an explicit range needs both --start-date and --end-date"
            )),
        }
    }

    pub fn regions(&self) -> Vec<String> {
        self.regions
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|region| region.trim().to_string())
            .filter(|region| !region.is_empty())
            .collect()
    }

    pub fn daily_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.daily_max_attempts.unwrap_or(3), self.retry_delay())
    }

    pub fn hourly_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.hourly_max_attempts.unwrap_or(3), self.retry_delay())
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(2_000))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(30))
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate.unwrap_or(5.0)
    }

    pub fn token_capacity(&self) -> usize {
        self.token_capacity.unwrap_or(10)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("clima-collector/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn archive_url(&self) -> String {
        self.archive_url
            .clone()
            .unwrap_or_else(|| ARCHIVE_URL.to_string())
    }

    pub fn forecast_url(&self) -> String {
        self.forecast_url
            .clone()
            .unwrap_or_else(|| FORECAST_URL.to_string())
    }

    pub fn sqlite_target(&self) -> Option<SqliteTarget> {
        self.sqlite_path.as_ref().map(|path| SqliteTarget {
            path: PathBuf::from(path),
            table_prefix: self
                .sqlite_table
                .clone()
                .unwrap_or_else(|| "clima_raw".to_string()),
        })
    }

    /// Fills every unset value from `file`.
    pub fn or(self, file: Cli) -> Cli {
        Cli {
            config: self.config,
            level: self.level.or(file.level),
            data_dir: self.data_dir.or(file.data_dir),
            catalog: self.catalog.or(file.catalog),
            watermark: self.watermark.or(file.watermark),
            timezone: self.timezone.or(file.timezone),
            mode: self.mode.or(file.mode),
            start_date: self.start_date.or(file.start_date),
            end_date: self.end_date.or(file.end_date),
            regions: self.regions.or(file.regions),
            daily_max_attempts: self.daily_max_attempts.or(file.daily_max_attempts),
            hourly_max_attempts: self.hourly_max_attempts.or(file.hourly_max_attempts),
            retry_delay_ms: self.retry_delay_ms.or(file.retry_delay_ms),
            request_timeout: self.request_timeout.or(file.request_timeout),
            refill_rate: self.refill_rate.or(file.refill_rate),
            token_capacity: self.token_capacity.or(file.token_capacity),
            user_agent: self.user_agent.or(file.user_agent),
            archive_url: self.archive_url.or(file.archive_url),
            forecast_url: self.forecast_url.or(file.forecast_url),
            s3_bucket: self.s3_bucket.or(file.s3_bucket),
            s3_endpoint: self.s3_endpoint.or(file.s3_endpoint),
            s3_profile: self.s3_profile.or(file.s3_profile),
            sqlite_path: self.sqlite_path.or(file.sqlite_path),
            sqlite_table: self.sqlite_table.or(file.sqlite_table),
        }
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("CLIMA_COLLECTOR_CONFIG", "collector.toml")
    };

    let file_config: Cli = load_config(&source).unwrap_or_default();

    // env vars are already folded into cli_args by clap
    cli_args.or(file_config)
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// Token bucket pacing requests to the upstream. A non-positive refill rate
/// disables pacing.
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        RateLimiter {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
            refill_rate,
        }
    }

    fn refill_tokens(&mut self, now: Instant) {
        let elapsed_time = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_time * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token if one is available, otherwise returns how long until
    /// the next one is.
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        if self.refill_rate <= 0.0 {
            return None;
        }
        self.refill_tokens(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64(
                (1.0 - self.tokens) / self.refill_rate,
            ))
        }
    }

    pub async fn acquire(&mut self) {
        while let Some(wait) = self.try_take(Instant::now()) {
            sleep(wait).await;
        }
    }
}
