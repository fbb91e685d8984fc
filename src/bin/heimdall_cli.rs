use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use structopt::StructOpt;

use heimdall::collector::{device_fingerprint, ConnectionCollector, UserAgentParser};
use heimdall::config::Config;
use heimdall::detection::SuspiciousActivityEvaluator;
use heimdall::geolocation::{self, HttpGeoLocator};
use heimdall::input::FileTailer;
use heimdall::output::{OutputFormat, OutputHandler};
use heimdall::persistence::{retention_cutoff, InMemoryLoginStore, LoginStore, SqliteLoginStore};
use heimdall::tracking::ConnectionTracker;

/// Heimdall login risk tracking command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "heimdall", about = "Login risk scoring and suspicious activity detection")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Compute the device fingerprint and parsed device for request headers
    Fingerprint {
        /// User-Agent header
        #[structopt(long, default_value = "")]
        user_agent: String,
        /// Accept-Language header
        #[structopt(long, default_value = "")]
        accept_language: String,
        /// Accept-Encoding header
        #[structopt(long, default_value = "")]
        accept_encoding: String,
        /// Accept header
        #[structopt(long, default_value = "")]
        accept: String,
        /// Client IP
        #[structopt(long, default_value = "unknown")]
        ip: String,
    },
    /// Replay a JSON-lines file of login events and print the reports
    Score {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Login events to replay
        #[structopt(short, long)]
        events: PathBuf,
        /// Keep history in memory instead of the configured database
        #[structopt(long)]
        in_memory: bool,
        /// Output format: console, json or jsonl
        #[structopt(short, long, default_value = "console")]
        format: String,
    },
    /// Show a user's recent logins and risk assessments
    History {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// User id
        #[structopt(short, long)]
        user: String,
        /// Number of records to show
        #[structopt(short, long, default_value = "10")]
        limit: usize,
    },
    /// Run the suspicious activity rules against a user's recent history
    Check {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// User id
        #[structopt(short, long)]
        user: String,
    },
    /// Delete history older than the retention window
    Prune {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Override the configured retention in days
        #[structopt(short, long)]
        days: Option<i64>,
    },
    /// Resolve the location of an IP address
    Locate {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// IP address to look up
        ip: String,
    },
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        eprintln!("Configuration file not found: {:?}, using defaults", path);
        Ok(Config::default())
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn LoginStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteLoginStore::new(&config.storage.database_path)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Fingerprint {
            user_agent,
            accept_language,
            accept_encoding,
            accept,
            ip,
        } => {
            let fingerprint =
                device_fingerprint(&user_agent, &accept_language, &accept_encoding, &accept, &ip);
            let device = UserAgentParser::new()?.parse(&user_agent);

            println!("Fingerprint: {}", fingerprint);
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        Cli::Score {
            config,
            events,
            in_memory,
            format,
        } => {
            let config = load_config(&config)?;
            let store: Arc<dyn LoginStore> = if in_memory {
                Arc::new(InMemoryLoginStore::new())
            } else {
                open_store(&config)?
            };
            let geo = geolocation::open_lookup(&config.geolocation)?;
            let tracker = ConnectionTracker::from_config(&config, store, geo)?;
            let mut output = OutputHandler::new(OutputFormat::from_str(&format), None)?;

            let mut tailer = FileTailer::from_start(events);
            let events = tailer.read_events()?;
            let received = Utc::now();

            let mut flagged = 0;
            for event in &events {
                let report = tracker.record_attempt(
                    &event.request,
                    &event.attempt(),
                    event.occurred_at(received),
                )?;
                if report.is_suspicious() || report.requires_verification() {
                    flagged += 1;
                }
                output.write_report(&report)?;
            }
            output.flush()?;

            eprintln!("Replayed {} event(s), {} flagged", events.len(), flagged);
        }
        Cli::History {
            config,
            user,
            limit,
        } => {
            let config = load_config(&config)?;
            let store = open_store(&config)?;

            let logins = store.recent_logins(&user, Utc::now(), limit)?;
            println!("Recent logins for {} ({}):", user, logins.len());
            for entry in &logins {
                println!(
                    "  {} {:<6} {} {} ({}) fp={}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    if entry.success { "OK" } else { "FAILED" },
                    entry.ip,
                    entry.location.display_location(),
                    entry.device.summary(),
                    &entry.fingerprint[..entry.fingerprint.len().min(12)]
                );
            }

            let assessments = store.recent_risk_assessments(&user, limit)?;
            println!("\nRisk assessments ({}):", assessments.len());
            for assessment in &assessments {
                let factors: Vec<&str> =
                    assessment.risk_factors.iter().map(|f| f.label()).collect();
                println!(
                    "  {} score={} verify={} [{}]",
                    assessment.created_at.format("%Y-%m-%d %H:%M:%S"),
                    assessment.risk_score,
                    assessment.requires_verification,
                    factors.join(", ")
                );
            }
        }
        Cli::Check { config, user } => {
            let config = load_config(&config)?;
            let store = open_store(&config)?;
            let evaluator = SuspiciousActivityEvaluator::new(store, config.suspicious.clone());

            let verdict = evaluator.evaluate_history(&user, Utc::now())?;
            match verdict.finding {
                Some(ref finding) => println!(
                    "SUSPICIOUS: {} ({}) - {}",
                    finding.reason(),
                    finding.severity(),
                    finding.describe()
                ),
                None => println!("No suspicious activity for {}", user),
            }
        }
        Cli::Prune { config, days } => {
            let config = load_config(&config)?;
            let store = open_store(&config)?;
            let days = days.unwrap_or(config.retention.days);

            let cutoff = retention_cutoff(Utc::now(), days)
                .ok_or_else(|| format!("Retention of {} days is out of range", days))?;
            let removed = store.prune_old_data(cutoff)?;
            println!("Removed {} record(s) older than {}", removed, cutoff);
        }
        Cli::Locate { config, ip } => {
            let config = load_config(&config)?;
            let geo = geolocation::open_lookup(&config.geolocation)?;
            let collector = ConnectionCollector::new(geo)?;

            let mut location = collector.resolve_location(&ip);
            if !location.country.is_known() {
                if let Some(ref url) = config.geolocation.remote_url {
                    let runtime = tokio::runtime::Runtime::new()?;
                    let remote = HttpGeoLocator::new(url.as_str());
                    if let Some(found) = runtime.block_on(remote.locate(&ip)) {
                        location = found;
                    }
                }
            }

            println!("{}", serde_json::to_string_pretty(&location)?);
        }
    }

    Ok(())
}
