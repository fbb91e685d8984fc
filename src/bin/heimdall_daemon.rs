use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::runtime::Runtime;

use heimdall::alerting::{AlertDispatcher, AlertQueue};
use heimdall::config::Config;
use heimdall::geolocation::{self, HttpGeoLocator};
use heimdall::input::{DatagramListener, FileTailer, LoginEvent};
use heimdall::output::{OutputFormat, OutputHandler};
use heimdall::persistence::{retention_cutoff, LoginStore, SqliteLoginStore};
use heimdall::tracking::ConnectionTracker;

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything needed to process one login event
struct Pipeline {
    config: Config,
    tracker: ConnectionTracker,
    remote: Option<HttpGeoLocator>,
    runtime: Runtime,
    alerts: Option<AlertQueue>,
    output: OutputHandler,
}

/// Main daemon entry point for login risk tracking
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Heimdall daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let store: Arc<dyn LoginStore> = Arc::new(SqliteLoginStore::new(&config.storage.database_path)?);
    log::info!("Login store opened at {:?}", config.storage.database_path);

    // Lookups that fail to load degrade to unknown locations
    let geo = match geolocation::open_lookup(&config.geolocation) {
        Ok(geo) => geo,
        Err(e) => {
            log::warn!("Geolocation unavailable: {}", e);
            None
        }
    };
    let remote = config.geolocation.remote_url.as_deref().map(HttpGeoLocator::new);

    let tracker = ConnectionTracker::from_config(&config, store.clone(), geo)?;

    let runtime = Runtime::new()?;
    let alerts = if config.alerting.enabled {
        let (tx, rx) = AlertDispatcher::create_channel();
        let dispatcher = AlertDispatcher::new(config.alerting.clone());
        runtime.spawn(dispatcher.run(rx));
        Some(AlertQueue::new(tx))
    } else {
        None
    };

    let output = OutputHandler::new(
        OutputFormat::from_str(&config.output.format),
        config.output.file_path.clone(),
    )?;

    // Initialize input source
    let mut file_tailer: Option<FileTailer> = None;
    let mut datagram_listener: Option<DatagramListener> = None;

    match config.input.source_type.as_str() {
        "file" => {
            if let Some(ref path) = config.input.file_path {
                let mut tailer = FileTailer::new(path.clone());
                tailer.initialize()?;
                file_tailer = Some(tailer);
                log::info!("Monitoring login events in {:?}", path);
            }
        }
        "udp" => {
            if let Some(ref address) = config.input.listen_address {
                datagram_listener = Some(DatagramListener::new(address)?);
                log::info!("Listening for login events on {}", address);
            }
        }
        other => {
            log::warn!("Unknown input source type: {}", other);
        }
    }

    let mut pipeline = Pipeline {
        config,
        tracker,
        remote,
        runtime,
        alerts,
        output,
    };

    log::info!("Daemon running. Press Ctrl+C to stop.");
    let mut last_prune = Instant::now();
    prune(&pipeline.config, store.as_ref());

    // Main event processing loop
    while running.load(Ordering::SeqCst) {
        let mut events = Vec::new();

        if let Some(ref mut tailer) = file_tailer {
            if tailer.is_valid() {
                match tailer.read_events() {
                    Ok(new_events) => events.extend(new_events),
                    Err(e) => log::error!("Error reading from file: {}", e),
                }
            }
        } else if let Some(ref mut listener) = datagram_listener {
            // read_event blocks for up to a second, so drain a bounded batch
            for _ in 0..100 {
                match listener.read_event() {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Error reading datagram: {}", e);
                        break;
                    }
                }
            }
        }

        for event in events {
            process_event(&event, &mut pipeline)?;
        }

        if last_prune.elapsed() >= PRUNE_INTERVAL {
            prune(&pipeline.config, store.as_ref());
            last_prune = Instant::now();
        }

        // Sleep to avoid busy-waiting
        if file_tailer.is_some() {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    pipeline.output.flush()?;
    // Closing the queue lets the dispatcher drain and stop
    pipeline.alerts = None;
    pipeline.runtime.shutdown_timeout(Duration::from_secs(5));
    log::info!("Heimdall daemon stopped");
    Ok(())
}

/// Track a single login event and report on it
fn process_event(
    event: &LoginEvent,
    pipeline: &mut Pipeline,
) -> Result<(), Box<dyn std::error::Error>> {
    let attempt = event.attempt();
    let at = event.occurred_at(Utc::now());
    let collector = pipeline.tracker.collector();

    let snapshot = match pipeline.remote {
        Some(ref remote) => pipeline.runtime.block_on(collector.collect_enriched(
            &event.request,
            attempt.user_id.as_deref(),
            at,
            remote,
        )),
        None => collector.collect(&event.request, attempt.user_id.as_deref(), at),
    };

    let report = match pipeline.tracker.record_snapshot(snapshot, &attempt) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Failed to record login for {}: {}", attempt.email, e);
            return Ok(());
        }
    };

    if pipeline.config.output.report_all
        || report.is_suspicious()
        || report.requires_verification()
    {
        pipeline.output.write_report(&report)?;
    }

    if let Some(alert) = report.to_alert() {
        log::warn!(
            "ALERT [{}] {} - User: {}, IP: {}, Location: {}",
            alert.severity,
            alert.description,
            alert.user_id,
            alert.ip,
            alert.location
        );
        if let Some(ref queue) = pipeline.alerts {
            queue.queue_alert(alert);
        }
    }

    Ok(())
}

/// Remove history older than the retention window
fn prune(config: &Config, store: &dyn LoginStore) {
    let cutoff = match retention_cutoff(Utc::now(), config.retention.days) {
        Some(cutoff) => cutoff,
        None => {
            log::error!("Retention of {} days is out of range", config.retention.days);
            return;
        }
    };
    match store.prune_old_data(cutoff) {
        Ok(0) => {}
        Ok(removed) => log::info!("Pruned {} records older than {}", removed, cutoff),
        Err(e) => log::error!("Failed to prune old data: {}", e),
    }
}
