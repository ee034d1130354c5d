//! DecoyDNA Monitor - Main Entry Point
//!
//! Loads configuration, re-registers every honeyfile from the manifest,
//! persists detections to the forensic log and runs until Ctrl-C.

use std::sync::Arc;

use decoydna_core::api;
use decoydna_core::constants::{APP_NAME, APP_VERSION};
use decoydna_core::logic::alerts;
use decoydna_core::logic::config::{self, MonitorConfig};
use decoydna_core::logic::engine::{EngineOptions, MonitoringEngine};
use decoydna_core::logic::forensic_log::ForensicLog;

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cfg = MonitorConfig::from_env();

    let channels = alerts::build_channels(&cfg.channels, cfg.alert_timeout);
    let options = EngineOptions {
        queue_capacity: cfg.queue_capacity,
        alert_timeout: cfg.alert_timeout,
        ..EngineOptions::default()
    };
    let engine = Arc::new(MonitoringEngine::new(options, channels));

    match ForensicLog::open(cfg.forensic_log_dir.clone()) {
        Ok(forensic_log) => engine.set_default_handler(Arc::new(forensic_log)),
        Err(e) => log::warn!(
            "Forensic log unavailable at {}: {} - detections will only be alerted",
            cfg.forensic_log_dir.display(),
            e
        ),
    }

    api::install_engine(Arc::clone(&engine));

    if let Some(manifest) = &cfg.manifest_path {
        let entries = config::load_manifest(manifest).map_err(|e| e.to_string())?;
        for entry in &entries {
            engine.register_honeyfile(&entry.path, &entry.decoy_id, &entry.seed_locations);
        }
        log::info!("Registered {} honeyfile(s) from {}", entries.len(), manifest.display());
    } else {
        log::warn!("HONEYFILE_MANIFEST not set - only monitored directories will be watched");
    }

    let info = api::start_monitoring(Some(cfg.monitored_directories.clone()))?;
    for root in &info.watched_roots {
        log::info!("Watching {}", root.display());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;
    runtime.block_on(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
        }
    });

    log::info!("Shutting down...");
    api::stop_monitoring()?;
    let status = engine.status();
    log::info!(
        "Processed {} detection(s), dropped {}",
        status.processed_detections,
        status.dropped_detections
    );
    api::uninstall_engine();
    Ok(())
}
