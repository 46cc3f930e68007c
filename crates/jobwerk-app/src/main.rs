// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jobwerk: sample host for the job dispatch core.
//
// Entry point. Loads configuration, initialises logging and the engine,
// submits the demo jobs, and serves them until interrupted.

mod services;

use services::components;
use services::config;
use services::data_dir;
use services::engine::Engine;

#[tokio::main]
async fn main() {
    let dir = data_dir::data_dir();
    let cfg = config::load_config(&dir);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.log_filter())),
        )
        .init();

    tracing::info!(data_dir = %dir.display(), "Jobwerk starting");

    if !config::config_path(&dir).exists() {
        if let Err(e) = config::persist_config(&dir, &cfg) {
            tracing::warn!(error = %e, "could not write default config");
        }
    }

    let mut engine = match Engine::init(&dir, &cfg) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "engine initialisation failed");
            std::process::exit(1);
        }
    };

    match components::sample_jobs() {
        Ok(jobs) => {
            for job in jobs {
                engine.dispatcher().dispatch(job);
            }
        }
        Err(e) => tracing::error!(error = %e, "invalid sample job"),
    }

    let Some(worker) = engine.start() else {
        return;
    };
    tracing::info!(
        scheduled = engine.scheduled_count(),
        pending = engine.dispatcher().pending_len(),
        online = engine.connectivity().is_online(),
        "engine running, press Ctrl-C to stop"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        }
        _ = worker => {
            tracing::warn!("job worker exited");
        }
    }

    tracing::info!(remaining = engine.scheduled_count(), "Jobwerk stopped");
}
