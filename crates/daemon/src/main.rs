// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cvrd` — the Conversator control-plane daemon.

use cvr_daemon::lifecycle::{startup, Config};
use cvr_daemon::listener::Listener;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_path: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_path.parent() {
        Some(parent) if std::fs::create_dir_all(parent).is_ok() => {
            let file = tracing_appender::rolling::never(
                parent,
                log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("daemon.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cvrd: {}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = init_tracing(&config.log_path);

    let result = match startup(&config).await {
        Ok(r) => r,
        Err(e) => {
            error!("startup failed: {}", e);
            eprintln!("cvrd: startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut daemon = result.daemon;
    let shutdown = Arc::clone(&daemon.shutdown);

    // Tool surface.
    tokio::spawn(Listener::new(result.listener, result.listen_ctx).run());

    // Dashboard fan-out.
    if let Some(addr) = result.http_addr {
        let app_state = result.app_state;
        tokio::spawn(async move {
            if let Err(e) = cvr_daemon::fanout::serve(&addr, app_state).await {
                error!("fan-out server failed: {}", e);
            }
        });
    }

    println!("READY");
    info!("cvrd ready");

    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    daemon.shutdown();
}
