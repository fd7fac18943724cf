//! Server Module
//!
//! Supervisor for the front-ends and the background maintenance loops.
//! Every listener binds before anything is spawned, so a taken port is a
//! fatal startup error rather than a half-running server. Shutdown is
//! signal-driven and ends with a synchronous snapshot.

mod buffer_pool;
mod http;
mod resp;
mod tcp;

pub use buffer_pool::BufferPool;
pub use http::HttpServer;
pub use resp::RespServer;
pub use tcp::TextServer;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, ServerMode};
use crate::metrics::Metrics;
use crate::persistence::{BackupRotation, SnapshotStore, SnapshotTask};
use crate::script::ScriptEngine;
use crate::storage::{Cache, ExpirySweeper};

/// Shared handles every front-end dispatches against.
#[derive(Clone)]
pub struct AppState {
    pub cache: Cache,
    pub script: Option<ScriptEngine>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

pub struct Server {
    state: AppState,
    snapshots: Option<SnapshotStore>,
}

impl Server {
    /// Build the engine and rehydrate it from the snapshot, before any
    /// listener binds. An unreadable snapshot is logged and the server
    /// starts empty.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let cache = Cache::new();
        let script = config
            .features
            .lua_scripting
            .then(|| ScriptEngine::new(cache.clone()));

        let snapshots = config.persistence.enabled.then(|| {
            SnapshotStore::new(&config.persistence.file, config.persistence.backup_count)
        });
        if let Some(store) = &snapshots {
            match store.load(&cache) {
                Ok(0) => {}
                Ok(keys) => info!(keys, "snapshot loaded"),
                Err(e) => warn!(error = %e, "snapshot unreadable, starting empty"),
            }
        }

        Self {
            state: AppState {
                cache,
                script,
                metrics: Arc::new(Metrics::new()),
                config,
            },
            snapshots,
        }
    }

    /// Engine handle, for tests and embedding.
    pub fn cache(&self) -> &Cache {
        &self.state.cache
    }

    pub async fn run(self) -> io::Result<()> {
        let config = self.state.config.clone();
        let cache = self.state.cache.clone();

        info!(
            mode = ?config.server.mode,
            lua = config.features.lua_scripting,
            pubsub = config.features.pub_sub,
            "starting BoltCache server"
        );

        let sweep_interval = non_zero_or(config.cache.cleanup_interval, Duration::from_secs(60));
        ExpirySweeper::spawn(cache.clone(), sweep_interval);

        if config.persistence.enabled {
            let store =
                SnapshotStore::new(&config.persistence.file, config.persistence.backup_count);
            let interval = non_zero_or(config.persistence.interval, Duration::from_secs(30));
            SnapshotTask::spawn(cache.clone(), store, interval);
            BackupRotation::spawn(
                &config.persistence.file,
                config.persistence.backup_count,
                config.persistence.cleanup_when_exceeds,
            );
        }

        // The RESP listener runs in every mode; the others follow the mode.
        let resp_listener = TcpListener::bind(config.resp_addr()).await?;
        let text_listener = match config.server.mode {
            ServerMode::Tcp | ServerMode::Both => {
                Some(TcpListener::bind(config.tcp_addr()).await?)
            }
            ServerMode::Rest => None,
        };
        let rest_listener = match config.server.mode {
            ServerMode::Rest | ServerMode::Both => {
                Some(TcpListener::bind(config.rest_addr()).await?)
            }
            ServerMode::Tcp => None,
        };

        let pool = BufferPool::from_config(&config.performance);
        tokio::spawn(RespServer::new(self.state.clone(), pool).run(resp_listener));
        if let Some(listener) = text_listener {
            tokio::spawn(TextServer::new(self.state.clone()).run(listener));
        }
        if let Some(listener) = rest_listener {
            tokio::spawn(HttpServer::new(self.state.clone()).run(listener));
        }

        wait_for_shutdown().await;
        info!("shutdown signal received");

        if let Some(store) = &self.snapshots {
            match store.save(&cache) {
                Ok(keys) => info!(keys, "final snapshot written"),
                Err(e) => warn!(error = %e, "final snapshot failed"),
            }
        }

        info!(metrics = %self.state.metrics.summary(), "server stopped");
        Ok(())
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
