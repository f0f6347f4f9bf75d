//! Service bootstrap and shutdown.

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::control::{self, ControlHandle};
use crate::http_server;
use crate::state::ServiceState;

/// A running gateway: control handle, bound address, and shutdown.
pub struct Service {
    pub control: ControlHandle,
    pub addr: SocketAddr,
    pub state: ServiceState,
    shutdown_tx: flume::Sender<()>,
    server: JoinHandle<()>,
}

impl Service {
    /// Stop the server gracefully and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.server.await;
    }
}

/// Build state, rehydrate, spawn the control worker and the HTTP server.
pub async fn spawn_service(config: &Config) -> anyhow::Result<Service> {
    let state = ServiceState::from_config(config).await?;
    // Durable rehydration happens here, once per cold start, before the
    // first request can arrive.
    state.rehydrate().await;
    let stats = state.store().cache_stats().await;
    info!(
        "blob cache holds {} durable entries ({} bytes)",
        stats.durable_entries, stats.durable_bytes
    );

    let (control, control_rx) = ControlHandle::new();
    tokio::spawn(control::run_control_loop(state.clone(), control_rx));

    let app = http_server::router(state.clone());
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    info!("gateway listening on {addr}");

    let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv_async().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("server error: {e}");
        }
    });

    Ok(Service {
        control,
        addr,
        state,
        shutdown_tx,
        server,
    })
}
