//! Control channel for the driving context.
//!
//! Request/reply over flume: each request carries its own bounded reply
//! channel, so replies can never cross between concurrent callers. One
//! worker task drains the queue in receipt order.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use common::manifest::{Manifest, SiteInfo};

use crate::state::ServiceState;

/// How long a caller waits for a reply before treating the call as failed.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages accepted by the control worker.
pub enum ControlMessage {
    SetManifest {
        manifest: Manifest,
        site_info: SiteInfo,
        reply: flume::Sender<bool>,
    },
    ClearManifest {
        reply: flume::Sender<bool>,
    },
    ClearCache {
        reply: flume::Sender<bool>,
    },
    GetStatus {
        reply: flume::Sender<Status>,
    },
}

/// Reply to `GET_STATUS`.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub has_manifest: bool,
    pub site_info: Option<SiteInfo>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("control request timed out")]
    Timeout,
    #[error("control worker is gone")]
    Closed,
}

/// Clonable handle for sending control requests.
#[derive(Clone)]
pub struct ControlHandle {
    tx: flume::Sender<ControlMessage>,
    timeout: Duration,
}

impl ControlHandle {
    /// Create a handle and the receiver for its worker.
    pub fn new() -> (Self, flume::Receiver<ControlMessage>) {
        let (tx, rx) = flume::unbounded();
        (
            Self {
                tx,
                timeout: CONTROL_TIMEOUT,
            },
            rx,
        )
    }

    /// Override the reply timeout. Mostly useful in tests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(flume::Sender<T>) -> ControlMessage,
    ) -> Result<T, ControlError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.tx
            .send(build(reply_tx))
            .map_err(|_| ControlError::Closed)?;
        match tokio::time::timeout(self.timeout, reply_rx.recv_async()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ControlError::Closed),
            Err(_) => Err(ControlError::Timeout),
        }
    }

    /// Install a manifest + site info as the resident site.
    pub async fn set_manifest(
        &self,
        manifest: Manifest,
        site_info: SiteInfo,
    ) -> Result<bool, ControlError> {
        self.request(|reply| ControlMessage::SetManifest {
            manifest,
            site_info,
            reply,
        })
        .await
    }

    /// Clear resident state and its durable entries.
    pub async fn clear_manifest(&self) -> Result<bool, ControlError> {
        self.request(|reply| ControlMessage::ClearManifest { reply })
            .await
    }

    /// Empty the blob cache only; resident state is untouched.
    pub async fn clear_cache(&self) -> Result<bool, ControlError> {
        self.request(|reply| ControlMessage::ClearCache { reply })
            .await
    }

    pub async fn status(&self) -> Result<Status, ControlError> {
        self.request(|reply| ControlMessage::GetStatus { reply })
            .await
    }
}

/// Worker loop: processes control messages in receipt order until every
/// handle is dropped.
pub async fn run_control_loop(state: ServiceState, rx: flume::Receiver<ControlMessage>) {
    while let Ok(message) = rx.recv_async().await {
        match message {
            ControlMessage::SetManifest {
                manifest,
                site_info,
                reply,
            } => {
                info!("installing site {:?} for {}", site_info.site, site_info.did);
                state.store().save_resident(&manifest, &site_info).await;
                state.set_session(manifest, site_info);
                let _ = reply.send(true);
            }
            ControlMessage::ClearManifest { reply } => {
                info!("clearing resident site");
                state.clear_session();
                state.store().clear_resident().await;
                let _ = reply.send(true);
            }
            ControlMessage::ClearCache { reply } => {
                info!("clearing blob cache");
                state.store().clear_blobs().await;
                let _ = reply.send(true);
            }
            ControlMessage::GetStatus { reply } => {
                let session = state.session();
                let _ = reply.send(Status {
                    has_manifest: session.is_some(),
                    site_info: session.map(|s| s.info.clone()),
                });
            }
        }
    }
}
