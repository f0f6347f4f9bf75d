//! Main service state - orchestrates all components.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use common::manifest::{Manifest, SiteInfo};
use common::{PdsClient, Resolver, ResolverConfig, RetryPolicy};

use crate::config::Config;
use crate::database::Database;
use crate::store::SiteStore;

/// The active serving context: manifest plus site info, replaced wholesale.
#[derive(Debug, Clone)]
pub struct ResidentSite {
    pub manifest: Manifest,
    pub info: SiteInfo,
}

#[derive(Clone)]
pub struct ServiceState {
    resolver: Arc<Resolver>,
    pds: Arc<PdsClient>,
    store: Arc<SiteStore>,
    session: Arc<RwLock<Option<Arc<ResidentSite>>>>,
    serve_prefix: String,
}

impl ServiceState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        // Durable-storage loss degrades to memory-only operation rather
        // than failing hard.
        let db = match Database::new(config.database_path()).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("database unavailable, running memory-only: {e}");
                None
            }
        };

        let resolver = Resolver::new(ResolverConfig {
            plc_directory: config.plc_directory.clone(),
            handle_resolver: config.handle_resolver.clone(),
            retry: RetryPolicy::default(),
        })
        .map_err(|e| anyhow::anyhow!("failed to build resolver: {e}"))?;
        let pds = PdsClient::new(RetryPolicy::default())
            .map_err(|e| anyhow::anyhow!("failed to build PDS client: {e}"))?;

        Ok(Self {
            resolver: Arc::new(resolver),
            pds: Arc::new(pds),
            store: Arc::new(SiteStore::new(db)),
            session: Arc::new(RwLock::new(None)),
            serve_prefix: config.serve_prefix.clone(),
        })
    }

    /// Ephemeral state for tests: in-memory database, default endpoints.
    pub async fn ephemeral() -> anyhow::Result<Self> {
        let db = Database::in_memory().await?;
        let resolver = Resolver::new(ResolverConfig::default())
            .map_err(|e| anyhow::anyhow!("failed to build resolver: {e}"))?;
        let pds = PdsClient::new(RetryPolicy::default())
            .map_err(|e| anyhow::anyhow!("failed to build PDS client: {e}"))?;
        Ok(Self {
            resolver: Arc::new(resolver),
            pds: Arc::new(pds),
            store: Arc::new(SiteStore::new(Some(db))),
            session: Arc::new(RwLock::new(None)),
            serve_prefix: crate::config::DEFAULT_SERVE_PREFIX.to_string(),
        })
    }

    /// Rehydrate the resident site from durable storage. Called once per
    /// cold start by process bootstrap; a no-op when state already resides.
    pub async fn rehydrate(&self) {
        if self.session.read().is_some() {
            return;
        }
        if let Some((manifest, info)) = self.store.load_resident().await {
            info!(
                "rehydrated site {:?} for {} from durable storage",
                info.site, info.did
            );
            *self.session.write() = Some(Arc::new(ResidentSite { manifest, info }));
        }
    }

    /// The resident site, when one is loaded.
    pub fn session(&self) -> Option<Arc<ResidentSite>> {
        self.session.read().clone()
    }

    pub fn has_manifest(&self) -> bool {
        self.session.read().is_some()
    }

    /// Replace the resident site. Last writer wins.
    pub fn set_session(&self, manifest: Manifest, info: SiteInfo) {
        *self.session.write() = Some(Arc::new(ResidentSite { manifest, info }));
    }

    pub fn clear_session(&self) {
        *self.session.write() = None;
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn pds(&self) -> &PdsClient {
        &self.pds
    }

    pub fn store(&self) -> &SiteStore {
        &self.store
    }

    pub fn serve_prefix(&self) -> &str {
        &self.serve_prefix
    }
}
