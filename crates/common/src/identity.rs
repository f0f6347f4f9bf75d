//! Handle and DID resolution.
//!
//! Resolution runs the chain handle → canonical DID → PDS endpoint. Two
//! canonical identity forms are recognized: `did:plc:*`, verified against
//! the PLC directory, and `did:web:*`, verified against the issuer domain's
//! well-known document. Anything else is treated as a handle and sent to
//! the handle-resolution endpoint; if that fails, the raw input gets one
//! more chance as a DID, which covers bookmarked or hand-typed identities.
//!
//! Successful resolutions are cached under the raw input string for one
//! hour.

use std::time::Duration;

use moka::sync::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FetchError, ResolveError};
use crate::http::get_json;
use crate::retry::RetryPolicy;

/// Service id suffix marking the personal data server in a DID document.
const PDS_SERVICE_ID: &str = "#atproto_pds";
/// Service type marking the personal data server in a DID document.
const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

const RESOLUTION_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const RESOLUTION_CACHE_CAPACITY: u64 = 10_000;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    /// Display handle, when one is known.
    pub handle: Option<String>,
    /// Canonical identity.
    pub did: String,
    /// Hosting endpoint serving this identity's repository and blobs.
    pub pds: Url,
}

/// Recognized canonical identity forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidMethod {
    Plc,
    Web,
}

/// Classify an input string as one of the recognized DID forms.
pub fn did_method(input: &str) -> Option<DidMethod> {
    if input.starts_with("did:plc:") {
        Some(DidMethod::Plc)
    } else if input.starts_with("did:web:") {
        Some(DidMethod::Web)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default, rename = "alsoKnownAs")]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub service_type: String,
    #[serde(default, rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

impl DidDocument {
    /// Hosting endpoint declared by this document, if any.
    pub fn pds_endpoint(&self) -> Option<Url> {
        self.service
            .iter()
            .find(|s| s.id.ends_with(PDS_SERVICE_ID) || s.service_type == PDS_SERVICE_TYPE)
            .and_then(|s| Url::parse(&s.service_endpoint).ok())
    }

    /// Display handle from the document's aliases (`at://handle` entries).
    pub fn handle(&self) -> Option<String> {
        self.also_known_as
            .iter()
            .find_map(|aka| aka.strip_prefix("at://"))
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

/// Endpoints and retry schedule for a [`Resolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub plc_directory: Url,
    pub handle_resolver: Url,
    pub retry: RetryPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            plc_directory: Url::parse("https://plc.directory").expect("static url"),
            handle_resolver: Url::parse("https://public.api.bsky.app").expect("static url"),
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolves handles and DIDs to a verified identity plus hosting endpoint.
#[derive(Clone)]
pub struct Resolver {
    client: Client,
    config: ResolverConfig,
    cache: Cache<String, ResolvedIdentity>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("plume/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            cache: Cache::builder()
                .time_to_live(RESOLUTION_CACHE_TTL)
                .max_capacity(RESOLUTION_CACHE_CAPACITY)
                .build(),
        })
    }

    /// Resolve a handle or canonical identity to `{handle, did, pds}`.
    pub async fn resolve(&self, input: &str) -> Result<ResolvedIdentity, ResolveError> {
        let input = input.trim();
        if let Some(hit) = self.cache.get(input) {
            tracing::debug!("resolution cache hit for {input:?}");
            return Ok(hit);
        }

        let resolved = if did_method(input).is_some() {
            self.verify_did(input, None).await?
        } else {
            match self.resolve_handle(input).await {
                Ok(did) => self.verify_did(&did, Some(input)).await?,
                // Handles are sometimes bookmarked or pasted as raw DIDs;
                // give the input one direct-verification attempt before
                // reporting the handle failure.
                Err(handle_err) => match self.verify_did(input, None).await {
                    Ok(resolved) => resolved,
                    Err(_) => return Err(handle_err),
                },
            }
        };

        tracing::debug!("resolved {input:?} to {} at {}", resolved.did, resolved.pds);
        self.cache.insert(input.to_string(), resolved.clone());
        Ok(resolved)
    }

    async fn resolve_handle(&self, handle: &str) -> Result<String, ResolveError> {
        let mut url = self
            .config
            .handle_resolver
            .join("xrpc/com.atproto.identity.resolveHandle")
            .map_err(|e| ResolveError::UnknownForm(e.to_string()))?;
        url.query_pairs_mut().append_pair("handle", handle);

        match get_json::<ResolveHandleResponse>(&self.client, &self.config.retry, &url).await {
            Ok(response) => Ok(response.did),
            Err(FetchError::Status { status, .. }) if status == 400 || status == 404 => {
                Err(ResolveError::NotFound(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the authoritative document for `did` and verify its subject.
    async fn verify_did(
        &self,
        did: &str,
        handle: Option<&str>,
    ) -> Result<ResolvedIdentity, ResolveError> {
        let method =
            did_method(did).ok_or_else(|| ResolveError::UnknownForm(did.to_string()))?;

        let url = match method {
            DidMethod::Plc => {
                let mut url = self.config.plc_directory.clone();
                url.path_segments_mut()
                    .map_err(|_| ResolveError::UnknownForm(did.to_string()))?
                    .pop_if_empty()
                    .push(did);
                url
            }
            DidMethod::Web => {
                let domain = did.trim_start_matches("did:web:");
                Url::parse(&format!("https://{domain}/.well-known/did.json")).map_err(|e| {
                    ResolveError::BadDocument {
                        did: did.to_string(),
                        message: e.to_string(),
                    }
                })?
            }
        };

        let document =
            match get_json::<DidDocument>(&self.client, &self.config.retry, &url).await {
                Ok(doc) => doc,
                Err(FetchError::Status { status: 404, .. }) => {
                    return Err(ResolveError::NotFound(did.to_string()))
                }
                Err(e) => return Err(e.into()),
            };

        if document.id != did {
            return Err(ResolveError::Mismatch {
                expected: did.to_string(),
                actual: document.id,
            });
        }

        let pds = document
            .pds_endpoint()
            .ok_or_else(|| ResolveError::NoPds(did.to_string()))?;

        Ok(ResolvedIdentity {
            handle: handle.map(str::to_string).or_else(|| document.handle()),
            did: did.to_string(),
            pds,
        })
    }
}
