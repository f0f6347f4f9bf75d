//! Thin HTTP helpers shared by the resolver and the PDS client.
//!
//! Every upstream GET funnels through here so status mapping and retry
//! behavior stay uniform: 403 becomes an explicit cross-origin denial,
//! other non-success statuses become [`FetchError::Status`], and transport
//! failures become [`FetchError::Network`]. The retry policy only ever sees
//! already-classified errors.

use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::FetchError;
use crate::retry::RetryPolicy;

async fn get_raw(client: &Client, url: &Url) -> Result<Bytes, FetchError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::FORBIDDEN {
        let message = response.text().await.unwrap_or_default();
        return Err(FetchError::Cors(message));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.bytes().await?)
}

/// GET `url` and return the raw body, retried per `policy`.
pub async fn get_bytes(
    client: &Client,
    policy: &RetryPolicy,
    url: &Url,
) -> Result<Bytes, FetchError> {
    policy.run(|| get_raw(client, url)).await
}

/// GET `url` and deserialize the JSON body, retried per `policy`.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    policy: &RetryPolicy,
    url: &Url,
) -> Result<T, FetchError> {
    let body = get_bytes(client, policy, url).await?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Network(format!("invalid body: {e}")))
}
