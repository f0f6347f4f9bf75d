//! Client for a personal data server's repository and blob endpoints.

use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::FetchError;
use crate::http::{get_bytes, get_json};
use crate::retry::RetryPolicy;

/// Page size for record listings.
const LIST_PAGE_SIZE: u32 = 100;

/// One record as returned by the repository, value left unparsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEnvelope {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    pub value: serde_json::Value,
}

impl RecordEnvelope {
    /// Record key, the last segment of the record's `at://` uri.
    pub fn rkey(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or(&self.uri)
    }
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<RecordEnvelope>,
    #[serde(default)]
    cursor: Option<String>,
}

/// HTTP client for `com.atproto.repo.*` and `com.atproto.sync.*` calls.
#[derive(Clone)]
pub struct PdsClient {
    client: Client,
    retry: RetryPolicy,
}

impl PdsClient {
    pub fn new(retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("plume/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    fn xrpc_url(pds: &Url, method: &str) -> Result<Url, FetchError> {
        pds.join(&format!("xrpc/{method}"))
            .map_err(|e| FetchError::Network(format!("bad endpoint url: {e}")))
    }

    /// List every record in `collection`, following the cursor until the
    /// server stops returning one.
    pub async fn list_records(
        &self,
        pds: &Url,
        did: &str,
        collection: &str,
    ) -> Result<Vec<RecordEnvelope>, FetchError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = Self::xrpc_url(pds, "com.atproto.repo.listRecords")?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("repo", did)
                    .append_pair("collection", collection)
                    .append_pair("limit", &LIST_PAGE_SIZE.to_string());
                if let Some(c) = &cursor {
                    query.append_pair("cursor", c);
                }
            }

            let page: ListRecordsResponse =
                get_json(&self.client, &self.retry, &url).await?;
            tracing::debug!(
                "listed {} records from {collection} (cursor: {:?})",
                page.records.len(),
                page.cursor
            );
            records.extend(page.records);

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Fetch one record. A missing record is `Ok(None)`, not an error.
    pub async fn get_record(
        &self,
        pds: &Url,
        did: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<Option<RecordEnvelope>, FetchError> {
        let mut url = Self::xrpc_url(pds, "com.atproto.repo.getRecord")?;
        url.query_pairs_mut()
            .append_pair("repo", did)
            .append_pair("collection", collection)
            .append_pair("rkey", rkey);

        match get_json::<RecordEnvelope>(&self.client, &self.retry, &url).await {
            Ok(record) => Ok(Some(record)),
            Err(FetchError::Status { status: 404, .. }) => Ok(None),
            Err(FetchError::Status { status: 400, message })
                if message.contains("RecordNotFound") || message.contains("Could not locate record") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a blob's raw bytes by content identifier.
    pub async fn get_blob(&self, pds: &Url, did: &str, cid: &str) -> Result<Bytes, FetchError> {
        let mut url = Self::xrpc_url(pds, "com.atproto.sync.getBlob")?;
        url.query_pairs_mut()
            .append_pair("did", did)
            .append_pair("cid", cid);

        get_bytes(&self.client, &self.retry, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rkey_is_last_uri_segment() {
        let record = RecordEnvelope {
            uri: "at://did:plc:xyz/dev.plume.site/mysite".into(),
            cid: None,
            value: serde_json::Value::Null,
        };
        assert_eq!(record.rkey(), "mysite");
    }

    #[test]
    fn xrpc_url_joins_on_origin() {
        let pds = Url::parse("https://pds.example").unwrap();
        let url = PdsClient::xrpc_url(&pds, "com.atproto.sync.getBlob").unwrap();
        assert_eq!(
            url.as_str(),
            "https://pds.example/xrpc/com.atproto.sync.getBlob"
        );
    }
}
