//! End-to-end gateway tests against a stub PDS.
//!
//! One local axum listener plays the identity directory, the handle
//! resolver, and the personal data server at once; the daemon under test is
//! pointed at it through its config.

mod helpers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_compression::tokio::bufread::GzipEncoder;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use url::Url;

use ::common::manifest::SiteInfo;
use ::common::{fetch_site, PdsClient, Resolver, ResolverConfig, RetryPolicy};
use plume_daemon::{spawn_service, Config, Service};

const DID: &str = "did:plc:stub";
const SITE: &str = "mysite";

struct Stub {
    base: Url,
    site_record: Value,
    fragment_records: Vec<Value>,
    blobs: HashMap<String, Bytes>,
    blob_fetches: Mutex<HashMap<String, usize>>,
}

impl Stub {
    fn fetches(&self, cid: &str) -> usize {
        *self.blob_fetches.lock().unwrap().get(cid).unwrap_or(&0)
    }
}

async fn resolve_handle(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("handle").map(String::as_str) == Some("alice.example") {
        Json(json!({"did": DID})).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "InvalidRequest", "message": "Unable to resolve handle"})),
        )
            .into_response()
    }
}

async fn did_doc(State(stub): State<Arc<Stub>>, Path(did): Path<String>) -> Response {
    if did != DID {
        return (StatusCode::NOT_FOUND, "no such did").into_response();
    }
    let endpoint = stub.base.as_str().trim_end_matches('/').to_string();
    Json(json!({
        "id": DID,
        "alsoKnownAs": ["at://alice.example"],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": endpoint
        }]
    }))
    .into_response()
}

async fn get_record(
    State(stub): State<Arc<Stub>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let collection = params.get("collection").map(String::as_str);
    let rkey = params.get("rkey").map(String::as_str);
    if collection == Some("dev.plume.site") && rkey == Some(SITE) {
        return Json(json!({
            "uri": format!("at://{DID}/dev.plume.site/{SITE}"),
            "cid": null,
            "value": stub.site_record
        }))
        .into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "RecordNotFound", "message": "Could not locate record"})),
    )
        .into_response()
}

async fn list_records(
    State(stub): State<Arc<Stub>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let records: Vec<Value> = match params.get("collection").map(String::as_str) {
        Some("dev.plume.site.fragment") => stub
            .fragment_records
            .iter()
            .enumerate()
            .map(|(i, value)| {
                json!({
                    "uri": format!("at://{DID}/dev.plume.site.fragment/frag{i}"),
                    "cid": null,
                    "value": value
                })
            })
            .collect(),
        _ => Vec::new(),
    };
    Json(json!({"records": records, "cursor": null})).into_response()
}

async fn get_blob(
    State(stub): State<Arc<Stub>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let cid = params.get("cid").cloned().unwrap_or_default();
    *stub
        .blob_fetches
        .lock()
        .unwrap()
        .entry(cid.clone())
        .or_insert(0) += 1;
    match stub.blobs.get(&cid) {
        Some(data) => (StatusCode::OK, data.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no blob").into_response(),
    }
}

async fn spawn_stub(
    site_record: Value,
    fragment_records: Vec<Value>,
    blobs: HashMap<String, Bytes>,
) -> Arc<Stub> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    let stub = Arc::new(Stub {
        base,
        site_record,
        fragment_records,
        blobs,
        blob_fetches: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/xrpc/com.atproto.identity.resolveHandle", get(resolve_handle))
        .route("/xrpc/com.atproto.repo.getRecord", get(get_record))
        .route("/xrpc/com.atproto.repo.listRecords", get(list_records))
        .route("/xrpc/com.atproto.sync.getBlob", get(get_blob))
        .route("/:did", get(did_doc))
        .with_state(stub.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    stub
}

async fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzipEncoder::new(data);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await.unwrap();
    out
}

async fn spawn_daemon(stub: &Stub, data_dir: &std::path::Path) -> Service {
    let config = Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        data_dir: Some(data_dir.to_path_buf()),
        plc_directory: stub.base.clone(),
        handle_resolver: stub.base.clone(),
        ..Config::default()
    };
    spawn_service(&config).await.unwrap()
}

fn site_url(service: &Service, rest: &str) -> String {
    format!("http://{}/site/{DID}/{SITE}{rest}", service.addr)
}

#[tokio::test]
async fn end_to_end_resolution_fetch_and_serve() {
    let index_cid = helpers::test_cid(1);
    let about_cid = helpers::test_cid(2);
    let extra_cid = helpers::test_cid(3);

    let index_html = r#"<html><head><base href="/bogus/"><title>home</title></head><body><a href="/about">about</a></body></html>"#;
    let about_html = "<html><body>about page</body></html>";

    let mut blobs = HashMap::new();
    // the index arrives base64-wrapped and gzip-compressed
    blobs.insert(
        index_cid.clone(),
        Bytes::from(STANDARD.encode(gzip(index_html.as_bytes()).await)),
    );
    blobs.insert(about_cid.clone(), Bytes::from_static(about_html.as_bytes()));
    blobs.insert(extra_cid.clone(), Bytes::from_static(b"extra file"));

    let site_record = json!({
        "site": SITE,
        "createdAt": "2025-06-01T12:00:00Z",
        "root": {
            "type": "directory",
            "entries": [
                {"name": "index.html", "node": {"type": "file", "link": index_cid}},
                {"name": "about.html", "node": {"type": "file", "link": about_cid}}
            ]
        }
    });
    let fragment = json!({
        "site": SITE,
        "root": {"files": {"extra.txt": {"cid": extra_cid, "mimeType": "text/plain"}}}
    });

    let stub = spawn_stub(site_record, vec![fragment], blobs).await;

    // handle → identity → endpoint
    let resolver = Resolver::new(ResolverConfig {
        plc_directory: stub.base.clone(),
        handle_resolver: stub.base.clone(),
        retry: RetryPolicy::default(),
    })
    .unwrap();
    let resolved = resolver.resolve("alice.example").await.unwrap();
    assert_eq!(resolved.did, DID);
    assert_eq!(resolved.pds, stub.base);

    // manifest fetch merges the fragment into the site root
    let client = PdsClient::new(RetryPolicy::default()).unwrap();
    let manifest = fetch_site(&client, &resolved.pds, &resolved.did, SITE)
        .await
        .unwrap()
        .expect("site exists");
    assert_eq!(manifest.site, SITE);
    assert!(manifest.root.files.contains_key("index.html"));
    assert!(manifest.root.files.contains_key("extra.txt"));

    let dir = tempfile::tempdir().unwrap();
    let service = spawn_daemon(&stub, dir.path()).await;
    let http = reqwest::Client::new();

    // nothing resident yet: scoped requests are unavailable
    let response = http.get(site_url(&service, "/")).send().await.unwrap();
    assert_eq!(response.status(), 503);

    let info = SiteInfo {
        did: resolved.did.clone(),
        handle: resolved.handle.clone(),
        pds: resolved.pds.clone(),
        site: SITE.to_string(),
    };
    assert!(service
        .control
        .set_manifest(manifest, info)
        .await
        .unwrap());

    // root resolves to index.html, decompressed and rewritten
    let response = http.get(site_url(&service, "/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body.matches("<base").count(), 1);
    assert!(body.contains(r#"<base href="/site/did:plc:stub/mysite/">"#));
    assert!(!body.contains("/bogus/"));
    assert!(body.contains(r#"href="about""#));
    assert!(body.contains("back to resolver"));

    // extension fallback: /about resolves to about.html
    let response = http.get(site_url(&service, "/about")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("about page"));

    // merged fragment content is served
    let response = http
        .get(site_url(&service, "/extra.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "extra file");

    // unknown path
    let response = http
        .get(site_url(&service, "/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // identity mismatch
    let response = http
        .get(format!(
            "http://{}/site/did:plc:someoneelse/{SITE}/",
            service.addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // non-scoped paths are not handled by the site router
    let response = http
        .get(format!("http://{}/_status/livez", service.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    service.shutdown().await;
}

#[tokio::test]
async fn cache_admission_and_size_gate() {
    let css_cid = helpers::test_cid(10);
    let big_cid = helpers::test_cid(11);

    let mut blobs = HashMap::new();
    blobs.insert(
        css_cid.clone(),
        Bytes::from_static(b"body { background: url(/img/bg.png); }"),
    );
    // bigger than the cache gate after (pass-through) decoding
    blobs.insert(big_cid.clone(), Bytes::from(vec![0xAAu8; 6 * 1024 * 1024]));

    let site_record = json!({
        "site": SITE,
        "root": {"files": {
            "styles.css": {"cid": css_cid, "mimeType": "text/css"},
            "big.bin": {"cid": big_cid}
        }}
    });

    let stub = spawn_stub(site_record, Vec::new(), blobs).await;
    let client = PdsClient::new(RetryPolicy::default()).unwrap();
    let manifest = fetch_site(&client, &stub.base, DID, SITE)
        .await
        .unwrap()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let service = spawn_daemon(&stub, dir.path()).await;
    let info = SiteInfo {
        did: DID.to_string(),
        handle: None,
        pds: stub.base.clone(),
        site: SITE.to_string(),
    };
    service.control.set_manifest(manifest, info).await.unwrap();

    let http = reqwest::Client::new();

    // first fetch misses the cache and rewrites the css
    let response = http
        .get(site_url(&service, "/styles.css"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-plume-cache").is_none());
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("url(img/bg.png)"));
    assert_eq!(stub.fetches(&css_cid), 1);

    // second fetch is served from cache: no second upstream call
    let response = http
        .get(site_url(&service, "/styles.css"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-plume-cache").unwrap(),
        "hit"
    );
    assert_eq!(stub.fetches(&css_cid), 1);

    // oversized content is served but never admitted
    for expected_fetches in 1..=2 {
        let response = http
            .get(site_url(&service, "/big.bin"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().get("x-plume-cache").is_none());
        assert_eq!(response.bytes().await.unwrap().len(), 6 * 1024 * 1024);
        assert_eq!(stub.fetches(&big_cid), expected_fetches);
    }

    service.shutdown().await;
}

#[tokio::test]
async fn directory_listing_when_no_index() {
    let a_cid = helpers::test_cid(20);
    let b_cid = helpers::test_cid(21);

    let mut blobs = HashMap::new();
    blobs.insert(a_cid.clone(), Bytes::from_static(b"alpha"));
    blobs.insert(b_cid.clone(), Bytes::from_static(b"beta"));

    let site_record = json!({
        "site": SITE,
        "root": {
            "files": {"readme.txt": {"cid": a_cid, "mimeType": "text/plain"}},
            "dirs": {"docs": {"files": {"notes.txt": {"cid": b_cid, "mimeType": "text/plain"}}}}
        }
    });

    let stub = spawn_stub(site_record, Vec::new(), blobs).await;
    let client = PdsClient::new(RetryPolicy::default()).unwrap();
    let manifest = fetch_site(&client, &stub.base, DID, SITE)
        .await
        .unwrap()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let service = spawn_daemon(&stub, dir.path()).await;
    let info = SiteInfo {
        did: DID.to_string(),
        handle: None,
        pds: stub.base.clone(),
        site: SITE.to_string(),
    };
    service.control.set_manifest(manifest, info).await.unwrap();

    let http = reqwest::Client::new();

    // no index file anywhere: the root serves a synthesized listing,
    // post-processed like any other page
    let response = http.get(site_url(&service, "/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body.matches("<base").count(), 1);
    assert!(body.contains("readme.txt"));
    assert!(body.contains("docs/"));

    // subdirectory listing carries a parent link
    let response = http.get(site_url(&service, "/docs")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("notes.txt"));
    assert!(body.contains("../"));

    service.shutdown().await;
}
