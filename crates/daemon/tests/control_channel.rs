//! Integration tests for the control channel.

mod helpers;

use std::time::Duration;

use url::Url;

use plume_daemon::control::{run_control_loop, ControlHandle};
use plume_daemon::ServiceState;

async fn setup() -> (ControlHandle, ServiceState) {
    let state = ServiceState::ephemeral().await.unwrap();
    let (control, rx) = ControlHandle::new();
    tokio::spawn(run_control_loop(state.clone(), rx));
    (control, state)
}

#[tokio::test]
async fn set_manifest_transitions_to_loaded() {
    let (control, state) = setup().await;
    let pds = Url::parse("https://pds.example").unwrap();

    let status = control.status().await.unwrap();
    assert!(!status.has_manifest);
    assert!(status.site_info.is_none());

    let ok = control
        .set_manifest(
            helpers::empty_manifest("mysite"),
            helpers::site_info("did:plc:xyz", &pds, "mysite"),
        )
        .await
        .unwrap();
    assert!(ok);

    let status = control.status().await.unwrap();
    assert!(status.has_manifest);
    assert_eq!(status.site_info.unwrap().did, "did:plc:xyz");
    assert!(state.has_manifest());
}

#[tokio::test]
async fn clear_manifest_reverses_set() {
    let (control, state) = setup().await;
    let pds = Url::parse("https://pds.example").unwrap();

    control
        .set_manifest(
            helpers::empty_manifest("mysite"),
            helpers::site_info("did:plc:xyz", &pds, "mysite"),
        )
        .await
        .unwrap();
    assert!(state.has_manifest());

    assert!(control.clear_manifest().await.unwrap());
    assert!(!state.has_manifest());

    let status = control.status().await.unwrap();
    assert!(!status.has_manifest);

    // durable entry is gone too: rehydration finds nothing
    state.rehydrate().await;
    assert!(!state.has_manifest());
}

#[tokio::test]
async fn clear_cache_leaves_resident_state() {
    let (control, state) = setup().await;
    let pds = Url::parse("https://pds.example").unwrap();

    control
        .set_manifest(
            helpers::empty_manifest("mysite"),
            helpers::site_info("did:plc:xyz", &pds, "mysite"),
        )
        .await
        .unwrap();

    let data = bytes::Bytes::from_static(b"cached bytes");
    state.store().put_blob(&helpers::test_cid(1), &data).await;

    assert!(control.clear_cache().await.unwrap());
    assert!(state.store().get_blob(&helpers::test_cid(1)).await.is_none());
    // resident state untouched
    assert!(state.has_manifest());
}

#[tokio::test]
async fn replies_do_not_cross_between_concurrent_callers() {
    let (control, _state) = setup().await;
    let pds = Url::parse("https://pds.example").unwrap();
    control
        .set_manifest(
            helpers::empty_manifest("mysite"),
            helpers::site_info("did:plc:xyz", &pds, "mysite"),
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let control = control.clone();
        tasks.push(tokio::spawn(async move {
            let status = control.status().await.unwrap();
            assert!(status.has_manifest);
            let cleared = control.clear_cache().await.unwrap();
            assert!(cleared);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn dropped_worker_is_a_closed_error() {
    let state = ServiceState::ephemeral().await.unwrap();
    let (control, rx) = ControlHandle::new();
    drop(rx);
    drop(state);

    let err = control.status().await.unwrap_err();
    assert_eq!(err, plume_daemon::ControlError::Closed);
}

#[tokio::test]
async fn no_reply_within_window_is_failure() {
    // a worker that receives but never replies
    let (control, rx) = ControlHandle::new();
    let control = control.with_timeout(Duration::from_millis(50));
    tokio::spawn(async move {
        while let Ok(message) = rx.recv_async().await {
            // hold every reply sender so the caller times out
            std::mem::forget(message);
        }
    });

    let err = control.status().await.unwrap_err();
    assert_eq!(err, plume_daemon::ControlError::Timeout);
}
