mod support;

use lsp_client::{Scope, Session, SessionConfig, Transport};
use lsp_support::Error;
use serde_json::{json, Value};
use std::sync::Arc;
use support::fake_server::FakeServer;

#[tokio::test]
async fn cancelling_before_reply_sends_wire_cancellation_and_drops_late_reply() {
    let (request_tx, request_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel();

    let server = FakeServer::spawn(|mut server| async move {
        let init = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": init["id"].clone(),
                "result": { "capabilities": {} },
            }))
            .await;
        let _initialized = server.recv().await;

        let request = server.recv().await;
        let _ = request_tx.send(request["id"].clone());

        let cancel = server.recv().await;
        assert_eq!(cancel["method"], "$/cancelRequest");

        // Wait for the test body to finish asserting on the cancellation
        // before sending the late, now-irrelevant reply.
        let _ = release_rx.await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "result": { "late": true },
            }))
            .await;
    });

    let session = Session::connect(
        vec![server.clone() as Arc<dyn Transport>],
        vec![],
        SessionConfig::default(),
    )
    .await
    .unwrap();

    let (cancel_handle, result) = session
        .call_cancelable::<Value>(Scope::Workspace, "workspace/executeCommand", json!({}))
        .await
        .unwrap();

    let sent_id = request_rx.await.unwrap();
    assert!(!sent_id.is_null());

    cancel_handle.cancel().await.unwrap();
    let outcome = result.await;
    assert!(matches!(outcome, Err(Error::Cancelled)));

    let _ = release_tx.send(());
    // The server's late reply has nowhere to land; the binding stays
    // healthy and the session remains usable afterward.
    assert_eq!(session.lifecycle_state(), lsp_client::LifecycleState::Running);

    server.join().await;
}
