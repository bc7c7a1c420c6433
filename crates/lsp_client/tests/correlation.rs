mod support;

use lsp_client::{Scope, Session, SessionConfig, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use support::fake_server::FakeServer;

#[tokio::test]
async fn out_of_order_responses_reach_their_own_waiters() {
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

        let mut requests = Vec::new();
        for _ in 0..3 {
            requests.push(server.recv().await);
        }

        // Reply in reverse order of arrival.
        for request in requests.into_iter().rev() {
            let marker = request["params"]["marker"].clone();
            server
                .send(json!({
                    "jsonrpc": "2.0",
                    "id": request["id"].clone(),
                    "result": { "echo": marker },
                }))
                .await;
        }
    });

    let session = Session::connect(
        vec![server.clone() as Arc<dyn Transport>],
        vec![],
        SessionConfig::default(),
    )
    .await
    .unwrap();

    let (a, b, c) = tokio::join!(
        session.call::<Value>(Scope::Workspace, "workspace/executeCommand", json!({ "marker": "a" })),
        session.call::<Value>(Scope::Workspace, "workspace/executeCommand", json!({ "marker": "b" })),
        session.call::<Value>(Scope::Workspace, "workspace/executeCommand", json!({ "marker": "c" })),
    );

    assert_eq!(a.unwrap()["echo"], json!("a"));
    assert_eq!(b.unwrap()["echo"], json!("b"));
    assert_eq!(c.unwrap()["echo"], json!("c"));

    server.join().await;
}
