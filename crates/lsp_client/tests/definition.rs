mod support;

use lsp_client::{Session, SessionConfig, Transport};
use serde_json::json;
use std::sync::Arc;
use support::fake_server::FakeServer;

#[tokio::test]
async fn definition_opens_document_before_request_and_closes_after_scope() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.py");
    tokio::fs::write(&file, "x = 1\n").await.unwrap();

    let server = FakeServer::spawn(|mut server| async move {
        let init = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": init["id"].clone(),
                "result": { "capabilities": { "definitionProvider": true } },
            }))
            .await;
        let _initialized = server.recv().await;

        let did_open = server.recv().await;
        assert_eq!(did_open["method"], "textDocument/didOpen");

        let request = server.recv().await;
        assert_eq!(request["method"], "textDocument/definition");
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "result": [{
                    "uri": did_open["params"]["textDocument"]["uri"],
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 1 },
                    },
                }],
            }))
            .await;

        let did_close = server.recv().await;
        assert_eq!(did_close["method"], "textDocument/didClose");
    });

    let session = Session::connect(
        vec![server.clone() as Arc<dyn Transport>],
        vec![Arc::new(lsp_client::features::DefinitionFeature)],
        SessionConfig::default(),
    )
    .await
    .unwrap();

    let response = session
        .definition(&file, "python", lsp_types::Position::new(0, 0))
        .await
        .unwrap();
    assert!(response.is_some());

    server.join().await;
}
