mod support;

use lsp_client::config::ConfigStore;
use lsp_client::features::WorkspaceConfigurationFeature;
use lsp_client::{Session, SessionConfig, Transport};
use serde_json::json;
use std::sync::Arc;
use support::fake_server::FakeServer;

#[tokio::test]
async fn server_initiated_configuration_pull_resolves_against_global_store() {
    let config = Arc::new(ConfigStore::with_global(json!({
        "python": { "analysis": { "typeCheckingMode": "basic" } }
    })));

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

        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "workspace/configuration",
                "params": { "items": [{ "section": "python.analysis" }] },
            }))
            .await;

        let response = server.recv().await;
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"], json!([{ "typeCheckingMode": "basic" }]));
    });

    let _session = Session::connect(
        vec![server.clone() as Arc<dyn Transport>],
        vec![Arc::new(WorkspaceConfigurationFeature::new(config.clone()))],
        SessionConfig {
            config,
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    server.join().await;
}
