//! Services the server-initiated `workspace/configuration` pull
//!
//! Contributes no capability of its own beyond advertising
//! `workspace.configuration` support; its only real job is registering the
//! request handler that answers each `ConfigurationItem` by resolving it
//! against the shared `ConfigStore` (the push side of the same loop goes
//! through `Session::broadcast("workspace/didChangeConfiguration", ...)`).

use crate::capability::FeatureModule;
use crate::config::ConfigStore;
use crate::handlers::HandlerRegistry;
use lsp_support::Error;
use lsp_types::{ClientCapabilities, ConfigurationParams, ServerCapabilities};
use serde_json::Value;
use std::sync::Arc;

pub struct WorkspaceConfigurationFeature {
    config: Arc<ConfigStore>,
}

impl WorkspaceConfigurationFeature {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }
}

impl FeatureModule for WorkspaceConfigurationFeature {
    fn name(&self) -> &'static str {
        "workspace_configuration"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["workspace/configuration"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.workspace.get_or_insert_with(Default::default).configuration = Some(true);
    }

    fn check_server_capabilities(&self, _caps: &ServerCapabilities) -> Result<(), &'static str> {
        Ok(())
    }

    fn register_handlers(&self, registry: &HandlerRegistry) -> Result<(), Error> {
        let config = self.config.clone();
        registry.on_request(
            "workspace/configuration",
            Arc::new(move |params: Value| {
                let config = config.clone();
                Box::pin(async move {
                    let params: ConfigurationParams = serde_json::from_value(params).map_err(|e| {
                        crate::message::JsonRpcError::invalid_params(format!(
                            "malformed workspace/configuration params: {e}"
                        ))
                    })?;
                    let values: Vec<Value> = params
                        .items
                        .iter()
                        .map(|item| {
                            let uri = item
                                .scope_uri
                                .clone()
                                .unwrap_or_else(|| url::Url::parse("file:///").expect("static URI is valid"));
                            config.resolve_section(&uri, item.section.as_deref())
                        })
                        .collect();
                    Ok(Value::Array(values))
                })
            }),
        )
    }
}
