//! `textDocument/rename`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, Position, RenameClientCapabilities, RenameParams, ServerCapabilities,
    TextDocumentIdentifier, TextDocumentPositionParams, WorkDoneProgressParams, WorkspaceEdit,
};
use std::path::Path;

pub struct RenameFeature;

impl FeatureModule for RenameFeature {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/rename"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).rename = Some(RenameClientCapabilities {
            dynamic_registration: Some(false),
            prepare_support: Some(false),
            prepare_support_default_behavior: None,
            honors_change_annotations: Some(false),
        });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.rename_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/rename"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn rename(
        &self,
        path: &Path,
        language_id: &str,
        position: Position,
        new_name: String,
    ) -> Result<Option<WorkspaceEdit>, Error> {
        if !self.is_supported("rename") {
            return Err(Error::CapabilityUnsupported {
                feature: "rename".into(),
                method: "textDocument/rename".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = RenameParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position,
                },
                new_name,
                work_done_progress_params: WorkDoneProgressParams::default(),
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/rename",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
