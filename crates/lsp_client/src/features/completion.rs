//! `textDocument/completion`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, CompletionClientCapabilities, CompletionParams, CompletionResponse,
    PartialResultParams, Position, ServerCapabilities, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};
use std::path::Path;

pub struct CompletionFeature;

impl FeatureModule for CompletionFeature {
    fn name(&self) -> &'static str {
        "completion"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/completion"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).completion =
            Some(CompletionClientCapabilities {
                dynamic_registration: Some(false),
                ..Default::default()
            });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.completion_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/completion"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn completion(
        &self,
        path: &Path,
        language_id: &str,
        position: Position,
    ) -> Result<Option<CompletionResponse>, Error> {
        if !self.is_supported("completion") {
            return Err(Error::CapabilityUnsupported {
                feature: "completion".into(),
                method: "textDocument/completion".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = CompletionParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: crate::uri::to_lsp_uri(&uri)?,
                    },
                    position,
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
                context: None,
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/completion",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
