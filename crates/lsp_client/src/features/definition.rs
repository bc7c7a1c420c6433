//! `textDocument/definition`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, GotoCapability, GotoDefinitionParams, GotoDefinitionResponse,
    PartialResultParams, Position, ServerCapabilities, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};
use std::path::Path;

pub struct DefinitionFeature;

impl FeatureModule for DefinitionFeature {
    fn name(&self) -> &'static str {
        "definition"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/definition"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).definition = Some(GotoCapability {
            dynamic_registration: Some(false),
            link_support: Some(false),
        });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.definition_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/definition"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn definition(
        &self,
        path: &Path,
        language_id: &str,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>, Error> {
        if !self.is_supported("definition") {
            return Err(Error::CapabilityUnsupported {
                feature: "definition".into(),
                method: "textDocument/definition".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = GotoDefinitionParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier {
                        uri: crate::uri::to_lsp_uri(&uri)?,
                    },
                    position,
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/definition",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
