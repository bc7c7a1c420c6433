//! `textDocument/references`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, DynamicRegistrationClientCapabilities, Location, PartialResultParams,
    Position, ReferenceContext, ReferenceParams, ServerCapabilities, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};
use std::path::Path;

pub struct ReferencesFeature;

impl FeatureModule for ReferencesFeature {
    fn name(&self) -> &'static str {
        "references"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/references"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).references =
            Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.references_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/references"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn references(
        &self,
        path: &Path,
        language_id: &str,
        position: Position,
        include_declaration: bool,
    ) -> Result<Option<Vec<Location>>, Error> {
        if !self.is_supported("references") {
            return Err(Error::CapabilityUnsupported {
                feature: "references".into(),
                method: "textDocument/references".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = ReferenceParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position,
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
                context: ReferenceContext {
                    include_declaration,
                },
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/references",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
