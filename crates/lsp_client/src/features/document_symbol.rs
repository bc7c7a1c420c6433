//! `textDocument/documentSymbol`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, DocumentSymbolClientCapabilities, DocumentSymbolParams,
    DocumentSymbolResponse, PartialResultParams, ServerCapabilities, TextDocumentIdentifier,
    WorkDoneProgressParams,
};
use std::path::Path;

pub struct DocumentSymbolFeature;

impl FeatureModule for DocumentSymbolFeature {
    fn name(&self) -> &'static str {
        "document_symbol"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/documentSymbol"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).document_symbol =
            Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                symbol_kind: None,
                hierarchical_document_symbol_support: Some(true),
                tag_support: None,
            });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.document_symbol_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/documentSymbol"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn document_symbols(
        &self,
        path: &Path,
        language_id: &str,
    ) -> Result<Option<DocumentSymbolResponse>, Error> {
        if !self.is_supported("document_symbol") {
            return Err(Error::CapabilityUnsupported {
                feature: "document_symbol".into(),
                method: "textDocument/documentSymbol".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/documentSymbol",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
