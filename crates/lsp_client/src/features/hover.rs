//! `textDocument/hover`

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, Hover, HoverClientCapabilities, HoverParams, MarkupKind, Position,
    ServerCapabilities, TextDocumentIdentifier, TextDocumentPositionParams, WorkDoneProgressParams,
};
use std::path::Path;

pub struct HoverFeature;

impl FeatureModule for HoverFeature {
    fn name(&self) -> &'static str {
        "hover"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/hover"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        caps.text_document.get_or_insert_with(Default::default).hover = Some(HoverClientCapabilities {
            dynamic_registration: Some(false),
            content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
        });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.hover_provider {
            Some(_) => Ok(()),
            None => Err("textDocument/hover"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    pub async fn hover(
        &self,
        path: &Path,
        language_id: &str,
        position: Position,
    ) -> Result<Option<Hover>, Error> {
        if !self.is_supported("hover") {
            return Err(Error::CapabilityUnsupported {
                feature: "hover".into(),
                method: "textDocument/hover".into(),
            });
        }
        self.with_documents(std::slice::from_ref(&path.to_path_buf()), language_id, |uris| async move {
            let uri = uris.into_iter().next().expect("single path in, single uri out");
            let params = HoverParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position,
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
            };
            self.call(
                Scope::Document(std::slice::from_ref(&uri)),
                "textDocument/hover",
                serde_json::to_value(params)?,
            )
            .await
        })
        .await?
    }
}
