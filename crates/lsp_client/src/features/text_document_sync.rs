//! Advertises full-document sync and exposes `didChange`
//!
//! Open/close bracketing lives in `sync.rs`; this feature only owns the
//! capability negotiation and the `didChange` notification sent while a
//! document is held open by `Session::with_documents`. Incremental sync
//! is out of scope (see DESIGN.md) — every change is sent as a full
//! document replacement, which every server implementing
//! `textDocument/didChange` must accept regardless of its preferred kind.

use crate::capability::FeatureModule;
use crate::handlers::HandlerRegistry;
use crate::session::{Scope, Session};
use lsp_support::Error;
use lsp_types::{
    ClientCapabilities, DidChangeTextDocumentParams, ServerCapabilities, TextDocumentContentChangeEvent,
    TextDocumentSyncClientCapabilities, VersionedTextDocumentIdentifier,
};
use url::Url;

pub struct TextDocumentSyncFeature;

impl FeatureModule for TextDocumentSyncFeature {
    fn name(&self) -> &'static str {
        "text_document_sync"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["textDocument/didOpen", "textDocument/didChange", "textDocument/didClose"]
    }

    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities) {
        let text_document = caps.text_document.get_or_insert_with(Default::default);
        text_document.synchronization = Some(TextDocumentSyncClientCapabilities {
            dynamic_registration: Some(false),
            will_save: Some(false),
            will_save_wait_until: Some(false),
            did_save: Some(true),
        });
    }

    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
        match caps.text_document_sync {
            Some(_) => Ok(()),
            None => Err("textDocument/didOpen"),
        }
    }

    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

impl Session {
    /// Replace the full text of an already-open document and bump its
    /// version.
    pub async fn did_change(&self, uri: &Url, version: i32, text: String) -> Result<(), Error> {
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text,
            }],
        };
        self.notify(
            Scope::Document(std::slice::from_ref(uri)),
            "textDocument/didChange",
            serde_json::to_value(params)?,
        )
        .await
    }
}
