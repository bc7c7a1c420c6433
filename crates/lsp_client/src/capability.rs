//! Composes a client's capabilities from pluggable feature modules
//!
//! Each feature contributes a slice of `ClientCapabilities`, a validator
//! run against the server's reported `ServerCapabilities` once
//! `initialize` returns, and the handler registrations it needs. A
//! validator that rejects fails the whole session at startup rather than
//! surfacing a runtime "method not found" the first time a caller uses
//! the feature.

use crate::handlers::HandlerRegistry;
use dashmap::DashSet;
use lsp_support::Error;
use lsp_types::{ClientCapabilities, ServerCapabilities};
use std::sync::Arc;

/// A pluggable contribution to a session's capability surface.
///
/// Fill order across features follows LSP category (general,
/// textDocument, workspace, window, notebookDocument) then declaration
/// order within a category — callers are responsible for listing features
/// in that order when constructing a session (documented open-question
/// resolution, see DESIGN.md); the composer itself just walks the list it
/// is given and trusts additive, non-overlapping fills.
pub trait FeatureModule: Send + Sync {
    /// Stable name used in `CapabilityUnsupported` errors.
    fn name(&self) -> &'static str;

    /// LSP methods this feature owns.
    fn methods(&self) -> &'static [&'static str];

    /// Add this feature's contribution to the client capability tree.
    fn fill_client_capabilities(&self, caps: &mut ClientCapabilities);

    /// Validate that the server supports what this feature needs.
    /// Returns the offending method name on rejection.
    fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str>;

    /// Register any server-request/notification handlers this feature
    /// needs (e.g. `workspace/configuration`'s pull side).
    fn register_handlers(&self, _registry: &HandlerRegistry) -> Result<(), Error> {
        Ok(())
    }
}

/// Collects feature modules, builds the combined `ClientCapabilities`, and
/// validates them against a server's response.
pub struct Composer {
    features: Vec<Arc<dyn FeatureModule>>,
    validated: DashSet<&'static str>,
}

impl Composer {
    pub fn new(features: Vec<Arc<dyn FeatureModule>>) -> Self {
        Self {
            features,
            validated: DashSet::new(),
        }
    }

    /// Build the `initialize` request's capability payload.
    pub fn build_client_capabilities(&self) -> ClientCapabilities {
        let mut caps = ClientCapabilities::default();
        for feature in &self.features {
            feature.fill_client_capabilities(&mut caps);
        }
        caps
    }

    /// Run every feature's validator. Fails hard on the first rejection,
    /// per the composer's "hard failure at startup" contract.
    pub fn validate(&self, server_caps: &ServerCapabilities) -> Result<(), Error> {
        for feature in &self.features {
            match feature.check_server_capabilities(server_caps) {
                Ok(()) => {
                    self.validated.insert(feature.name());
                }
                Err(method) => {
                    return Err(Error::CapabilityUnsupported {
                        feature: feature.name().to_string(),
                        method: method.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Register every validated feature's handlers. Must run after
    /// `validate` succeeds and before the handler registry locks.
    pub fn register_handlers(&self, registry: &HandlerRegistry) -> Result<(), Error> {
        for feature in &self.features {
            feature.register_handlers(registry)?;
        }
        Ok(())
    }

    /// Whether `feature` passed validation and is reachable from the
    /// session surface.
    pub fn is_supported(&self, feature: &str) -> bool {
        self.validated.contains(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{OneOf, TextDocumentSyncCapability, TextDocumentSyncKind};

    struct AlwaysOk;
    impl FeatureModule for AlwaysOk {
        fn name(&self) -> &'static str {
            "always_ok"
        }
        fn methods(&self) -> &'static [&'static str] {
            &["textDocument/sync"]
        }
        fn fill_client_capabilities(&self, _caps: &mut ClientCapabilities) {}
        fn check_server_capabilities(&self, _caps: &ServerCapabilities) -> Result<(), &'static str> {
            Ok(())
        }
    }

    struct RequiresRename;
    impl FeatureModule for RequiresRename {
        fn name(&self) -> &'static str {
            "rename"
        }
        fn methods(&self) -> &'static [&'static str] {
            &["textDocument/rename"]
        }
        fn fill_client_capabilities(&self, _caps: &mut ClientCapabilities) {}
        fn check_server_capabilities(&self, caps: &ServerCapabilities) -> Result<(), &'static str> {
            match &caps.rename_provider {
                Some(_) => Ok(()),
                None => Err("textDocument/rename"),
            }
        }
    }

    #[test]
    fn validation_rejects_missing_capability() {
        let composer = Composer::new(vec![Arc::new(RequiresRename)]);
        let err = composer.validate(&ServerCapabilities::default()).unwrap_err();
        match err {
            Error::CapabilityUnsupported { feature, method } => {
                assert_eq!(feature, "rename");
                assert_eq!(method, "textDocument/rename");
            }
            _ => panic!("wrong error variant"),
        }
        assert!(!composer.is_supported("rename"));
    }

    #[test]
    fn validation_accepts_present_capability() {
        let composer = Composer::new(vec![Arc::new(RequiresRename), Arc::new(AlwaysOk)]);
        let caps = ServerCapabilities {
            rename_provider: Some(OneOf::Left(true)),
            text_document_sync: Some(TextDocumentSyncCapability::Kind(
                TextDocumentSyncKind::FULL,
            )),
            ..Default::default()
        };
        composer.validate(&caps).unwrap();
        assert!(composer.is_supported("rename"));
        assert!(composer.is_supported("always_ok"));
    }
}
