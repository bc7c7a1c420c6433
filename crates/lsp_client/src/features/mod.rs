//! Shipped feature modules
//!
//! Each contributes capability fill/check logic and, where needed, server
//! request handlers; callers compose the set they want when constructing
//! a `Composer` for `Session::connect`.

pub mod completion;
pub mod definition;
pub mod document_symbol;
pub mod hover;
pub mod references;
pub mod rename;
pub mod text_document_sync;
pub mod workspace_configuration;

pub use completion::CompletionFeature;
pub use definition::DefinitionFeature;
pub use document_symbol::DocumentSymbolFeature;
pub use hover::HoverFeature;
pub use references::ReferencesFeature;
pub use rename::RenameFeature;
pub use text_document_sync::TextDocumentSyncFeature;
pub use workspace_configuration::WorkspaceConfigurationFeature;
