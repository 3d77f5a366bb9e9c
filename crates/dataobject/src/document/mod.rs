//! Documents
//!
//! Schemaless records kept in a `DocumentStore`. Edits are applied locally
//! and logged per operator; a save sends the merged change log of the
//! document and its opened modules as one update.

pub mod change_log;
pub mod factory;
pub mod module;
pub mod operations;
pub mod record;
pub mod store;

pub use change_log::ChangeLog;
pub use factory::DocumentFactory;
pub use module::Module;
pub use operations::{UpdateOperation, UpdateOperations};
pub use record::Document;
pub use store::{DocumentQuery, DocumentStore, MemoryDocumentStore, ID_FIELD};
