//! # elif-dataobject: Data mapper layer for elif.rs
//!
//! Entities with dirty-field tracking, table repositories with single and
//! composite keys, composite (multitable) and localized structures, plugins
//! attached to owner entities, and schemaless documents with change logs.
//!
//! Every repository is built on an explicit [`Connection`] that carries the
//! driver, the optional document store, the default locale and the registry
//! used to reattach deserialized entities.

pub mod backends;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod model;
pub mod plugin;
pub mod query;
pub mod repository;
pub mod structure;

pub use backends::{Driver, FailOn, MemoryDriver, PostgresDriver, Row, SqlDialect};
pub use config::DataObjectConfig;
pub use connection::{global, set_global, Connection, ConnectionBuilder};
pub use document::{
    ChangeLog, Document, DocumentFactory, DocumentQuery, DocumentStore, MemoryDocumentStore,
    Module, UpdateOperation, UpdateOperations,
};
pub use error::{DriverError, ModelError, ModelResult, Operation};
pub use model::{Cascadable, Entity, Identifiable, Joinable, Localizable, PrimaryKey, Trackable};
pub use plugin::{
    plugin_constructor, Plugin, PluginFactory, PluginRegistry, PluginableEntity,
    PluginableFactory, TablePluginFactory,
};
pub use query::{JoinType, OrderBy, Where};
pub use repository::{Factory, PageSource, Paginator, Persistence, Repository};
pub use structure::{Aggregate, ExtendedFactory, LocalizedFactory};

/// Traits and types most callers need
pub mod prelude {
    pub use crate::connection::Connection;
    pub use crate::document::{DocumentFactory, UpdateOperations};
    pub use crate::error::{ModelError, ModelResult};
    pub use crate::model::{Cascadable, Entity, Identifiable, Joinable, Localizable, Trackable};
    pub use crate::plugin::{PluginRegistry, PluginableFactory};
    pub use crate::query::{OrderBy, Where};
    pub use crate::repository::{Factory, PageSource, Persistence, Repository};
    pub use crate::structure::{Aggregate, ExtendedFactory, LocalizedFactory};
}
