//! Plugins
//!
//! Plugins are secondary entities attached to an owner entity. A
//! `PluginableFactory` wraps an owner repository, loads plugin factories from
//! its static `PluginRegistry` by name and joins every loaded plugin into its
//! selections. Saving or deleting the owner cascades to its plugins first.

use async_trait::async_trait;

use crate::backends::Row;
use crate::error::ModelResult;
use crate::model::Entity;
use crate::query::Select;
use crate::repository::{Persistence, TableStructure};

pub mod pluginable;
pub mod registry;
pub mod table;

pub use pluginable::{PluginableEntity, PluginableFactory};
pub use registry::{plugin_constructor, PluginConstructor, PluginRegistry};
pub use table::{Plugin, TablePluginFactory};

/// Factory of one plugin kind
#[async_trait]
pub trait PluginFactory: Persistence {
    fn plugin_name(&self) -> &str;

    /// Join the plugin onto an owner selection; columns come back as `<name>.<field>`
    fn add_to_select(&self, select: Select, owner: &TableStructure) -> ModelResult<Select>;

    /// Plugin of `owner` built from its `<name>.<field>` columns
    fn plugin_object(&self, owner: &Entity, data: Row) -> ModelResult<Plugin>;

    /// Stored plugin of `owner`, or a new unsaved one
    async fn plugin_by_owner(&self, owner: &Entity) -> ModelResult<Plugin>;
}
