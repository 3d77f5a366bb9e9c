//! Capability traits shared by entities and repositories

use async_trait::async_trait;

use super::primary_key::PrimaryKey;
use crate::backends::Row;
use crate::error::ModelResult;
use crate::query::JoinClause;
use crate::structure::Extension;

/// Objects addressed by a primary key
pub trait Identifiable {
    fn primary_key(&self) -> &PrimaryKey;

    fn primary_fields(&self) -> &[String];
}

/// Objects that record pending field writes
pub trait Trackable {
    fn modified_fields(&self) -> &Row;

    fn has_modified_fields(&self) -> bool {
        !self.modified_fields().is_empty()
    }

    /// Whether `field` itself has a pending write
    fn is_modified(&self, field: &str) -> bool {
        self.modified_fields().contains_key(field)
    }
}

/// Repositories that join auxiliary tables onto their base table
pub trait Joinable {
    fn extensions(&self) -> Vec<Extension>;

    /// Join clauses for the current selection, in extension order
    fn joins(&self) -> ModelResult<Vec<JoinClause>>;
}

/// Repositories scoped to a locale
pub trait Localizable {
    /// Effective locale: the local one, else the connection default
    fn locale(&self) -> Option<String>;

    fn set_locale(&self, locale: Option<&str>);

    fn is_locale_set(&self) -> bool {
        self.locale().is_some()
    }
}

/// Objects whose save and delete may cascade to attached objects
#[async_trait]
pub trait Cascadable: Send {
    async fn save(&mut self) -> ModelResult<()>;

    async fn delete(&mut self) -> ModelResult<()>;

    fn is_deleted(&self) -> bool;
}
