//! Composite structures
//!
//! - `multitable`: prefixing of joined columns
//! - `extended`: base table plus auxiliary tables keyed by the base key
//! - `localized`: auxiliary tables with one row per locale
//! - `aggregate`: one repository joined into another's selection

pub mod aggregate;
pub mod extended;
pub mod localized;
pub mod multitable;

pub use aggregate::Aggregate;
pub use extended::{ExtendedFactory, Extension, JoinScope, Unscoped};
pub use localized::{LocaleScope, LocalizedFactory, LOCALE_COLUMN};
pub use multitable::{prefix_add, prefix_remove};
