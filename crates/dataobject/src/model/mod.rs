//! Model System - persisted objects and the capability traits they share
//!
//! - `entity`: one record with dirty-field tracking
//! - `primary_key`: single and composite key values
//! - `traits`: Identifiable, Trackable, Joinable, Localizable, Cascadable

pub mod entity;
pub mod primary_key;
pub mod traits;

pub use entity::{nested_key, Entity};
pub use primary_key::PrimaryKey;
pub use traits::{Cascadable, Identifiable, Joinable, Localizable, Trackable};
