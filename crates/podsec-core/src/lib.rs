//! podsec core types
//!
//! Workload data model shared by the podsec crates: pods, containers and
//! their requested security contexts, the cluster objects collaborators
//! own (service accounts, namespaces, volumes), field-attributed
//! validation errors, and the store traits the admission engine reads
//! cluster state through.

pub mod error;
pub mod field;
pub mod traits;
pub mod types;

pub use error::*;
pub use field::*;
pub use traits::*;
pub use types::*;
