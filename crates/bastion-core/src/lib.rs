//! # Bastion Core
//!
//! Error taxonomy, identifiers, pagination and the user domain model shared
//! by the cache, repository and job crates.

pub mod domain;
pub mod error;
pub mod id;
pub mod pagination;
pub mod result;
pub mod telemetry;
pub mod validation;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use pagination::*;
pub use result::*;
pub use validation::*;
