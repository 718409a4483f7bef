//! User domain model.

pub mod role;
pub mod status;
pub mod user;

pub use role::*;
pub use status::*;
pub use user::*;
