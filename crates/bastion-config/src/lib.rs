//! # Bastion Config
//!
//! Typed application configuration, the layered loader and validation.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
