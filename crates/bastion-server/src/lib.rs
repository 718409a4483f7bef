//! # Bastion Server Library
//!
//! Wiring for the service binary: backend connections, the cached user
//! repository, the task scheduler and its built-in tasks.

pub mod app;
pub mod startup;
pub mod tasks;

pub use app::{connect_store, App};
