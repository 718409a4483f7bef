//! MySQL implementations.

pub mod user_dao;

pub use user_dao::{MySqlUserDao, TxUserDao};
