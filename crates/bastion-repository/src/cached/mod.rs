//! Cache-backed repositories.

pub mod tx_user_repository;
pub mod user_repository;

pub use tx_user_repository::TxUserRepository;
pub use user_repository::CachedUserRepository;
