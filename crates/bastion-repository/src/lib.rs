//! # Bastion Repository
//!
//! Data access for users, with the read-through cache in front:
//!
//! ```text
//! Caller
//!   ↓  Arc<dyn UserRepository>
//! CachedUserRepository         (cache-aside reads, invalidating writes)
//!   ↓  Arc<dyn UserDao>
//! MySqlUserDao                 (SQLx)
//!   ↓
//! MySQL
//! ```
//!
//! [`UnitOfWork`] covers writes that must share one transaction, and
//! [`CachedUserRepository::with_tx`] runs user writes inside it.

pub mod cached;
pub mod dao;
pub mod mysql;
pub mod pool;
pub mod traits;
pub mod tx;

pub use cached::{CachedUserRepository, TxUserRepository};
pub use dao::UserDao;
pub use mysql::{MySqlUserDao, TxUserDao};
pub use pool::*;
pub use traits::*;
pub use tx::{tx_op, BatchError, TxHandle, TxOp, TxSource, UnitOfWork};
