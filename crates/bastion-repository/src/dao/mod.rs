//! DAO (Data Access Object) layer.
//!
//! DAOs talk to exactly one data source and know nothing about caching.
//! The cached repository layers the cache on top of a DAO.

pub mod user_dao;

pub use user_dao::UserDao;

#[cfg(test)]
pub use user_dao::MockUserDao;
