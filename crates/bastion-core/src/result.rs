//! Result type aliases for Bastion.

use crate::BastionError;

/// A specialized `Result` type for Bastion operations.
pub type BastionResult<T> = Result<T, BastionError>;

/// A boxed future returning a `BastionResult`.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = BastionResult<T>> + Send + 'a>>;
