//! Cache key construction.
//!
//! Keys follow `<prefix>:<entity>:<id>` for entities and
//! `<prefix>:<entity>:<field>:<value>` for secondary indexes.

use std::fmt::Display;

/// Default namespace prefix.
pub const DEFAULT_PREFIX: &str = "cache";

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Builds cache keys under a fixed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Creates a builder with the given namespace prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Returns the namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of an entity by primary identifier.
    #[must_use]
    pub fn build_key(&self, entity: &str, id: impl Display) -> String {
        format!("{}{SEPARATOR}{entity}{SEPARATOR}{id}", self.prefix)
    }

    /// Key of a secondary index entry mapping `field = value` to an identifier.
    #[must_use]
    pub fn build_index_key(&self, entity: &str, field: &str, value: impl Display) -> String {
        format!("{}{SEPARATOR}{entity}{SEPARATOR}{field}{SEPARATOR}{value}", self.prefix)
    }

    /// Glob pattern matching every key of an entity, for scans.
    #[must_use]
    pub fn entity_pattern(&self, entity: &str) -> String {
        format!("{}{SEPARATOR}{entity}{SEPARATOR}*", self.prefix)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
