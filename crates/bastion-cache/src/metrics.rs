//! Prometheus metrics for the read-through cache.

use metrics::{counter, describe_counter};

/// Metric names for the cache.
pub mod names {
    /// Cache operations by kind (hit, miss, set, delete).
    pub const CACHE_OPERATIONS_TOTAL: &str = "bastion_cache_operations_total";
    /// Cache hits.
    pub const CACHE_HITS_TOTAL: &str = "bastion_cache_hits_total";
    /// Cache misses.
    pub const CACHE_MISSES_TOTAL: &str = "bastion_cache_misses_total";
    /// Cache-layer errors that were absorbed.
    pub const CACHE_ERRORS_TOTAL: &str = "bastion_cache_errors_total";
    /// Callers that joined a load started by another caller.
    pub const CACHE_COALESCED_TOTAL: &str = "bastion_cache_coalesced_total";
}

/// Error type labels.
pub mod error_types {
    /// The store could not be read.
    pub const READ: &str = "read_error";
    /// The store could not be written.
    pub const WRITE: &str = "write_error";
    /// A cached value failed to decode.
    pub const DESERIALIZE: &str = "deserialization_error";
    /// An index value failed to parse as an identifier.
    pub const CONVERSION: &str = "conversion_error";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::CACHE_OPERATIONS_TOTAL,
        "Total number of cache operations by kind and entity"
    );
    describe_counter!(names::CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(
        names::CACHE_ERRORS_TOTAL,
        "Total number of cache errors absorbed by the cache layer"
    );
    describe_counter!(
        names::CACHE_COALESCED_TOTAL,
        "Total number of callers served by another caller's in-flight load"
    );
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a hit (including negative-cache hits).
    pub fn hit(entity: &str) {
        Self::operation("hit", entity);
        counter!(names::CACHE_HITS_TOTAL, "entity" => entity.to_string()).increment(1);
    }

    /// Record a miss.
    pub fn miss(entity: &str) {
        Self::operation("miss", entity);
        counter!(names::CACHE_MISSES_TOTAL, "entity" => entity.to_string()).increment(1);
    }

    /// Record a successful write.
    pub fn set(entity: &str) {
        Self::operation("set", entity);
    }

    /// Record deleted keys.
    pub fn delete(entity: &str, keys: u64) {
        counter!(
            names::CACHE_OPERATIONS_TOTAL,
            "operation" => "delete",
            "entity" => entity.to_string()
        )
        .increment(keys);
    }

    /// Record an absorbed error.
    pub fn error(operation: &str, error_type: &str) {
        counter!(
            names::CACHE_ERRORS_TOTAL,
            "operation" => operation.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    /// Record a caller that joined an in-flight load.
    pub fn coalesced(entity: &str) {
        counter!(names::CACHE_COALESCED_TOTAL, "entity" => entity.to_string()).increment(1);
    }

    fn operation(operation: &'static str, entity: &str) {
        counter!(
            names::CACHE_OPERATIONS_TOTAL,
            "operation" => operation,
            "entity" => entity.to_string()
        )
        .increment(1);
    }
}
