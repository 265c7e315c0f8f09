//! Default constants for engine configuration.

/// Allocations since the last collection that trigger an automatic
/// collection when the outermost scoped region closes.
pub const DEFAULT_GC_THRESHOLD: usize = 10_000;

/// Maximum nesting depth of the value conversion engine.
pub const DEFAULT_MAX_CONVERSION_DEPTH: usize = 64;

/// Maximum depth of nested calls before a `RangeError` is thrown.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Maximum prototype chain length walked by property lookup.
pub const MAX_PROTOTYPE_CHAIN: usize = 10_000;

/// Largest length a dense array may grow to.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;
