//! RegForge - A JIT-compiled regular expression engine
//!
//! RegForge compiles each pattern to native machine code specialized to
//! that pattern and caches the result process-wide. The emitted function
//! scans a null-terminated byte string and reports the match bounds.
//!
//! # Quick Start
//!
//! ```
//! use regforge::PatternCache;
//!
//! let cache = PatternCache::new();
//! let found = cache.find(b"^ab+c$", b"abbbc").unwrap();
//! assert_eq!(found.map(|m| m.span()), Some((0, 5)));
//!
//! // Hold a compiled pattern across many inputs without re-locking:
//! let compiled = cache.acquire(b"\\d\\d").unwrap();
//! assert_ne!(compiled.address(), 0);
//! cache.release(b"\\d\\d");
//! ```
//!
//! The free functions at the crate root operate on a process-wide
//! default cache, mirroring the cache methods one-to-one.

pub mod cache;

use std::sync::{Arc, OnceLock};

pub use cache::PatternCache;
pub use regforge_config::EngineConfig;
pub use regforge_core::{Error, Result};
pub use regforge_jit::{CompiledPattern, MatchSpan};

static GLOBAL: OnceLock<PatternCache> = OnceLock::new();

fn global() -> &'static PatternCache {
    GLOBAL.get_or_init(PatternCache::new)
}

/// Pins `pattern` in the process-wide cache, compiling on a miss.
pub fn acquire(pattern: impl AsRef<[u8]>) -> Result<Arc<CompiledPattern>> {
    global().acquire(pattern.as_ref())
}

/// Unpins one acquisition of `pattern` in the process-wide cache.
pub fn release(pattern: impl AsRef<[u8]>) {
    global().release(pattern.as_ref());
}

/// Matches `pattern` against `input` through the process-wide cache.
pub fn find(pattern: impl AsRef<[u8]>, input: impl AsRef<[u8]>) -> Result<Option<MatchSpan>> {
    global().find(pattern.as_ref(), input.as_ref())
}

/// Scans `input` for `pattern` through the process-wide cache.
pub fn search(pattern: impl AsRef<[u8]>, input: impl AsRef<[u8]>) -> Result<Option<MatchSpan>> {
    global().search(pattern.as_ref(), input.as_ref())
}

/// Updates the process-wide cache capacity.
pub fn set_cache_max_size(max_size: usize) {
    global().set_max_size(max_size);
}

/// Number of patterns in the process-wide cache.
pub fn cache_size() -> usize {
    global().size()
}
