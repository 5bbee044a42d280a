//! Reference-counted, LRU-evicting cache of compiled patterns.
//!
//! One mutex guards the entry map, the LRU order and the in-flight
//! compiles. The compile pipeline itself runs outside the lock; threads
//! asking for a pattern that is already being compiled block on the
//! producer's in-flight record instead of compiling again.
//!
//! An entry is evictable only while its ref-count is zero, so code
//! memory is never reclaimed under a running caller.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::ffi::CStr;
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

use regforge_config::{EngineConfig, OptLevelConfig, DEFAULT_CACHE_MAX_SIZE};
use regforge_core::{Error, Result};
use regforge_jit::{compile, CompileOptions, CompiledPattern, MatchSpan, OptLevel};

/// A compile in progress on behalf of one or more acquirers.
#[derive(Default)]
struct Inflight {
    done: Mutex<Option<Result<()>>>,
    cond: Condvar,
}

impl Inflight {
    fn wait(&self) -> Result<()> {
        let mut done = self.done.lock().unwrap();
        while done.is_none() {
            done = self.cond.wait(done).unwrap();
        }
        match done.as_ref().unwrap() {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::ConcurrentCompile(e.to_string())),
        }
    }

    fn fulfill(&self, result: Result<()>) {
        *self.done.lock().unwrap() = Some(result);
        self.cond.notify_all();
    }
}

struct CacheEntry {
    artifact: Arc<CompiledPattern>,
    ref_count: usize,
}

struct CacheState {
    entries: HashMap<Vec<u8>, CacheEntry>,
    /// Cache keys ordered most-recent-first.
    lru: VecDeque<Vec<u8>>,
    inflight: HashMap<Vec<u8>, Arc<Inflight>>,
    max_size: usize,
}

impl CacheState {
    fn promote(&mut self, pattern: &[u8]) {
        if let Some(pos) = self.lru.iter().position(|key| key == pattern) {
            let key = self.lru.remove(pos).unwrap();
            self.lru.push_front(key);
        }
    }

    /// Pops evictable entries off the LRU tail until the cache fits its
    /// capacity. A pinned tail entry ends the whole pass, so the cache
    /// can stay over capacity until that entry is released.
    fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.max_size {
            let tail_evictable = self.lru.back().is_some_and(|key| {
                self.entries
                    .get(key)
                    .is_some_and(|entry| entry.ref_count == 0)
            });
            if !tail_evictable {
                break;
            }
            let key = self.lru.pop_back().unwrap();
            let entry = self.entries.remove(&key).unwrap();
            debug!(
                pattern = %String::from_utf8_lossy(&key),
                function = entry.artifact.function_name(),
                "evicting compiled pattern"
            );
        }
    }
}

/// Pattern-keyed cache of compiled match functions.
pub struct PatternCache {
    state: Mutex<CacheState>,
    options: CompileOptions,
}

impl PatternCache {
    /// Creates a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_MAX_SIZE)
    }

    /// Creates a cache holding at most `max_size` unpinned entries.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                lru: VecDeque::new(),
                inflight: HashMap::new(),
                max_size,
            }),
            options: CompileOptions::default(),
        }
    }

    /// Creates a cache configured from an [`EngineConfig`].
    pub fn with_config(config: &EngineConfig) -> Self {
        let mut cache = Self::with_capacity(config.cache_max_size);
        cache.options = CompileOptions {
            opt_level: match config.opt_level {
                OptLevelConfig::None => OptLevel::None,
                OptLevelConfig::Speed => OptLevel::Speed,
            },
            dump_ir: config.dump_ir_on_error,
        };
        cache
    }

    /// Pins and returns the compiled form of `pattern`, compiling on a
    /// miss. Concurrent misses for the same pattern share one compile;
    /// the losers block until the producer finishes.
    ///
    /// Every successful `acquire` must be paired with a [`release`].
    ///
    /// [`release`]: PatternCache::release
    pub fn acquire(&self, pattern: &[u8]) -> Result<Arc<CompiledPattern>> {
        loop {
            let inflight = {
                let mut state = self.state.lock().unwrap();
                if let Some(entry) = state.entries.get_mut(pattern) {
                    entry.ref_count += 1;
                    let artifact = Arc::clone(&entry.artifact);
                    state.promote(pattern);
                    debug!(
                        pattern = %String::from_utf8_lossy(pattern),
                        refs = state.entries[pattern].ref_count,
                        "cache hit"
                    );
                    return Ok(artifact);
                }
                match state.inflight.get(pattern) {
                    Some(inflight) => Arc::clone(inflight),
                    None => {
                        let inflight = Arc::new(Inflight::default());
                        state
                            .inflight
                            .insert(pattern.to_vec(), Arc::clone(&inflight));
                        drop(state);
                        return self.compile_and_install(pattern, &inflight);
                    }
                }
            };
            // Another thread is compiling this pattern; wait for its
            // outcome, then retry from the top.
            inflight.wait()?;
        }
    }

    /// Unpins one acquisition of `pattern` and evicts if the cache is
    /// over capacity. Unknown patterns are ignored.
    pub fn release(&self, pattern: &[u8]) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.get_mut(pattern) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                state.evict_over_capacity();
            }
        }
    }

    /// One-shot convenience: acquire, run the compiled function against
    /// `input`, release. The input is copied into a null-terminated
    /// buffer only when it does not already end with a null byte.
    pub fn find(&self, pattern: &[u8], input: &[u8]) -> Result<Option<MatchSpan>> {
        let artifact = self.acquire(pattern)?;
        let result = invoke_on_bytes(&artifact, input);
        self.release(pattern);
        Ok(result)
    }

    /// Scans `input` for the pattern. The compiled function embeds its
    /// own search plan, so this is the same invocation as [`find`].
    ///
    /// [`find`]: PatternCache::find
    pub fn search(&self, pattern: &[u8], input: &[u8]) -> Result<Option<MatchSpan>> {
        self.find(pattern, input)
    }

    /// Updates the capacity and evicts down to it.
    pub fn set_max_size(&self, max_size: usize) {
        let mut state = self.state.lock().unwrap();
        state.max_size = max_size;
        state.evict_over_capacity();
    }

    /// Number of compiled patterns currently cached.
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    fn compile_and_install(
        &self,
        pattern: &[u8],
        inflight: &Arc<Inflight>,
    ) -> Result<Arc<CompiledPattern>> {
        debug!(pattern = %String::from_utf8_lossy(pattern), "compiling pattern");
        let result = compile(pattern, &self.options);
        let mut state = self.state.lock().unwrap();
        state.inflight.remove(pattern);
        match result {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                state.entries.insert(
                    pattern.to_vec(),
                    CacheEntry {
                        artifact: Arc::clone(&artifact),
                        ref_count: 1,
                    },
                );
                state.lru.push_front(pattern.to_vec());
                state.evict_over_capacity();
                drop(state);
                inflight.fulfill(Ok(()));
                Ok(artifact)
            }
            Err(e) => {
                drop(state);
                inflight.fulfill(Err(e.clone()));
                Err(e)
            }
        }
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke_on_bytes(artifact: &CompiledPattern, input: &[u8]) -> Option<MatchSpan> {
    if input.last() == Some(&0) {
        let input = CStr::from_bytes_until_nul(input).expect("buffer ends with null");
        return artifact.invoke(input);
    }
    let mut buf = input.to_vec();
    buf.push(0);
    let input = CStr::from_bytes_until_nul(&buf).expect("buffer ends with null");
    artifact.invoke(input)
}
