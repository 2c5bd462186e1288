//! Handle identity and the runtime-wide handle table
//!
//! A handle names one engine value pinned in a context's arena. The table
//! records what kind of value each live handle names and tells released
//! handles from unknown ones. It answers identity and liveness questions
//! only: the engine memory itself is pinned by the arena, not by an entry in
//! this table.

use crate::value::ValueType;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(u64);

impl RuntimeId {
    /// Create a new unique runtime ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RuntimeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt#{}", self.0)
    }
}

/// Unique identifier for a Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Identity of a pinned engine value: owning context plus arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    /// Context whose arena holds the value
    pub context: ContextId,
    /// Arena slot (never reused within a context)
    pub slot: u64,
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.slot)
    }
}

/// Liveness of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Pinned and usable
    Live,
    /// Explicitly released (or released at the end of its call scope)
    Released,
}

/// Handle table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRecord {
    /// Variant of the pinned value (object, array or function)
    pub kind: ValueType,
}

/// Runtime-wide table of live handles
///
/// Released handles are removed. Slots are issued in increasing order and
/// never reused, so a key at or below the highest slot issued to its context
/// that has no entry is known to be released.
///
/// Reads are lock-free with respect to each other; writes are serialized per
/// shard and, in practice, always happen under the runtime execution lock.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: DashMap<HandleKey, HandleRecord>,
    issued: DashMap<ContextId, u64>,
}

impl HandleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            issued: DashMap::new(),
        }
    }

    /// Record a live handle. Re-registering a live handle is a no-op.
    pub fn register(&self, key: HandleKey, kind: ValueType) {
        self.entries.entry(key).or_insert(HandleRecord { kind });
        self.issued
            .entry(key.context)
            .and_modify(|high| *high = (*high).max(key.slot))
            .or_insert(key.slot);
    }

    /// Get the record of a live handle
    pub fn get(&self, key: HandleKey) -> Option<HandleRecord> {
        self.entries.get(&key).map(|entry| *entry.value())
    }

    /// Get the state of a handle; `None` if its context never issued it
    pub fn state(&self, key: HandleKey) -> Option<HandleState> {
        if self.entries.contains_key(&key) {
            return Some(HandleState::Live);
        }
        let issued = self.issued.get(&key.context).map_or(0, |high| *high);
        (key.slot <= issued).then_some(HandleState::Released)
    }

    /// Remove a live handle.
    ///
    /// Returns `true` if the handle was live.
    pub fn mark_released(&self, key: HandleKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Forget every handle of a context.
    ///
    /// Returns the number of live records removed.
    pub fn purge_context(&self, context: ContextId) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = key.context != context;
            removed += usize::from(!keep);
            keep
        });
        self.issued.remove(&context);
        removed
    }

    /// Count live handles, optionally restricted to one context
    pub fn live_count(&self, context: Option<ContextId>) -> usize {
        match context {
            None => self.entries.len(),
            Some(id) => self
                .entries
                .iter()
                .filter(|entry| entry.key().context == id)
                .count(),
        }
    }
}
