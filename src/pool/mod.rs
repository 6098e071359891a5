//! # Element Pool
//!
//! Cached values live in fixed-size, reference-counted blocks drawn from
//! three size classes:
//!
//! | Class   | Bytes | Holds                         |
//! |---------|-------|-------------------------------|
//! | `Word`  | 4     | UInt32, Int32, CentiDecibel   |
//! | `Pair`  | 8     | MacAddr                       |
//! | `Block` | 256   | Profile, Password             |
//!
//! `ElementPool` is the seam: anything that can hand out, count and
//! dereference blocks can back a cache. `SlabPool` is the default.
//!
//! `Element` owns one reference. Cloning increments, dropping decrements,
//! so a slot can never hold a released handle: the cache assigns the new
//! element first and the old one is dropped by that assignment.

pub mod slab;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{Value, ValueType};
use crate::{Error, Result};

pub use slab::SlabPool;

// ============================================================================
// Size classes and handles
// ============================================================================

/// Pool size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    Word,
    Pair,
    Block,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Word, SizeClass::Pair, SizeClass::Block];

    pub const fn bytes(self) -> usize {
        match self {
            SizeClass::Word => 4,
            SizeClass::Pair => 8,
            SizeClass::Block => 256,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl ValueType {
    /// Size class that stores values of this type.
    pub fn size_class(self) -> SizeClass {
        match self {
            ValueType::UInt32 | ValueType::Int32 | ValueType::CentiDecibel => SizeClass::Word,
            ValueType::MacAddr => SizeClass::Pair,
            ValueType::Profile | ValueType::Password => SizeClass::Block,
        }
    }
}

/// Index of a block within one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(pub u32);

// ============================================================================
// ElementPool trait
// ============================================================================

/// Reference-counted block storage.
pub trait ElementPool: Send + Sync {
    /// Take a free block with a reference count of one.
    fn allocate(&self, class: SizeClass) -> Option<BlockHandle>;

    /// Add one reference to a live block.
    fn increment(&self, class: SizeClass, handle: BlockHandle);

    /// Drop one reference. Returns `true` if the block was freed.
    fn decrement(&self, class: SizeClass, handle: BlockHandle) -> bool;

    /// Run `f` over the block's bytes. Returns `false` if the handle does
    /// not name a live block, in which case `f` is not called.
    fn dereference(&self, class: SizeClass, handle: BlockHandle, f: &mut dyn FnMut(&mut [u8])) -> bool;
}

// ============================================================================
// Element: owning reference
// ============================================================================

/// One counted reference to a pooled, immutable value.
pub struct Element {
    pool: Arc<dyn ElementPool>,
    class: SizeClass,
    handle: BlockHandle,
    value_type: ValueType,
}

impl Element {
    /// Allocate a block and store `value` in it.
    ///
    /// On a write failure the fresh block is released before returning.
    pub fn allocate(pool: &Arc<dyn ElementPool>, value: &Value) -> Result<Element> {
        let value_type = value.value_type();
        let class = value_type.size_class();
        let handle = pool.allocate(class).ok_or(Error::PoolExhausted(class))?;
        let element = Element { pool: Arc::clone(pool), class, handle, value_type };

        let mut written = Err(Error::Internal("block write did not run".into()));
        let live = element.pool.dereference(class, handle, &mut |block: &mut [u8]| {
            written = value.write_block(block);
        });
        if !live {
            return Err(Error::Dereference { class, handle: handle.0 });
        }
        written?;
        Ok(element)
    }

    /// Decode the stored value.
    pub fn value(&self) -> Result<Value> {
        let mut read = Err(Error::Internal("block read did not run".into()));
        let live = self.pool.dereference(self.class, self.handle, &mut |block: &mut [u8]| {
            read = Value::read_block(self.value_type, block);
        });
        if !live {
            return Err(Error::Dereference { class: self.class, handle: self.handle.0 });
        }
        read
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn size_class(&self) -> SizeClass {
        self.class
    }

    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    /// Whether both references name the same pooled block.
    pub fn shares_block(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool) && self.class == other.class && self.handle == other.handle
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        self.pool.increment(self.class, self.handle);
        Element {
            pool: Arc::clone(&self.pool),
            class: self.class,
            handle: self.handle,
            value_type: self.value_type,
        }
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        self.pool.decrement(self.class, self.handle);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("class", &self.class)
            .field("handle", &self.handle.0)
            .field("value_type", &self.value_type)
            .finish()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Pool event delivered to a `StatsSink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    Allocated,
    AllocationFailed,
    Freed,
}

/// Receiver of per-size-class pool events.
pub trait StatsSink: Send + Sync {
    fn record(&self, class: SizeClass, event: PoolEvent);
}

/// Counters for one size class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounters {
    pub allocated: u64,
    pub failed: u64,
    pub freed: u64,
}

impl ClassCounters {
    pub fn in_use(&self) -> u64 {
        self.allocated.saturating_sub(self.freed)
    }
}

/// Lock-free `StatsSink` keeping running totals per size class.
#[derive(Debug, Default)]
pub struct PoolCounters {
    allocated: [AtomicU64; 3],
    failed: [AtomicU64; 3],
    freed: [AtomicU64; 3],
}

impl PoolCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, class: SizeClass) -> ClassCounters {
        let i = class.index();
        ClassCounters {
            allocated: self.allocated[i].load(Ordering::Relaxed),
            failed: self.failed[i].load(Ordering::Relaxed),
            freed: self.freed[i].load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for PoolCounters {
    fn record(&self, class: SizeClass, event: PoolEvent) {
        let i = class.index();
        let counter = match event {
            PoolEvent::Allocated => &self.allocated[i],
            PoolEvent::AllocationFailed => &self.failed[i],
            PoolEvent::Freed => &self.freed[i],
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wraps any pool and reports its allocations and frees to a sink.
pub struct InstrumentedPool {
    inner: Arc<dyn ElementPool>,
    sink: Arc<dyn StatsSink>,
}

impl InstrumentedPool {
    pub fn new(inner: Arc<dyn ElementPool>, sink: Arc<dyn StatsSink>) -> Self {
        Self { inner, sink }
    }
}

impl ElementPool for InstrumentedPool {
    fn allocate(&self, class: SizeClass) -> Option<BlockHandle> {
        let handle = self.inner.allocate(class);
        let event = if handle.is_some() { PoolEvent::Allocated } else { PoolEvent::AllocationFailed };
        self.sink.record(class, event);
        handle
    }

    fn increment(&self, class: SizeClass, handle: BlockHandle) {
        self.inner.increment(class, handle);
    }

    fn decrement(&self, class: SizeClass, handle: BlockHandle) -> bool {
        let freed = self.inner.decrement(class, handle);
        if freed {
            self.sink.record(class, PoolEvent::Freed);
        }
        freed
    }

    fn dereference(&self, class: SizeClass, handle: BlockHandle, f: &mut dyn FnMut(&mut [u8])) -> bool {
        self.inner.dereference(class, handle, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacAddr, Profile};

    fn pool(blocks: usize) -> (Arc<SlabPool>, Arc<dyn ElementPool>) {
        let slab = Arc::new(SlabPool::new([blocks; 3]));
        let dyn_pool: Arc<dyn ElementPool> = slab.clone();
        (slab, dyn_pool)
    }

    #[test]
    fn test_size_class_by_type() {
        assert_eq!(ValueType::CentiDecibel.size_class(), SizeClass::Word);
        assert_eq!(ValueType::MacAddr.size_class(), SizeClass::Pair);
        assert_eq!(ValueType::Password.size_class(), SizeClass::Block);
    }

    #[test]
    fn test_element_roundtrip_and_free() {
        let (slab, pool) = pool(4);
        let e = Element::allocate(&pool, &Value::MacAddr(MacAddr([1, 2, 3, 4, 5, 6]))).unwrap();
        assert_eq!(slab.in_use(SizeClass::Pair), 1);
        assert_eq!(e.value().unwrap(), Value::MacAddr(MacAddr([1, 2, 3, 4, 5, 6])));
        drop(e);
        assert_eq!(slab.in_use(SizeClass::Pair), 0);
    }

    #[test]
    fn test_clone_shares_block_until_last_drop() {
        let (slab, pool) = pool(4);
        let a = Element::allocate(&pool, &Value::Profile(Profile::uniform(7))).unwrap();
        let b = a.clone();
        assert!(a.shares_block(&b));
        drop(a);
        assert_eq!(slab.in_use(SizeClass::Block), 1);
        assert_eq!(b.value().unwrap(), Value::Profile(Profile::uniform(7)));
        drop(b);
        assert_eq!(slab.in_use(SizeClass::Block), 0);
    }

    #[test]
    fn test_exhaustion_reported() {
        let (_slab, pool) = pool(1);
        let _held = Element::allocate(&pool, &Value::UInt32(1)).unwrap();
        let err = Element::allocate(&pool, &Value::UInt32(2)).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted(SizeClass::Word)));
    }

    #[test]
    fn test_failed_write_releases_block() {
        let (slab, pool) = pool(2);
        let too_long = Value::Password("x".repeat(300));
        assert!(Element::allocate(&pool, &too_long).is_err());
        assert_eq!(slab.in_use(SizeClass::Block), 0);
    }

    #[test]
    fn test_instrumented_counts() {
        let (_slab, inner) = pool(1);
        let counters = Arc::new(PoolCounters::new());
        let pool: Arc<dyn ElementPool> = Arc::new(InstrumentedPool::new(inner, counters.clone()));
        let e = Element::allocate(&pool, &Value::UInt32(9)).unwrap();
        assert!(Element::allocate(&pool, &Value::UInt32(10)).is_err());
        drop(e);
        let c = counters.snapshot(SizeClass::Word);
        assert_eq!((c.allocated, c.failed, c.freed, c.in_use()), (1, 1, 1, 0));
    }
}
