//! Default pool: one fixed arena per size class with a free list.
//!
//! ## Limitations
//!
//! - **Fixed capacity**: arenas never grow. Exhaustion is reported to the
//!   caller, which skips the update.
//! - **Coarse locking**: one `Mutex` per arena. Dereference closures run
//!   under that lock and must not call back into the pool.

use parking_lot::Mutex;
use tracing::error;

use super::{BlockHandle, ElementPool, SizeClass};

struct Arena {
    block_size: usize,
    data: Vec<u8>,
    refcounts: Vec<u32>,
    /// Free block indices; popped from the back.
    free: Vec<u32>,
}

impl Arena {
    fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: vec![0; block_size * blocks],
            refcounts: vec![0; blocks],
            free: (0..blocks as u32).rev().collect(),
        }
    }

    fn is_live(&self, handle: BlockHandle) -> bool {
        self.refcounts.get(handle.0 as usize).is_some_and(|rc| *rc > 0)
    }

    fn block_mut(&mut self, handle: BlockHandle) -> &mut [u8] {
        let start = handle.0 as usize * self.block_size;
        &mut self.data[start..start + self.block_size]
    }
}

/// Arena-per-size-class pool.
pub struct SlabPool {
    arenas: [Mutex<Arena>; 3],
}

impl SlabPool {
    /// Pool with `blocks[i]` blocks in size class `SizeClass::ALL[i]`.
    pub fn new(blocks: [usize; 3]) -> Self {
        Self {
            arenas: SizeClass::ALL.map(|class| Mutex::new(Arena::new(class.bytes(), blocks[class.index()]))),
        }
    }

    /// Blocks currently holding at least one reference.
    pub fn in_use(&self, class: SizeClass) -> usize {
        let arena = self.arenas[class.index()].lock();
        arena.refcounts.len() - arena.free.len()
    }

    /// Total blocks in a size class.
    pub fn capacity(&self, class: SizeClass) -> usize {
        self.arenas[class.index()].lock().refcounts.len()
    }
}

impl ElementPool for SlabPool {
    fn allocate(&self, class: SizeClass) -> Option<BlockHandle> {
        let mut arena = self.arenas[class.index()].lock();
        let index = arena.free.pop()?;
        let handle = BlockHandle(index);
        arena.refcounts[index as usize] = 1;
        arena.block_mut(handle).fill(0);
        Some(handle)
    }

    fn increment(&self, class: SizeClass, handle: BlockHandle) {
        let mut arena = self.arenas[class.index()].lock();
        if !arena.is_live(handle) {
            error!(?class, handle = handle.0, "increment of a free or unknown block");
            return;
        }
        arena.refcounts[handle.0 as usize] += 1;
    }

    fn decrement(&self, class: SizeClass, handle: BlockHandle) -> bool {
        let mut arena = self.arenas[class.index()].lock();
        if !arena.is_live(handle) {
            error!(?class, handle = handle.0, "decrement of a free or unknown block");
            return false;
        }
        let rc = &mut arena.refcounts[handle.0 as usize];
        *rc -= 1;
        if *rc == 0 {
            arena.free.push(handle.0);
            true
        } else {
            false
        }
    }

    fn dereference(&self, class: SizeClass, handle: BlockHandle, f: &mut dyn FnMut(&mut [u8])) -> bool {
        let mut arena = self.arenas[class.index()].lock();
        if !arena.is_live(handle) {
            return false;
        }
        f(arena.block_mut(handle));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_exhausted() {
        let pool = SlabPool::new([2, 1, 1]);
        let a = pool.allocate(SizeClass::Word).unwrap();
        let b = pool.allocate(SizeClass::Word).unwrap();
        assert_ne!(a, b);
        assert!(pool.allocate(SizeClass::Word).is_none());
        assert!(pool.decrement(SizeClass::Word, a));
        assert_eq!(pool.allocate(SizeClass::Word), Some(a));
    }

    #[test]
    fn test_refcount_keeps_block_alive() {
        let pool = SlabPool::new([1, 1, 1]);
        let h = pool.allocate(SizeClass::Block).unwrap();
        pool.increment(SizeClass::Block, h);
        assert!(!pool.decrement(SizeClass::Block, h));
        assert_eq!(pool.in_use(SizeClass::Block), 1);
        assert!(pool.decrement(SizeClass::Block, h));
        assert_eq!(pool.in_use(SizeClass::Block), 0);
    }

    #[test]
    fn test_dereference_free_block_fails() {
        let pool = SlabPool::new([1, 1, 1]);
        let h = pool.allocate(SizeClass::Pair).unwrap();
        assert!(pool.decrement(SizeClass::Pair, h));
        let mut called = false;
        assert!(!pool.dereference(SizeClass::Pair, h, &mut |_: &mut [u8]| called = true));
        assert!(!called);
        assert!(!pool.decrement(SizeClass::Pair, h));
    }

    #[test]
    fn test_block_sizes() {
        let pool = SlabPool::new([1, 1, 1]);
        for class in SizeClass::ALL {
            let h = pool.allocate(class).unwrap();
            let mut len = 0;
            pool.dereference(class, h, &mut |b: &mut [u8]| len = b.len());
            assert_eq!(len, class.bytes());
        }
    }

    #[test]
    fn test_reallocated_block_is_zeroed() {
        let pool = SlabPool::new([1, 1, 1]);
        let h = pool.allocate(SizeClass::Word).unwrap();
        pool.dereference(SizeClass::Word, h, &mut |b: &mut [u8]| b.fill(0xff));
        pool.decrement(SizeClass::Word, h);
        let h = pool.allocate(SizeClass::Word).unwrap();
        let mut bytes = Vec::new();
        pool.dereference(SizeClass::Word, h, &mut |b: &mut [u8]| bytes = b.to_vec());
        assert_eq!(bytes, vec![0; 4]);
    }
}
