//! Reusable instance allocator
//!
//! Entities are spawned and destroyed many times per second. The pool keeps a
//! free list of previously released instances so the hot path reuses them
//! instead of allocating. Single owner, no interior locking.

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances waiting on the free list
    pub free: usize,
    /// Instances handed out and not yet released
    pub active: usize,
    /// Free list capacity; releases beyond this are dropped
    pub max_size: usize,
}

/// Free-list allocator with a caller-supplied factory and reset
pub struct ObjectPool<T> {
    free: Vec<T>,
    factory: Box<dyn FnMut() -> T>,
    reset: Box<dyn FnMut(&mut T)>,
    max_size: usize,
    active: usize,
}

impl<T> ObjectPool<T> {
    /// Create a pool pre-filled with `initial_size` instances
    pub fn new<F, R>(mut factory: F, reset: R, initial_size: usize, max_size: usize) -> Self
    where
        F: FnMut() -> T + 'static,
        R: FnMut(&mut T) + 'static,
    {
        let prefill = initial_size.min(max_size);
        let mut free = Vec::with_capacity(prefill);
        for _ in 0..prefill {
            free.push(factory());
        }
        Self {
            free,
            factory: Box::new(factory),
            reset: Box::new(reset),
            max_size,
            active: 0,
        }
    }

    /// Take an instance from the free list (reset to baseline) or build a new one
    pub fn acquire(&mut self) -> T {
        self.active += 1;
        match self.free.pop() {
            Some(mut obj) => {
                (self.reset)(&mut obj);
                obj
            }
            None => (self.factory)(),
        }
    }

    /// Hand an instance back. Dropped when the free list is full.
    pub fn release(&mut self, mut obj: T) {
        self.active = self.active.saturating_sub(1);
        if self.free.len() < self.max_size {
            (self.reset)(&mut obj);
            self.free.push(obj);
        }
    }

    /// Drop every free instance and zero the active counter
    pub fn clear(&mut self) {
        self.free.clear();
        self.active = 0;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            free: self.free.len(),
            active: self.active,
            max_size: self.max_size,
        }
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool").field("stats", &self.stats()).finish()
    }
}
