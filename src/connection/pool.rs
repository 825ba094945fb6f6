//! Buffer Pool
//!
//! Fixed-size read buffers are recycled across connections instead of being
//! allocated per connection. A handler checks out one [`PooledBuffer`] for
//! its entire lifetime; the buffer goes back to the pool when the guard is
//! dropped, whichever way the handler exits.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default size of each pooled buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Default number of idle buffers kept around.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// A snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated because the pool was empty
    pub allocated: u64,
    /// Total `get` calls
    pub checked_out: u64,
    /// Buffers handed back (kept or discarded)
    pub returned: u64,
    /// Buffers currently idle in the pool
    pub idle: usize,
}

impl PoolStats {
    /// Buffers currently owned by a handler.
    pub fn outstanding(&self) -> u64 {
        self.checked_out.saturating_sub(self.returned)
    }
}

/// A pool of reusable, fixed-size byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
    allocated: AtomicU64,
    checked_out: AtomicU64,
    returned: AtomicU64,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
            allocated: AtomicU64::new(0),
            checked_out: AtomicU64::new(0),
            returned: AtomicU64::new(0),
        })
    }

    /// Checks out a buffer, allocating one if none are idle.
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        self.checked_out.fetch_add(1, Ordering::Relaxed);

        let recycled = self.lock_idle().pop();
        let buf = match recycled {
            Some(buf) => buf,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0u8; self.buffer_size]
            }
        };

        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    /// Size of every buffer handed out.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            checked_out: self.checked_out.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            idle: self.lock_idle().len(),
        }
    }

    fn put(&self, mut buf: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);

        // A handler may have shrunk or grown it; restore the fixed size.
        buf.resize(self.buffer_size, 0);

        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A buffer checked out of a [`BufferPool`]. Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_allocates_fixed_size() {
        let pool = BufferPool::new(DEFAULT_BUFFER_SIZE, 4);
        let buf = pool.get();
        assert_eq!(buf.len(), 2048);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_buffer_is_reused() {
        let pool = BufferPool::new(64, 4);

        drop(pool.get());
        drop(pool.get());
        drop(pool.get());

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.checked_out, 3);
        assert_eq!(stats.returned, 3);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn test_each_get_matched_by_exactly_one_put() {
        let pool = BufferPool::new(16, 8);

        let held: Vec<_> = (0..5).map(|_| pool.get()).collect();
        assert_eq!(pool.stats().outstanding(), 5);
        assert_eq!(pool.stats().returned, 0);

        drop(held);
        let stats = pool.stats();
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.returned, stats.checked_out);
        assert_eq!(stats.idle, 5);
    }

    #[test]
    fn test_max_idle_is_respected() {
        let pool = BufferPool::new(16, 2);

        let held: Vec<_> = (0..4).map(|_| pool.get()).collect();
        drop(held);

        let stats = pool.stats();
        assert_eq!(stats.returned, 4);
        assert_eq!(stats.idle, 2);
    }

    #[test]
    fn test_buffer_returned_on_panic() {
        let pool = BufferPool::new(16, 2);

        let pool_clone = Arc::clone(&pool);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut buf = pool_clone.get();
            buf[0] = 1;
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_buffers_are_not_shared() {
        let pool = BufferPool::new(8, 4);

        let mut a = pool.get();
        let mut b = pool.get();
        a[0] = 0xAA;
        b[0] = 0xBB;

        assert_eq!(a[0], 0xAA);
        assert_eq!(b[0], 0xBB);
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn test_concurrent_get_put() {
        let pool = BufferPool::new(32, 16);
        let mut handles = Vec::new();

        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let mut buf = pool.get();
                    buf[0] = buf[0].wrapping_add(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.checked_out, 800);
        assert_eq!(stats.returned, 800);
        assert!(stats.allocated <= 8);
    }
}
