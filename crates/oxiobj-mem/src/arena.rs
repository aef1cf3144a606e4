//! Bump arena for process-lifetime runtime metadata.
//!
//! The arena is a list of chunks obtained from the system allocator. Each
//! chunk has an atomic bump pointer, so allocation is a CAS on the current
//! chunk; only growing the arena takes a lock.
//!
//! Values placed in the arena are never dropped. Everything the runtime puts
//! here (class descriptors, method records, selector records, names) is
//! meant to outlive every object that refers to it, which is what makes the
//! `'static` references handed out by [`metadata_arena`] sound.
//!
//! # Example
//!
//! ```
//! use oxiobj_mem::metadata_arena;
//!
//! let name: &'static str = metadata_arena().alloc_str("NSObject");
//! let size: &'static usize = metadata_arena().alloc(16usize);
//!
//! assert_eq!(name, "NSObject");
//! assert_eq!(*size, 16);
//! ```

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Alignment of every chunk and the minimum alignment of every allocation.
const CHUNK_ALIGN: usize = 16;

/// Smallest chunk the arena will request.
const MIN_CHUNK_SIZE: usize = 4096;

/// Largest chunk requested when growing (oversized values get their own).
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// The system allocator could not provide a new chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaAllocError {
    /// Size of the chunk that could not be allocated.
    pub requested: usize,
}

impl std::fmt::Display for ArenaAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "metadata arena exhausted: chunk of {} bytes", self.requested)
    }
}

impl std::error::Error for ArenaAllocError {}

/// Usage counters for an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out, excluding alignment padding.
    pub allocated: usize,
    /// Number of chunks obtained from the system allocator.
    pub chunks: usize,
    /// Sum of all chunk sizes.
    pub capacity: usize,
}

struct Chunk {
    start: NonNull<u8>,
    cursor: AtomicPtr<u8>,
    size: usize,
}

impl Chunk {
    fn new(size: usize) -> Result<Box<Chunk>, ArenaAllocError> {
        let layout = Layout::from_size_align(size, CHUNK_ALIGN)
            .map_err(|_| ArenaAllocError { requested: size })?;

        // SAFETY: layout has non-zero size (size >= MIN_CHUNK_SIZE).
        let start = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(start).ok_or(ArenaAllocError { requested: size })?;

        Ok(Box::new(Chunk {
            start,
            cursor: AtomicPtr::new(start.as_ptr()),
            size,
        }))
    }

    fn end_addr(&self) -> usize {
        self.start.as_ptr().addr() + self.size
    }

    /// Bumps the cursor by `size` bytes aligned to `align`, or returns `None`
    /// when the chunk cannot fit the request.
    fn bump(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let mut current = self.cursor.load(Ordering::Acquire);
        loop {
            let aligned = current.addr().checked_add(align - 1)? & !(align - 1);
            let next = aligned.checked_add(size)?;
            if next > self.end_addr() {
                return None;
            }

            match self.cursor.compare_exchange_weak(
                current,
                current.with_addr(next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // The cursor keeps the provenance of `start`, so `with_addr`
                // yields a pointer into this chunk.
                Ok(_) => return NonNull::new(current.with_addr(aligned)),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: start was allocated in Chunk::new with exactly this layout.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.size, CHUNK_ALIGN);
            alloc::dealloc(self.start.as_ptr(), layout);
        }
    }
}

/// Thread-safe bump arena whose allocations live as long as the arena.
pub struct MetadataArena {
    chunks: Mutex<Vec<Box<Chunk>>>,
    current: AtomicPtr<Chunk>,
    chunk_size: usize,
    allocated: AtomicUsize,
}

// SAFETY: chunks are only appended under the mutex and never removed before
// the arena drops; `current` always points into a boxed chunk owned by
// `chunks`; allocation itself is a CAS on the chunk cursor.
unsafe impl Send for MetadataArena {}
unsafe impl Sync for MetadataArena {}

impl MetadataArena {
    /// Creates an empty arena that grows in chunks of roughly `chunk_size`
    /// bytes (clamped to 4 KiB..=1 MiB and rounded to a power of two).
    ///
    /// No memory is requested until the first allocation.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        MetadataArena {
            chunks: Mutex::new(Vec::new()),
            current: AtomicPtr::new(std::ptr::null_mut()),
            chunk_size: chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE).next_power_of_two(),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Moves `value` into the arena.
    ///
    /// The value is never dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaAllocError`] if a new chunk was needed and the system
    /// allocator refused it.
    pub fn try_alloc<T>(&self, value: T) -> Result<&T, ArenaAllocError> {
        let layout = Layout::new::<T>();
        let ptr = self.alloc_layout(layout)?.cast::<T>();

        // SAFETY: ptr is fresh, suitably aligned for T and valid for
        // size_of::<T>() bytes; nothing else refers to it yet.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&*ptr.as_ptr())
        }
    }

    /// Moves `value` into the arena.
    ///
    /// # Panics
    ///
    /// Aborts through [`std::alloc::handle_alloc_error`] if the system
    /// allocator is exhausted.
    pub fn alloc<T>(&self, value: T) -> &T {
        match self.try_alloc(value) {
            Ok(value) => value,
            Err(err) => alloc::handle_alloc_error(
                Layout::from_size_align(err.requested, CHUNK_ALIGN).unwrap_or(Layout::new::<T>()),
            ),
        }
    }

    /// Copies `s` into the arena.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaAllocError`] if the arena could not grow.
    pub fn try_alloc_str(&self, s: &str) -> Result<&str, ArenaAllocError> {
        if s.is_empty() {
            return Ok("");
        }

        let layout = Layout::for_value(s.as_bytes());
        let ptr = self.alloc_layout(layout)?;

        // SAFETY: ptr is valid for s.len() bytes and does not overlap `s`;
        // the bytes copied are valid UTF-8 because they come from a &str.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            let bytes = std::slice::from_raw_parts(ptr.as_ptr(), s.len());
            Ok(std::str::from_utf8_unchecked(bytes))
        }
    }

    /// Copies `s` into the arena, aborting on allocation failure.
    pub fn alloc_str(&self, s: &str) -> &str {
        match self.try_alloc_str(s) {
            Ok(s) => s,
            Err(err) => alloc::handle_alloc_error(
                Layout::from_size_align(err.requested, CHUNK_ALIGN).unwrap_or(Layout::new::<u8>()),
            ),
        }
    }

    /// Returns usage counters.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.lock_chunks();
        ArenaStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            chunks: chunks.len(),
            capacity: chunks.iter().map(|chunk| chunk.size).sum(),
        }
    }

    fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, ArenaAllocError> {
        let align = layout.align().max(1);
        let size = layout.size().max(1);

        loop {
            let current = self.current.load(Ordering::Acquire);
            if !current.is_null() {
                // SAFETY: current points into a boxed chunk owned by self.chunks.
                let chunk = unsafe { &*current };
                if let Some(ptr) = chunk.bump(size, align) {
                    self.allocated.fetch_add(layout.size(), Ordering::Relaxed);
                    return Ok(ptr);
                }
            }

            self.grow(current, size + align)?;
        }
    }

    #[cold]
    fn grow(&self, observed: *mut Chunk, min_size: usize) -> Result<(), ArenaAllocError> {
        let mut chunks = self.lock_chunks();

        // Another thread already installed a fresh chunk.
        if self.current.load(Ordering::Acquire) != observed {
            return Ok(());
        }

        let grown = chunks.last().map_or(self.chunk_size, |chunk| {
            (chunk.size * 2).min(MAX_CHUNK_SIZE)
        });
        let size = grown.max(min_size.next_power_of_two());

        let mut chunk = Chunk::new(size)?;
        let ptr: *mut Chunk = &mut *chunk;
        chunks.push(chunk);
        self.current.store(ptr, Ordering::Release);
        Ok(())
    }

    fn lock_chunks(&self) -> std::sync::MutexGuard<'_, Vec<Box<Chunk>>> {
        self.chunks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MetadataArena {
    fn default() -> Self {
        MetadataArena::new(64 * 1024)
    }
}

/// Returns the process-wide metadata arena (64 KiB chunks).
#[must_use]
pub fn metadata_arena() -> &'static MetadataArena {
    static ARENA: OnceLock<MetadataArena> = OnceLock::new();
    ARENA.get_or_init(MetadataArena::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_alloc_values_keep_their_contents() {
        let arena = MetadataArena::new(4096);

        let a = arena.alloc(7u8);
        let b = arena.alloc(0xdead_beef_u64);
        let c = arena.alloc([1u16, 2, 3]);

        assert_eq!(*a, 7);
        assert_eq!(*b, 0xdead_beef);
        assert_eq!(*c, [1, 2, 3]);
        assert_eq!(std::ptr::from_ref(b).addr() % std::mem::align_of::<u64>(), 0);
    }

    #[test]
    fn test_alloc_str() {
        let arena = MetadataArena::new(4096);

        assert_eq!(arena.alloc_str("initWithCapacity:"), "initWithCapacity:");
        assert_eq!(arena.alloc_str(""), "");
        assert_eq!(arena.alloc_str("Größe"), "Größe");
    }

    #[test]
    fn test_arena_grows_past_first_chunk() {
        let arena = MetadataArena::new(4096);

        let values: Vec<&[u64; 64]> = (0..64).map(|i| arena.alloc([i as u64; 64])).collect();
        for (i, value) in values.iter().enumerate() {
            assert!(value.iter().all(|&v| v == i as u64));
        }

        let stats = arena.stats();
        assert!(stats.chunks > 1);
        assert!(stats.capacity >= stats.allocated);
        assert_eq!(stats.allocated, 64 * 64 * 8);
    }

    #[test]
    fn test_oversized_value_gets_its_own_chunk() {
        let arena = MetadataArena::new(4096);

        let big = arena.alloc([0xabu8; 64 * 1024]);
        assert!(big.iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_concurrent_allocation() {
        let arena = Arc::new(MetadataArena::new(4096));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let arena = Arc::clone(&arena);
                thread::spawn(move || {
                    let mut addrs = Vec::new();
                    for i in 0..500usize {
                        let value = arena.alloc(t * 1000 + i);
                        assert_eq!(*value, t * 1000 + i);
                        addrs.push(std::ptr::from_ref(value).addr());
                    }
                    addrs
                })
            })
            .collect();

        let mut all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "two allocations shared an address");
    }

    #[test]
    fn test_metadata_arena_singleton() {
        assert!(std::ptr::eq(metadata_arena(), metadata_arena()));
    }
}
