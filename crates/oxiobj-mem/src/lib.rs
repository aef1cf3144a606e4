//! Memory infrastructure for the `oxiobj` runtime.
//!
//! Runtime metadata (class descriptors, method records, interned selector
//! and class names) is created once and referenced from everywhere for the
//! rest of the process. It lives in a [`MetadataArena`]: a thread-safe bump
//! allocator that hands out shared references and never frees individual
//! allocations.

pub mod arena;

pub use arena::{ArenaAllocError, ArenaStats, MetadataArena, metadata_arena};
