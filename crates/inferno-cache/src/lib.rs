//! Paged KV-cache manager (spec §4.1).
//!
//! Allocates and recycles fixed-size off-heap blocks of K/V memory so long
//! prompts do not fragment GPU/CPU memory, and prefill/decode can run on
//! the same pool. Modeled as an owning allocator with scoped lifetime per
//! the §9 design note ("native memory via platform arena" → owning
//! allocator, 64-byte-aligned slabs, zeroed on free) — the one module this
//! workspace has no direct teacher counterpart for, so the shape follows
//! the teacher's general allocator/registry idiom (one `parking_lot::Mutex`
//! guarding a small amount of plain state, documented in DESIGN.md) rather
//! than a specific file.

mod pool;

pub use pool::{BlockId, BlockPool, CacheError, SequenceId};
