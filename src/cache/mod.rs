//! Caching infrastructure.
//!
//! - **LRU cache**: generic sharded LRU cache with reference-counted
//!   handles and per-entry charges
//! - **Table cache**: memoizes open table readers per file number

mod index;
mod lru;
mod table_cache;

pub use lru::{Deleter, Handle, LruCache};
pub use table_cache::TableCache;
