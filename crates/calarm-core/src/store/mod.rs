// # Dedup Store Implementations
//
// Implementations of the DedupStore trait for different persistence
// strategies.

pub mod file;
pub mod memory;

pub use file::{FileDedupStore, FileDedupStoreFactory};
pub use memory::{MemoryDedupStore, MemoryDedupStoreFactory};
