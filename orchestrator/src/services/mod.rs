//! Service implementations
//!
//! Real implementations of the storage traits plus the runner for the
//! external motif search tool. These handle the actual I/O.

pub mod checkpoint_store;
pub mod memory;
pub mod motif_runner;
pub mod result_store;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use checkpoint_store::FileCheckpointStore;
pub use memory::InMemoryStore;
pub use motif_runner::ExternalMotifSearcher;
pub use result_store::FileResultStore;
