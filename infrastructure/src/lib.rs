// Module declarations
pub mod persistence;
pub mod search;

// Re-export all implementations
pub use persistence::InMemoryOperationRepository;
pub use search::InMemoryOperationIndex;
