//! Document processing pipeline: chunking, corpus building, and index orchestration.

pub mod chunking;
pub mod corpus;
mod manager;
pub mod query;
pub mod types;

pub use manager::{DEFAULT_UPLOAD_BATCH_SIZE, ManagerSettings, SearchIndexManager};
pub use types::{Chunk, CorpusError, CorpusRow, EmbeddingRecord, IndexManagerError};
