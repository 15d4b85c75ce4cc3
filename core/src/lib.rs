pub mod accumulator;
pub mod cancel;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod merge;
pub mod persist;
pub mod phrase;
pub mod planner;
pub mod scoring;
pub mod spill;
pub mod tokenizer;

pub use accumulator::{Accumulator, Payload, Triple};
pub use cancel::CancelToken;
pub use config::{BuildConfig, IndexType, MemoryLimit, QueryConfig};
pub use error::{Error, Result};
pub use index::{DocId, InvertedIndex, Posting, TermEntry};
pub use scoring::RetrievalModel;
pub use tokenizer::{Normalizer, StopWords};
