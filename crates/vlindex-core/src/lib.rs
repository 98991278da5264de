//! vlindex-core — Biometric descriptor matching and nearest-neighbour indexes.
//!
//! Descriptors are fixed-length embeddings produced by an external
//! extractor. They can be matched pairwise ([`DescriptorMatcher`]) or
//! collected into a [`DynamicIndex`] that is searched, extended and saved
//! either as a reloadable dynamic file or as a compact [`DenseIndex`].

pub mod descriptor;
pub mod error;
pub mod index;
pub mod matcher;
pub mod metric;
pub mod storage;

pub use descriptor::{Descriptor, DescriptorBatch, DescriptorSpec};
pub use error::{Error, ErrorInfo, Result};
pub use index::{load, DenseIndex, DynamicIndex, Index, IndexResult, IndexType, LoadedIndex};
pub use matcher::{DescriptorMatcher, MatchingResult};
pub use metric::Metric;
pub use storage::{read_info, IndexInfo};
