//! Nearest-neighbour indexes over descriptors.
//!
//! Two variants share the [`Index`] interface:
//! - [`DynamicIndex`]: starts empty (or from a dynamic file) and grows by
//!   appends.
//! - [`DenseIndex`]: loaded from a dense file, immutable, scanned in
//!   parallel.
//!
//! Search results are ordered by ascending distance, ties broken by
//! ascending position.

pub(crate) mod arena;
mod dense;
mod dynamic;
pub(crate) mod search;

pub use dense::DenseIndex;
pub use dynamic::DynamicIndex;

use crate::descriptor::{Descriptor, DescriptorBatch, DescriptorSpec};
use crate::error::{Error, Result};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// On-disk layout / in-memory variant of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Dynamic,
    Dense,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexType::Dynamic => "dynamic",
            IndexType::Dense => "dense",
        })
    }
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dynamic" => Ok(IndexType::Dynamic),
            "dense" => Ok(IndexType::Dense),
            other => Err(Error::InvalidArgument(format!(
                "{other} is not a valid index type, must be one of ['dynamic', 'dense']"
            ))),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexResult {
    /// 0-based position of the stored descriptor.
    pub position: usize,
    /// Distance to the query; smaller is closer.
    pub distance: f32,
}

/// Capabilities shared by every index variant.
pub trait Index: Send + Sync {
    fn spec(&self) -> &DescriptorSpec;

    fn kind(&self) -> IndexType;

    /// Number of stored descriptors.
    fn count(&self) -> usize;

    fn descriptor_version(&self) -> u32 {
        self.spec().version()
    }

    /// Up to `max_count` nearest neighbours of `descriptor`.
    fn search(&self, descriptor: &Descriptor, max_count: usize) -> Result<Vec<IndexResult>>;

    /// Copy of the descriptor stored at `position`.
    fn descriptor(&self, position: usize) -> Result<Descriptor>;

    fn append(&self, descriptor: &Descriptor) -> Result<()>;

    fn append_batch(&self, batch: &DescriptorBatch) -> Result<()>;

    /// Serialize every stored descriptor to `path` in the `kind` layout.
    fn save(&self, path: &Path, kind: IndexType) -> Result<()>;
}

/// Validation every search performs before touching storage.
pub(crate) fn check_search(
    spec: &DescriptorSpec,
    count: usize,
    descriptor: &Descriptor,
    max_count: usize,
) -> Result<()> {
    if max_count < 1 {
        return Err(Error::InvalidArgument(format!(
            "max_count must be at least 1, got {max_count}"
        )));
    }
    spec.check(descriptor, None)?;
    if count == 0 {
        return Err(Error::EmptyIndex);
    }
    Ok(())
}

pub(crate) fn check_position(position: usize, count: usize) -> Result<()> {
    if position >= count {
        return Err(Error::InvalidArgument(format!(
            "position {position} is out of range for an index of {count} descriptors"
        )));
    }
    Ok(())
}

/// An index loaded from a file of either layout.
#[derive(Debug)]
pub enum LoadedIndex {
    Dynamic(DynamicIndex),
    Dense(DenseIndex),
}

impl LoadedIndex {
    fn inner(&self) -> &dyn Index {
        match self {
            LoadedIndex::Dynamic(index) => index,
            LoadedIndex::Dense(index) => index,
        }
    }

    pub fn into_dynamic(self) -> Option<DynamicIndex> {
        match self {
            LoadedIndex::Dynamic(index) => Some(index),
            LoadedIndex::Dense(_) => None,
        }
    }

    pub fn into_dense(self) -> Option<DenseIndex> {
        match self {
            LoadedIndex::Dense(index) => Some(index),
            LoadedIndex::Dynamic(_) => None,
        }
    }
}

impl Index for LoadedIndex {
    fn spec(&self) -> &DescriptorSpec {
        self.inner().spec()
    }

    fn kind(&self) -> IndexType {
        self.inner().kind()
    }

    fn count(&self) -> usize {
        self.inner().count()
    }

    fn search(&self, descriptor: &Descriptor, max_count: usize) -> Result<Vec<IndexResult>> {
        self.inner().search(descriptor, max_count)
    }

    fn descriptor(&self, position: usize) -> Result<Descriptor> {
        self.inner().descriptor(position)
    }

    fn append(&self, descriptor: &Descriptor) -> Result<()> {
        self.inner().append(descriptor)
    }

    fn append_batch(&self, batch: &DescriptorBatch) -> Result<()> {
        self.inner().append_batch(batch)
    }

    fn save(&self, path: &Path, kind: IndexType) -> Result<()> {
        self.inner().save(path, kind)
    }
}

/// Load an index file, detecting its layout from the header.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedIndex> {
    let stored = storage::read_index(path.as_ref())?;
    let spec = stored.spec;
    Ok(match stored.info.kind {
        IndexType::Dynamic => LoadedIndex::Dynamic(DynamicIndex::from_arena(spec, stored.arena)),
        IndexType::Dense => LoadedIndex::Dense(DenseIndex::from_arena(spec, stored.arena)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;

    #[test]
    fn test_index_type_parse_and_display() {
        assert_eq!("dynamic".parse::<IndexType>().unwrap(), IndexType::Dynamic);
        assert_eq!("dense".parse::<IndexType>().unwrap(), IndexType::Dense);
        assert_eq!(IndexType::Dense.to_string(), "dense");
        let err = "sparse".parse::<IndexType>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_check_search_order_of_failures() {
        let spec = DescriptorSpec::new(3, 2, Metric::L2).unwrap();
        let other = DescriptorSpec::new(4, 2, Metric::L2).unwrap();
        let d = Descriptor::new(&spec, vec![0.0, 1.0]).unwrap();
        let foreign = Descriptor::new(&other, vec![0.0, 1.0]).unwrap();

        assert!(matches!(check_search(&spec, 5, &d, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(check_search(&spec, 5, &foreign, 1), Err(Error::VersionMismatch { .. })));
        assert!(matches!(check_search(&spec, 0, &d, 1), Err(Error::EmptyIndex)));
        assert!(check_search(&spec, 1, &d, 1).is_ok());
    }
}
