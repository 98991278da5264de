use super::arena::Arena;
use super::search::{scan, TopK};
use super::{check_position, check_search, Index, IndexResult, IndexType};
use crate::descriptor::{Descriptor, DescriptorBatch, DescriptorSpec};
use crate::error::{Error, Result};
use crate::metric::l2_norm;
use crate::storage;
use rayon::prelude::*;
use std::path::Path;

/// Rows per parallel scan task.
const BLOCK_ROWS: usize = 1024;

/// Read-only index. The arena is scanned in fixed row blocks on the rayon
/// pool and the per-block winners are merged.
#[derive(Debug)]
pub struct DenseIndex {
    spec: DescriptorSpec,
    arena: Arena,
}

impl DenseIndex {
    /// Load a dense-layout file. Dynamic files are rejected; convert them
    /// by saving a [`DynamicIndex`](super::DynamicIndex) as
    /// [`IndexType::Dense`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stored = storage::read_index(path)?;
        if stored.info.kind != IndexType::Dense {
            return Err(Error::Format {
                path: path.to_path_buf(),
                message: "expected a dense index, found a dynamic one".into(),
            });
        }
        Ok(Self::from_arena(stored.spec, stored.arena))
    }

    pub(crate) fn from_arena(spec: DescriptorSpec, arena: Arena) -> Self {
        debug_assert_eq!(spec.length(), arena.length());
        Self { spec, arena }
    }

    /// Fixed number of descriptors held.
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }
}

impl Index for DenseIndex {
    fn spec(&self) -> &DescriptorSpec {
        &self.spec
    }

    fn kind(&self) -> IndexType {
        IndexType::Dense
    }

    fn count(&self) -> usize {
        self.arena.len()
    }

    fn search(&self, descriptor: &Descriptor, max_count: usize) -> Result<Vec<IndexResult>> {
        let count = self.arena.len();
        check_search(&self.spec, count, descriptor, max_count)?;

        let query = descriptor.values();
        let query_norm = l2_norm(query);
        let blocks = count.div_ceil(BLOCK_ROWS);

        let top = (0..blocks)
            .into_par_iter()
            .map(|block| {
                let start = block * BLOCK_ROWS;
                let end = (start + BLOCK_ROWS).min(count);
                scan(&self.arena, self.spec.metric(), query, query_norm, start..end, max_count)
            })
            .reduce(|| TopK::new(max_count), TopK::merge);

        let results = top.into_results();
        tracing::debug!(count, blocks, max_count, hits = results.len(), "dense search");
        Ok(results)
    }

    fn descriptor(&self, position: usize) -> Result<Descriptor> {
        check_position(position, self.arena.len())?;
        Ok(Descriptor::from_trusted(self.spec.version(), self.arena.row(position).to_vec()))
    }

    fn append(&self, _descriptor: &Descriptor) -> Result<()> {
        Err(Error::UnsupportedOperation("a dense index cannot be appended to"))
    }

    fn append_batch(&self, _batch: &DescriptorBatch) -> Result<()> {
        Err(Error::UnsupportedOperation("a dense index cannot be appended to"))
    }

    fn save(&self, path: &Path, kind: IndexType) -> Result<()> {
        storage::write_index(path, kind, &self.spec, &self.arena)
    }
}
