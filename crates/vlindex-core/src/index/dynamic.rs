use super::arena::Arena;
use super::search::scan;
use super::{check_position, check_search, Index, IndexResult, IndexType};
use crate::descriptor::{Descriptor, DescriptorBatch, DescriptorSpec};
use crate::error::{Error, Result};
use crate::metric::l2_norm;
use crate::storage;
use parking_lot::RwLock;
use std::path::Path;

/// Appendable index. Searches share a read lock; appends take the write
/// lock, so a search always sees either none or all of a batch.
#[derive(Debug)]
pub struct DynamicIndex {
    spec: DescriptorSpec,
    arena: RwLock<Arena>,
}

impl DynamicIndex {
    /// Empty index for descriptors of `spec`.
    pub fn new(spec: DescriptorSpec) -> Self {
        Self {
            spec,
            arena: RwLock::new(Arena::new(spec.length())),
        }
    }

    /// Load a dynamic-layout file. Dense files are rejected: they cannot
    /// be appended to.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stored = storage::read_index(path)?;
        if stored.info.kind != IndexType::Dynamic {
            return Err(Error::Format {
                path: path.to_path_buf(),
                message: "expected a dynamic index, found a dense one".into(),
            });
        }
        Ok(Self::from_arena(stored.spec, stored.arena))
    }

    pub(crate) fn from_arena(spec: DescriptorSpec, arena: Arena) -> Self {
        Self {
            spec,
            arena: RwLock::new(arena),
        }
    }

    /// Current number of stored descriptors.
    pub fn descriptors_count(&self) -> usize {
        self.arena.read().len()
    }
}

impl Index for DynamicIndex {
    fn spec(&self) -> &DescriptorSpec {
        &self.spec
    }

    fn kind(&self) -> IndexType {
        IndexType::Dynamic
    }

    fn count(&self) -> usize {
        self.descriptors_count()
    }

    fn search(&self, descriptor: &Descriptor, max_count: usize) -> Result<Vec<IndexResult>> {
        let arena = self.arena.read();
        check_search(&self.spec, arena.len(), descriptor, max_count)?;

        let query = descriptor.values();
        let results = scan(&arena, self.spec.metric(), query, l2_norm(query), 0..arena.len(), max_count)
            .into_results();
        tracing::debug!(count = arena.len(), max_count, hits = results.len(), "dynamic search");
        Ok(results)
    }

    fn descriptor(&self, position: usize) -> Result<Descriptor> {
        let arena = self.arena.read();
        check_position(position, arena.len())?;
        Ok(Descriptor::from_trusted(self.spec.version(), arena.row(position).to_vec()))
    }

    fn append(&self, descriptor: &Descriptor) -> Result<()> {
        self.spec.check(descriptor, None)?;
        let mut arena = self.arena.write();
        arena.push(descriptor);
        tracing::debug!(position = arena.len() - 1, "descriptor appended");
        Ok(())
    }

    fn append_batch(&self, batch: &DescriptorBatch) -> Result<()> {
        for (position, descriptor) in batch.iter().enumerate() {
            self.spec.check(descriptor, Some(position))?;
        }

        let mut arena = self.arena.write();
        arena.reserve(batch.len());
        for descriptor in batch {
            arena.push(descriptor);
        }
        tracing::debug!(added = batch.len(), count = arena.len(), "descriptor batch appended");
        Ok(())
    }

    fn save(&self, path: &Path, kind: IndexType) -> Result<()> {
        let arena = self.arena.read();
        storage::write_index(path, kind, &self.spec, &arena)
    }
}
