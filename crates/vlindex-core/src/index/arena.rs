//! Row-major descriptor storage shared by both index variants.

use crate::descriptor::Descriptor;
use crate::metric::l2_norm;

/// Contiguous `count × length` matrix plus a cached L2 norm per row.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    length: usize,
    data: Vec<f32>,
    norms: Vec<f32>,
}

impl Arena {
    pub(crate) fn new(length: usize) -> Self {
        Self {
            length,
            data: Vec::new(),
            norms: Vec::new(),
        }
    }

    /// Rebuild from persisted rows and norms. Callers check the sizes.
    pub(crate) fn from_parts(length: usize, data: Vec<f32>, norms: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), norms.len() * length);
        Self { length, data, norms }
    }

    pub(crate) fn len(&self) -> usize {
        self.norms.len()
    }

    pub(crate) fn length(&self) -> usize {
        self.length
    }

    pub(crate) fn push(&mut self, descriptor: &Descriptor) {
        self.data.extend_from_slice(descriptor.values());
        self.norms.push(l2_norm(descriptor.values()));
    }

    pub(crate) fn reserve(&mut self, rows: usize) {
        self.data.reserve(rows * self.length);
        self.norms.reserve(rows);
    }

    pub(crate) fn row(&self, position: usize) -> &[f32] {
        let start = position * self.length;
        &self.data[start..start + self.length]
    }

    pub(crate) fn norm(&self, position: usize) -> f32 {
        self.norms[position]
    }

    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn norms(&self) -> &[f32] {
        &self.norms
    }
}
