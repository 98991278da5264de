//! Pairwise descriptor matching, for callers that compare a reference against
//! a handful of candidates without building an index.

use crate::descriptor::{Descriptor, DescriptorBatch, DescriptorSpec};
use crate::error::Result;
use serde::Serialize;

/// Outcome of comparing two descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchingResult {
    /// Distance under the spec's metric; smaller is closer.
    pub distance: f32,
    /// Similarity in [0, 1]; higher is closer.
    pub similarity: f32,
}

pub struct DescriptorMatcher {
    spec: DescriptorSpec,
}

impl DescriptorMatcher {
    pub fn new(spec: DescriptorSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &DescriptorSpec {
        &self.spec
    }

    pub fn match_one(&self, reference: &Descriptor, candidate: &Descriptor) -> Result<MatchingResult> {
        self.spec.check(reference, None)?;
        self.spec.check(candidate, None)?;
        Ok(self.score(reference, candidate))
    }

    /// Match `reference` against every batch element, in batch order.
    pub fn match_batch(
        &self,
        reference: &Descriptor,
        candidates: &DescriptorBatch,
    ) -> Result<Vec<MatchingResult>> {
        self.spec.check(reference, None)?;
        for (pos, candidate) in candidates.iter().enumerate() {
            self.spec.check(candidate, Some(pos))?;
        }
        Ok(candidates
            .iter()
            .map(|candidate| self.score(reference, candidate))
            .collect())
    }

    fn score(&self, a: &Descriptor, b: &Descriptor) -> MatchingResult {
        let distance = self.spec.metric().distance(a.values(), b.values());
        MatchingResult {
            distance,
            similarity: self.spec.metric().similarity(distance),
        }
    }
}
