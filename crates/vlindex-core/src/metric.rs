//! Distance metrics over descriptor vectors.
//!
//! The metric belongs to the embedding model that produced the
//! descriptors, so it travels with the [`DescriptorSpec`](crate::DescriptorSpec)
//! and is persisted in every index file.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance.
    #[default]
    L2,
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,
}

impl Metric {
    /// On-disk tag.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::Cosine => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::Cosine),
            _ => None,
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        self.distance_with_norms(a, l2_norm(a), b, l2_norm(b))
    }

    /// Distance with precomputed L2 norms. Indexes cache row norms so the
    /// cosine metric does not recompute them on every query.
    pub(crate) fn distance_with_norms(self, a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Metric::Cosine => {
                let denom = norm_a * norm_b;
                let cos = if denom > 0.0 {
                    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>() / denom
                } else {
                    0.0
                };
                (1.0 - cos).clamp(0.0, 2.0)
            }
        }
    }

    /// Map a distance to a similarity score in `[0, 1]`, 1 meaning identical.
    ///
    /// Assumes unit-normalized embeddings, which is what the descriptor
    /// extractors produce.
    pub fn similarity(self, distance: f32) -> f32 {
        let sim = match self {
            Metric::L2 => 1.0 - distance * distance / 4.0,
            Metric::Cosine => 1.0 - distance / 2.0,
        };
        sim.clamp(0.0, 1.0)
    }
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::L2 => "l2",
            Metric::Cosine => "cosine",
        })
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "cosine" => Ok(Metric::Cosine),
            other => Err(Error::InvalidArgument(format!(
                "unknown metric '{other}', must be one of ['l2', 'cosine']"
            ))),
        }
    }
}
