//! JSON descriptor files: a single descriptor is an array of numbers, a
//! batch is an array of such arrays.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use vlindex_core::{Descriptor, DescriptorBatch, DescriptorSpec};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("invalid descriptor JSON in {}", path.display()))
}

pub fn read_descriptor(path: &Path, spec: &DescriptorSpec) -> Result<Descriptor> {
    let values: Vec<f32> = read_json(path)?;
    Descriptor::new(spec, values).with_context(|| format!("descriptor in {}", path.display()))
}

pub fn read_batch(path: &Path, spec: &DescriptorSpec) -> Result<DescriptorBatch> {
    let rows: Vec<Vec<f32>> = read_json(path)?;
    let descriptors = rows
        .into_iter()
        .enumerate()
        .map(|(i, values)| {
            Descriptor::new(spec, values)
                .with_context(|| format!("descriptor {i} in {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    DescriptorBatch::new(descriptors).with_context(|| format!("descriptor batch in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vlindex_core::Metric;

    fn spec() -> DescriptorSpec {
        DescriptorSpec::new(3, 3, Metric::L2).unwrap()
    }

    #[test]
    fn test_read_batch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("batch.json");
        std::fs::write(&path, "[[0.1, 0.2, 0.3], [1, 0, 0]]").unwrap();

        let batch = read_batch(&path, &spec()).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1).unwrap().values(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_read_batch_reports_bad_row() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("batch.json");
        std::fs::write(&path, "[[0.1, 0.2, 0.3], [1, 0]]").unwrap();

        let err = read_batch(&path, &spec()).unwrap_err();
        assert!(format!("{err:#}").contains("descriptor 1"));
        assert!(err.downcast_ref::<vlindex_core::Error>().is_some());
    }

    #[test]
    fn test_read_empty_batch_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("batch.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(read_batch(&path, &spec()).is_err());
    }

    #[test]
    fn test_read_descriptor() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("query.json");
        std::fs::write(&path, "[0.5, 0.5, 0.0]").unwrap();
        assert_eq!(read_descriptor(&path, &spec()).unwrap().version(), 3);
    }
}
