//! Descriptors: fixed-length embedding vectors tagged with the version of
//! the model that produced them.

use crate::error::{Error, Result};
use crate::metric::Metric;
use serde::Serialize;

/// Prefix of a raw descriptor blob, followed by the version and the vector.
pub const RAW_PREFIX: &[u8; 4] = b"dp\0\0";
/// Size of the raw blob header: prefix + little-endian `u32` version.
pub const RAW_HEADER_SIZE: usize = 8;

const FACE_DESCRIPTOR_LENGTH: usize = 512;
const HUMAN_DESCRIPTOR_LENGTH: usize = 2048;

/// Descriptor versions the extractors ship with, and their vector lengths.
const KNOWN_VERSIONS: [(u32, usize); 5] = [
    (54, FACE_DESCRIPTOR_LENGTH),
    (56, FACE_DESCRIPTOR_LENGTH),
    (57, FACE_DESCRIPTOR_LENGTH),
    (58, FACE_DESCRIPTOR_LENGTH),
    (101, HUMAN_DESCRIPTOR_LENGTH),
];

/// Shape contract for one descriptor version: vector length and the metric
/// its embeddings are compared with.
///
/// Only [`new`](Self::new) and [`known`](Self::known) build one, so the
/// length is always non-zero and fits the index file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DescriptorSpec {
    version: u32,
    length: usize,
    metric: Metric,
}

impl DescriptorSpec {
    pub fn new(version: u32, length: usize, metric: Metric) -> Result<Self> {
        if length == 0 {
            return Err(Error::Validation(format!(
                "descriptor version {version} must have a non-zero length"
            )));
        }
        if u32::try_from(length).is_err() {
            return Err(Error::Validation(format!(
                "descriptor length {length} exceeds {}",
                u32::MAX
            )));
        }
        Ok(Self { version, length, metric })
    }

    /// Look up a built-in descriptor version (L2 metric).
    pub fn known(version: u32) -> Result<Self> {
        KNOWN_VERSIONS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|&(version, length)| Self { version, length, metric: Metric::L2 })
            .ok_or_else(|| {
                Error::Validation(format!("descriptor version {version} is not supported"))
            })
    }

    /// The same shape compared under `metric`.
    pub fn with_metric(self, metric: Metric) -> Self {
        Self { metric, ..self }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of values in every descriptor of this version.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Size in bytes of a raw descriptor blob of this spec.
    pub fn raw_size(&self) -> usize {
        RAW_HEADER_SIZE + self.length * 4
    }

    /// Check that `descriptor` was produced under this spec.
    pub(crate) fn check(&self, descriptor: &Descriptor, position: Option<usize>) -> Result<()> {
        if descriptor.version != self.version {
            return Err(Error::VersionMismatch {
                expected: self.version,
                actual: descriptor.version,
                position,
            });
        }
        if descriptor.len() != self.length {
            return Err(Error::Validation(format!(
                "expected {} values for version {}, got {}",
                self.length,
                self.version,
                descriptor.len()
            )));
        }
        Ok(())
    }
}

/// An immutable embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    version: u32,
    values: Vec<f32>,
}

impl Descriptor {
    /// Validate `values` against `spec`: exact length, finite values only.
    pub fn new(spec: &DescriptorSpec, values: Vec<f32>) -> Result<Self> {
        if values.len() != spec.length {
            return Err(Error::Validation(format!(
                "expected {} values for version {}, got {}",
                spec.length,
                spec.version,
                values.len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::Validation(format!(
                "value at offset {pos} is not a finite number"
            )));
        }
        Ok(Self { version: spec.version, values })
    }

    /// Decode a raw blob: `"dp\0\0"`, version (u32 LE), `length` f32 LE values.
    pub fn from_raw(spec: &DescriptorSpec, raw: &[u8]) -> Result<Self> {
        if raw.len() != spec.raw_size() {
            return Err(Error::Validation(format!(
                "raw descriptor must be {} bytes, got {}",
                spec.raw_size(),
                raw.len()
            )));
        }
        if &raw[..4] != RAW_PREFIX {
            return Err(Error::Validation("raw descriptor has a bad signature".into()));
        }
        let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if version != spec.version {
            return Err(Error::VersionMismatch {
                expected: spec.version,
                actual: version,
                position: None,
            });
        }
        Self::new(spec, decode_f32s(&raw[RAW_HEADER_SIZE..]))
    }

    /// Encode as a raw blob, the inverse of [`from_raw`](Self::from_raw).
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(RAW_HEADER_SIZE + self.values.len() * 4);
        raw.extend_from_slice(RAW_PREFIX);
        raw.extend_from_slice(&self.version.to_le_bytes());
        for v in &self.values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        raw
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false: a spec never has zero length.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Rebuild from index storage, where the row was validated on the way in.
    pub(crate) fn from_trusted(version: u32, values: Vec<f32>) -> Self {
        Self { version, values }
    }
}

pub(crate) fn decode_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// A non-empty, ordered run of descriptors sharing one version and length.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorBatch {
    descriptors: Vec<Descriptor>,
}

impl DescriptorBatch {
    pub fn new(descriptors: Vec<Descriptor>) -> Result<Self> {
        let first = descriptors
            .first()
            .ok_or_else(|| Error::InvalidBatch("descriptor batch must not be empty".into()))?;
        let (version, length) = (first.version, first.len());

        for (pos, d) in descriptors.iter().enumerate().skip(1) {
            if d.version != version || d.len() != length {
                return Err(Error::InvalidBatch(format!(
                    "batch element {pos} has version {} and length {}, expected version {version} and length {length}",
                    d.version,
                    d.len()
                )));
            }
        }

        Ok(Self { descriptors })
    }

    pub fn version(&self) -> u32 {
        self.descriptors[0].version
    }

    /// Vector length shared by every element.
    pub fn descriptor_length(&self) -> usize {
        self.descriptors[0].len()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Descriptor> {
        self.descriptors.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.descriptors.iter()
    }
}

impl<'a> IntoIterator for &'a DescriptorBatch {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DescriptorSpec {
        DescriptorSpec::new(3, 4, Metric::L2).unwrap()
    }

    #[test]
    fn test_known_versions() {
        assert_eq!(DescriptorSpec::known(54).unwrap().length(), 512);
        assert_eq!(DescriptorSpec::known(58).unwrap().length(), 512);
        assert_eq!(DescriptorSpec::known(101).unwrap().length(), 2048);
        assert_eq!(DescriptorSpec::known(101).unwrap().metric(), Metric::L2);
        assert!(DescriptorSpec::known(55).unwrap_err().is_validation());
    }

    #[test]
    fn test_zero_length_spec_rejected() {
        let err = DescriptorSpec::new(3, 0, Metric::L2).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_length_must_fit_file_header() {
        let too_long = u32::MAX as usize + 1;
        assert!(matches!(
            DescriptorSpec::new(3, too_long, Metric::L2),
            Err(Error::Validation(_))
        ));
        assert!(DescriptorSpec::new(3, u32::MAX as usize, Metric::L2).is_ok());
    }

    #[test]
    fn test_with_metric_keeps_shape() {
        let spec = DescriptorSpec::known(56).unwrap().with_metric(Metric::Cosine);
        assert_eq!(spec.version(), 56);
        assert_eq!(spec.length(), 512);
        assert_eq!(spec.metric(), Metric::Cosine);
    }

    #[test]
    fn test_create_rejects_wrong_length() {
        let err = Descriptor::new(&spec(), vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_create_rejects_non_finite() {
        let err = Descriptor::new(&spec(), vec![0.0, f32::NAN, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = Descriptor::new(&spec(), vec![0.0, 0.0, f32::INFINITY, 0.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_raw_layout() {
        let d = Descriptor::new(&spec(), vec![1.0, -2.0, 0.5, 0.0]).unwrap();
        let raw = d.to_raw();
        assert_eq!(raw.len(), spec().raw_size());
        assert_eq!(&raw[..8], b"dp\0\0\x03\0\0\0");
        assert_eq!(&raw[8..12], &1.0f32.to_le_bytes());
        assert_eq!(Descriptor::from_raw(&spec(), &raw).unwrap(), d);
    }

    #[test]
    fn test_raw_rejects_bad_signature_and_version() {
        let d = Descriptor::new(&spec(), vec![1.0; 4]).unwrap();
        let mut raw = d.to_raw();
        raw[0] = b'x';
        assert!(matches!(Descriptor::from_raw(&spec(), &raw), Err(Error::Validation(_))));

        let mut raw = d.to_raw();
        raw[4] = 9;
        assert!(matches!(
            Descriptor::from_raw(&spec(), &raw),
            Err(Error::VersionMismatch { expected: 3, actual: 9, .. })
        ));

        let raw = d.to_raw();
        assert!(Descriptor::from_raw(&spec(), &raw[..raw.len() - 1]).is_err());
    }

    #[test]
    fn test_batch_rejects_empty_and_mixed() {
        let err = DescriptorBatch::new(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
        assert_eq!(err.code(), 100008);

        let other = DescriptorSpec::new(4, 4, Metric::L2).unwrap();
        let a = Descriptor::new(&spec(), vec![0.0; 4]).unwrap();
        let b = Descriptor::new(&other, vec![0.0; 4]).unwrap();
        let err = DescriptorBatch::new(vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("element 1"));
        assert_eq!(err.info().desc, "Invalid descriptor batch");
        assert!(err.is_validation());
    }

    #[test]
    fn test_batch_iteration_is_ordered_and_restartable() {
        let ds: Vec<_> = (0..3)
            .map(|i| Descriptor::new(&spec(), vec![i as f32; 4]).unwrap())
            .collect();
        let batch = DescriptorBatch::new(ds.clone()).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.version(), 3);
        assert_eq!(batch.descriptor_length(), 4);

        let first: Vec<_> = batch.iter().cloned().collect();
        let second: Vec<_> = (&batch).into_iter().cloned().collect();
        assert_eq!(first, ds);
        assert_eq!(second, ds);
        assert_eq!(batch.get(2), Some(&ds[2]));
        assert_eq!(batch.get(3), None);
    }
}
