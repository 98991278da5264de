//! On-disk index formats.
//!
//! Both layouts share a 32-byte little-endian header and end with a
//! SHA-256 digest of everything before it:
//!
//! ```text
//! magic[4] | format u16 | metric u8 | reserved u8 | version u32 | length u32 | count u64 | created_at i64
//! ```
//!
//! - `VLDY` (dynamic): `count` raw descriptors (`"dp\0\0" | version | values`).
//! - `VLDN` (dense): a `count × length` f32 matrix, then `count` f32 row norms.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! failed save never clobbers an existing index.

use crate::descriptor::{decode_f32s, Descriptor, DescriptorSpec, RAW_HEADER_SIZE, RAW_PREFIX};
use crate::error::{Error, Result};
use crate::index::arena::Arena;
use crate::index::IndexType;
use crate::metric::{l2_norm, Metric};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC_DYNAMIC: &[u8; 4] = b"VLDY";
const MAGIC_DENSE: &[u8; 4] = b"VLDN";
const FORMAT_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;
const DIGEST_SIZE: usize = 32;

/// Summary of an index file, read from its header alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub kind: IndexType,
    pub descriptor_version: u32,
    pub descriptor_length: usize,
    pub metric: Metric,
    pub count: usize,
    pub created_at: Option<DateTime<Utc>>,
}

impl IndexInfo {
    pub fn spec(&self) -> Result<DescriptorSpec> {
        DescriptorSpec::new(self.descriptor_version, self.descriptor_length, self.metric)
    }
}

/// Contents of a fully validated index file.
#[derive(Debug)]
pub(crate) struct StoredIndex {
    pub(crate) info: IndexInfo,
    pub(crate) spec: DescriptorSpec,
    pub(crate) arena: Arena,
}

/// Forwards writes and feeds every byte into the trailing digest.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn encode_header(kind: IndexType, spec: &DescriptorSpec, count: usize, created_at: i64) -> io::Result<Vec<u8>> {
    let length = u32::try_from(spec.length()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("descriptor length {} does not fit the index header", spec.length()),
        )
    })?;
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(match kind {
        IndexType::Dynamic => MAGIC_DYNAMIC,
        IndexType::Dense => MAGIC_DENSE,
    });
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header.push(spec.metric().tag());
    header.push(0);
    header.extend_from_slice(&spec.version().to_le_bytes());
    header.extend_from_slice(&length.to_le_bytes());
    header.extend_from_slice(&(count as u64).to_le_bytes());
    header.extend_from_slice(&created_at.to_le_bytes());
    Ok(header)
}

fn write_body<W: Write>(out: &mut W, kind: IndexType, spec: &DescriptorSpec, arena: &Arena) -> io::Result<()> {
    match kind {
        IndexType::Dynamic => {
            for position in 0..arena.len() {
                out.write_all(RAW_PREFIX)?;
                out.write_all(&spec.version().to_le_bytes())?;
                for v in arena.row(position) {
                    out.write_all(&v.to_le_bytes())?;
                }
            }
        }
        IndexType::Dense => {
            for v in arena.data() {
                out.write_all(&v.to_le_bytes())?;
            }
            for n in arena.norms() {
                out.write_all(&n.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

fn write_contents<W: Write>(inner: W, kind: IndexType, spec: &DescriptorSpec, arena: &Arena) -> io::Result<()> {
    let mut out = DigestWriter {
        inner,
        hasher: Sha256::new(),
    };
    out.write_all(&encode_header(kind, spec, arena.len(), Utc::now().timestamp())?)?;
    write_body(&mut out, kind, spec, arena)?;

    let DigestWriter { mut inner, hasher } = out;
    inner.write_all(&hasher.finalize())?;
    inner.flush()
}

/// Serialize `arena` to `path` in the `kind` layout, atomically.
pub(crate) fn write_index(path: &Path, kind: IndexType, spec: &DescriptorSpec, arena: &Arena) -> Result<()> {
    if path.is_dir() {
        return Err(Error::IsADirectory {
            path: path.to_path_buf(),
        });
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| Error::from_write(parent, source))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| Error::from_write(path, source))?;

    write_contents(BufWriter::new(tmp.as_file_mut()), kind, spec, arena)
        .map_err(|source| Error::from_write(path, source))?;
    tmp.as_file()
        .sync_all()
        .map_err(|source| Error::from_write(path, source))?;
    tmp.persist(path)
        .map_err(|err| Error::from_write(path, err.error))?;

    tracing::info!(
        path = %path.display(),
        kind = %kind,
        count = arena.len(),
        version = spec.version(),
        "index saved"
    );
    Ok(())
}

fn read_error(path: &Path, source: io::Error) -> Error {
    let path = path.to_path_buf();
    match source.kind() {
        io::ErrorKind::NotFound => Error::NotFound { path },
        _ if path.is_dir() => Error::IsADirectory { path },
        _ => Error::Serialization { path, source },
    }
}

fn format_error(path: &Path, message: impl Into<String>) -> Error {
    let message = message.into();
    tracing::warn!(path = %path.display(), %message, "rejected index file");
    Error::Format {
        path: path.to_path_buf(),
        message,
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

fn decode_header(path: &Path, header: &[u8]) -> Result<IndexInfo> {
    if header.len() < HEADER_SIZE {
        return Err(format_error(path, "file is too short to hold an index header"));
    }

    let kind = match &header[..4] {
        m if m == MAGIC_DYNAMIC => IndexType::Dynamic,
        m if m == MAGIC_DENSE => IndexType::Dense,
        _ => return Err(format_error(path, "unrecognized index signature")),
    };

    let format = u16::from_le_bytes([header[4], header[5]]);
    if format != FORMAT_VERSION {
        return Err(format_error(path, format!("unsupported format version {format}")));
    }

    let metric = Metric::from_tag(header[6])
        .ok_or_else(|| format_error(path, format!("unknown metric tag {}", header[6])))?;
    let descriptor_version = le_u32(&header[8..12]);
    let descriptor_length = le_u32(&header[12..16]) as usize;
    if descriptor_length == 0 {
        return Err(format_error(path, "descriptor length is zero"));
    }
    let count = usize::try_from(le_u64(&header[16..24]))
        .map_err(|_| format_error(path, "descriptor count does not fit in memory"))?;
    let created_at = Utc
        .timestamp_opt(le_u64(&header[24..32]) as i64, 0)
        .single();

    Ok(IndexInfo {
        kind,
        descriptor_version,
        descriptor_length,
        metric,
        count,
        created_at,
    })
}

/// Read only the header of the index file at `path`.
pub fn read_info(path: &Path) -> Result<IndexInfo> {
    let mut file = File::open(path).map_err(|source| read_error(path, source))?;
    let mut header = [0u8; HEADER_SIZE];
    match file.read_exact(&mut header) {
        Ok(()) => decode_header(path, &header),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(format_error(path, "file is too short to hold an index header"))
        }
        Err(source) => Err(read_error(path, source)),
    }
}

fn body_size(info: &IndexInfo) -> Option<usize> {
    let count = info.count;
    let length = info.descriptor_length;
    match info.kind {
        IndexType::Dynamic => length
            .checked_mul(4)?
            .checked_add(RAW_HEADER_SIZE)?
            .checked_mul(count),
        IndexType::Dense => length.checked_add(1)?.checked_mul(4)?.checked_mul(count),
    }
}

/// Read and fully validate the index file at `path`.
pub(crate) fn read_index(path: &Path) -> Result<StoredIndex> {
    let bytes = fs::read(path).map_err(|source| read_error(path, source))?;
    let info = decode_header(path, &bytes)?;

    let expected = body_size(&info)
        .and_then(|body| body.checked_add(HEADER_SIZE + DIGEST_SIZE))
        .ok_or_else(|| format_error(path, "declared size overflows"))?;
    if bytes.len() != expected {
        return Err(format_error(
            path,
            format!("expected {expected} bytes for {} descriptors, found {}", info.count, bytes.len()),
        ));
    }

    let (content, digest) = bytes.split_at(bytes.len() - DIGEST_SIZE);
    if Sha256::digest(content).as_slice() != digest {
        return Err(format_error(path, "checksum mismatch"));
    }

    let spec = info.spec().map_err(|e| format_error(path, e.to_string()))?;
    let length = spec.length();
    let body = &content[HEADER_SIZE..];
    let arena = match info.kind {
        IndexType::Dynamic => {
            let mut arena = Arena::new(length);
            arena.reserve(info.count);
            for (position, raw) in body.chunks_exact(spec.raw_size()).enumerate() {
                let descriptor = Descriptor::from_raw(&spec, raw)
                    .map_err(|e| format_error(path, format!("descriptor {position}: {e}")))?;
                arena.push(&descriptor);
            }
            arena
        }
        IndexType::Dense => {
            let (rows, stored_norms) = body.split_at(info.count * length * 4);
            let data = decode_f32s(rows);
            if let Some(offset) = data.iter().position(|v| !v.is_finite()) {
                return Err(format_error(
                    path,
                    format!("descriptor {} holds a non-finite value", offset / length),
                ));
            }
            let norms: Vec<f32> = data.chunks_exact(length).map(l2_norm).collect();
            let mismatch = norms
                .iter()
                .zip(decode_f32s(stored_norms))
                .position(|(norm, stored)| norm.to_bits() != stored.to_bits());
            if let Some(position) = mismatch {
                return Err(format_error(
                    path,
                    format!("stored norm of descriptor {position} does not match its values"),
                ));
            }
            Arena::from_parts(length, data, norms)
        }
    };

    tracing::info!(
        path = %path.display(),
        kind = %info.kind,
        count = info.count,
        version = info.descriptor_version,
        "index loaded"
    );
    Ok(StoredIndex { info, spec, arena })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> (DescriptorSpec, Arena) {
        let spec = DescriptorSpec::new(7, 3, Metric::Cosine).unwrap();
        let mut arena = Arena::new(3);
        for i in 0..4 {
            let d = Descriptor::new(&spec, vec![i as f32, 1.0, -0.5]).unwrap();
            arena.push(&d);
        }
        (spec, arena)
    }

    #[test]
    fn test_both_layouts_reload_identically() {
        let tmp = TempDir::new().unwrap();
        let (spec, arena) = sample();
        for kind in [IndexType::Dynamic, IndexType::Dense] {
            let path = tmp.path().join(format!("{kind}.idx"));
            write_index(&path, kind, &spec, &arena).unwrap();

            let stored = read_index(&path).unwrap();
            assert_eq!(stored.info.kind, kind);
            assert_eq!(stored.spec, spec);
            assert_eq!(stored.info.spec().unwrap(), spec);
            assert_eq!(stored.info.count, 4);
            assert_eq!(stored.arena.data(), arena.data());
            assert_eq!(stored.arena.norms(), arena.norms());
            assert!(stored.info.created_at.is_some());
        }
    }

    #[test]
    fn test_read_info_uses_header_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.bin");
        let (spec, arena) = sample();
        write_index(&path, IndexType::Dense, &spec, &arena).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.kind, IndexType::Dense);
        assert_eq!(info.descriptor_version, 7);
        assert_eq!(info.descriptor_length, 3);
        assert_eq!(info.metric, Metric::Cosine);
        assert_eq!(info.count, 4);
    }

    #[test]
    fn test_unknown_magic_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("junk.bin");
        fs::write(&path, vec![0xABu8; 128]).unwrap();
        assert!(matches!(read_index(&path), Err(Error::Format { .. })));
        assert!(matches!(read_info(&path), Err(Error::Format { .. })));
    }

    #[test]
    fn test_short_file_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("short.bin");
        fs::write(&path, b"VLDY").unwrap();
        assert!(matches!(read_index(&path), Err(Error::Format { .. })));
        assert!(matches!(read_info(&path), Err(Error::Format { .. })));
    }

    #[test]
    fn test_corrupted_body_fails_checksum() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.bin");
        let (spec, arena) = sample();
        write_index(&path, IndexType::Dynamic, &spec, &arena).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 9] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = read_index(&path).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"), "{err}");
    }

    #[test]
    fn test_truncated_body_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.bin");
        let (spec, arena) = sample();
        write_index(&path, IndexType::Dense, &spec, &arena).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(matches!(read_index(&path), Err(Error::Format { .. })));
    }

    /// Replace the trailing digest so only the structural checks can fail.
    fn reseal(bytes: &mut Vec<u8>) {
        bytes.truncate(bytes.len() - DIGEST_SIZE);
        let digest = Sha256::digest(&bytes[..]);
        bytes.extend_from_slice(&digest);
    }

    fn dense_bytes(tmp: &TempDir) -> (std::path::PathBuf, Vec<u8>) {
        let path = tmp.path().join("index.dense");
        let (spec, arena) = sample();
        write_index(&path, IndexType::Dense, &spec, &arena).unwrap();
        let bytes = fs::read(&path).unwrap();
        (path, bytes)
    }

    #[test]
    fn test_dense_rejects_non_finite_values() {
        let tmp = TempDir::new().unwrap();
        let (path, mut bytes) = dense_bytes(&tmp);

        // Row 2, column 1.
        let offset = HEADER_SIZE + (2 * 3 + 1) * 4;
        bytes[offset..offset + 4].copy_from_slice(&f32::NAN.to_le_bytes());
        reseal(&mut bytes);
        fs::write(&path, &bytes).unwrap();

        let err = read_index(&path).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
        assert!(err.to_string().contains("descriptor 2"), "{err}");
    }

    #[test]
    fn test_dense_rejects_tampered_norms() {
        let tmp = TempDir::new().unwrap();
        let (path, mut bytes) = dense_bytes(&tmp);

        let norms_start = HEADER_SIZE + 4 * 3 * 4;
        bytes[norms_start + 4..norms_start + 8].copy_from_slice(&42.0f32.to_le_bytes());
        reseal(&mut bytes);
        fs::write(&path, &bytes).unwrap();

        let err = read_index(&path).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
        assert!(err.to_string().contains("descriptor 1"), "{err}");
    }

    #[test]
    fn test_dense_norms_are_recomputed_from_rows() {
        let tmp = TempDir::new().unwrap();
        let (path, _) = dense_bytes(&tmp);
        let stored = read_index(&path).unwrap();
        for position in 0..stored.arena.len() {
            assert_eq!(stored.arena.norm(position), l2_norm(stored.arena.row(position)));
        }
    }

    #[test]
    fn test_header_carries_exact_length() {
        let (spec, _) = sample();
        let header = encode_header(IndexType::Dense, &spec, 4, 0).unwrap();
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(le_u32(&header[12..16]), 3);
        assert_eq!(le_u64(&header[16..24]), 4);
    }

    #[test]
    fn test_info_spec_rejects_zero_length() {
        let info = IndexInfo {
            kind: IndexType::Dynamic,
            descriptor_version: 3,
            descriptor_length: 0,
            metric: Metric::L2,
            count: 0,
            created_at: None,
        };
        assert!(info.spec().unwrap_err().is_validation());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.bin");
        assert!(matches!(read_index(&path), Err(Error::NotFound { .. })));
        assert!(matches!(read_info(&path), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/deeper/index.bin");
        let (spec, arena) = sample();
        write_index(&path, IndexType::Dynamic, &spec, &arena).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_save_over_directory_leaves_it_untouched() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("target");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("keep.txt"), b"keep").unwrap();

        let (spec, arena) = sample();
        let err = write_index(&dir, IndexType::Dynamic, &spec, &arena).unwrap_err();
        assert!(matches!(err, Error::IsADirectory { .. }));

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read(dir.join("keep.txt")).unwrap(), b"keep");
    }
}
