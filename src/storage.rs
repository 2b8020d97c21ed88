use crate::dense::DenseStorage;
use crate::sparse::SparseStorage;
use crate::Error;

/// Which concrete shape a raw (header-less) blob holds. Raw blobs never
/// sniff their own kind -- the caller who stripped the header (or who
/// built the blob in the first place) already knows it (see Design Notes
/// "Sparse/dense tag bit" in the spec).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Sparse,
    Dense,
}

/// Tagged union of the two bucket storage representations (invariant 4:
/// sparse is used below the promotion threshold, dense above it).
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Storage {
    Sparse(SparseStorage),
    Dense(DenseStorage),
}

impl Storage {
    pub(crate) fn get(&self, idx: u32) -> u8 {
        match self {
            Storage::Sparse(s) => s.get(idx),
            Storage::Dense(d) => d.get(idx),
        }
    }

    pub(crate) fn is_dense(&self) -> bool {
        matches!(self, Storage::Dense(_))
    }

    pub(crate) fn indicator_sums(&self, m: u32) -> (u64, u32) {
        match self {
            Storage::Dense(d) => d.indicator_sums(),
            Storage::Sparse(s) => {
                let r_sum = s.entries.values().map(|&v| v as u64).sum();
                let b_e = m - s.entries.len() as u32;
                (r_sum, b_e)
            }
        }
    }

    pub(crate) fn parse(kind: StorageKind, k: u8, d: u8, m: u32, buf: &[u8]) -> Result<Self, Error> {
        match kind {
            StorageKind::Sparse => Ok(Storage::Sparse(SparseStorage::parse(k, d, buf)?)),
            StorageKind::Dense => Ok(Storage::Dense(DenseStorage::parse(m, buf)?)),
        }
    }

    pub(crate) fn to_bytes(&self, k: u8, d: u8) -> Vec<u8> {
        match self {
            Storage::Dense(dense) => dense.buf.clone(),
            Storage::Sparse(sparse) => {
                let mut buf = vec![0u8; sparse.byte_len(d)];
                sparse.write_bytes(k, d, &mut buf);
                buf
            }
        }
    }

    /// Parses a raw merge source blob, sniffing its shape the way spec.md
    /// §4.5's merge validation describes: dense if the length matches `m`
    /// exactly, sparse if it matches the `ID || (V, IDX)*` shape for `k`.
    /// Anything else is a merge failure, never a panic.
    pub(crate) fn parse_merge_source(k: u8, d: u8, m: u32, buf: &[u8]) -> Result<Self, Error> {
        if buf.len() == m as usize {
            return Ok(Storage::Dense(DenseStorage::parse(m, buf)?));
        }

        let record = 1 + d as usize;
        if !buf.is_empty() && buf[0] == (0x80 | k) && (buf.len() - 1) % record == 0 {
            return SparseStorage::parse(k, d, buf)
                .map(Storage::Sparse)
                .map_err(|_| Error::MergeFailed);
        }

        Err(Error::MergeFailed)
    }
}
