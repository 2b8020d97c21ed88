use std::collections::BTreeMap;

use crate::dense::DenseStorage;
use crate::varint::{read_le, write_le};
use crate::Error;

/// Sparse bucket storage: a sorted map from bucket index to rank value.
/// Never holds a zero value -- a bucket with no observation simply isn't a
/// key in the map. Serializes as `ID || (V, IDX)*` per the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub(crate) struct SparseStorage {
    pub(crate) entries: BTreeMap<u32, u8>,
}

impl SparseStorage {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, idx: u32) -> u8 {
        self.entries.get(&idx).copied().unwrap_or(0)
    }

    /// Sets `idx` to `value` iff greater than its current value (0 if
    /// absent). Returns whether the entry changed.
    pub(crate) fn set_if_greater(&mut self, idx: u32, value: u8) -> bool {
        match self.entries.get_mut(&idx) {
            Some(cur) if *cur < value => {
                *cur = value;
                true
            }
            Some(_) => false,
            None => {
                self.entries.insert(idx, value);
                true
            }
        }
    }

    /// `true` iff inserting one more entry (beyond the current count, or
    /// counting the current one if `extra` is false) would make the sparse
    /// encoding no smaller than dense: `(n+1)(d+1)+1 >= m`.
    pub(crate) fn should_use_dense(&self, d: u8, m: u32, extra: bool) -> bool {
        let n = self.entries.len() as u64 + if extra { 1 } else { 0 };
        n * (d as u64 + 1) + 1 >= m as u64
    }

    pub(crate) fn to_dense(&self, m: u32) -> Result<DenseStorage, Error> {
        let mut dense = DenseStorage::zeroed(m)?;
        for (&idx, &v) in self.entries.iter() {
            dense.buf[idx as usize] = v;
        }
        Ok(dense)
    }

    pub(crate) fn byte_len(&self, d: u8) -> usize {
        1 + self.entries.len() * (d as usize + 1)
    }

    pub(crate) fn write_bytes(&self, k: u8, d: u8, buf: &mut [u8]) {
        buf[0] = 0x80 | k;
        let mut off = 1;
        for (&idx, &v) in self.entries.iter() {
            buf[off] = v;
            write_le(&mut buf[off + 1..off + 1 + d as usize], d, idx);
            off += 1 + d as usize;
        }
    }

    /// Parses a sparse storage blob, enforcing all of invariant 2: the ID
    /// byte matches `k`, entries are strictly ascending by `IDX`, and every
    /// value is nonzero.
    pub(crate) fn parse(k: u8, d: u8, buf: &[u8]) -> Result<Self, Error> {
        if buf.is_empty() || buf[0] != (0x80 | k) {
            return Err(Error::InvalidArg("sparse id byte does not match precision"));
        }

        let record = 1 + d as usize;
        let body = &buf[1..];
        if body.len() % record != 0 {
            return Err(Error::InvalidArg(
                "sparse body length is not a whole number of records",
            ));
        }

        let mut entries = BTreeMap::new();
        let mut last: Option<u32> = None;
        for chunk in body.chunks(record) {
            let v = chunk[0];
            if v == 0 {
                return Err(Error::InvalidArg("sparse entry value must be nonzero"));
            }
            let idx = read_le(&chunk[1..], d);
            if let Some(prev) = last {
                if idx <= prev {
                    return Err(Error::InvalidArg(
                        "sparse entries are not strictly ascending",
                    ));
                }
            }
            last = Some(idx);
            entries.insert(idx, v);
        }

        Ok(Self { entries })
    }
}
