use crate::Error;

/// Dense bucket storage: one byte per bucket, `m = 2^k` bytes total. A
/// zero value means the bucket has never been set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DenseStorage {
    pub(crate) buf: Vec<u8>,
}

impl DenseStorage {
    /// Allocates an all-zero register array of length `m`, surfacing
    /// allocation failure as `Error::OutOfMemory` rather than aborting.
    pub(crate) fn zeroed(m: u32) -> Result<Self, Error> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(m as usize)
            .map_err(|_| Error::OutOfMemory)?;
        buf.resize(m as usize, 0);
        Ok(Self { buf })
    }

    pub(crate) fn get(&self, idx: u32) -> u8 {
        self.buf[idx as usize]
    }

    /// Sets `idx` to `value` iff greater than its current value. Returns
    /// whether the entry changed.
    pub(crate) fn set_if_greater(&mut self, idx: u32, value: u8) -> bool {
        let slot = &mut self.buf[idx as usize];
        if value > *slot {
            *slot = value;
            true
        } else {
            false
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buf.iter_mut().for_each(|b| *b = 0);
    }

    /// Sum of all bucket values and count of empty buckets, recomputed
    /// from scratch -- used after merge and after parsing from bytes.
    pub(crate) fn indicator_sums(&self) -> (u64, u32) {
        let mut r_sum = 0u64;
        let mut b_e = 0u32;
        for &v in &self.buf {
            r_sum += v as u64;
            if v == 0 {
                b_e += 1;
            }
        }
        (r_sum, b_e)
    }

    pub(crate) fn parse(m: u32, buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != m as usize {
            return Err(Error::InvalidArg("dense storage length does not match m"));
        }
        Ok(Self { buf: buf.to_vec() })
    }
}
