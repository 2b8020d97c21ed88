use crate::Error;

/// Minimum and maximum precision `k`: `m = 2^k` buckets, per spec.
const MIN_K: u8 = 1;
const MAX_K: u8 = 31;

/// The 32-entry bias correction table (`alpha[k]`), derived offline from a
/// gamma-function expression (see the paper "LogLog Counting of Large
/// Cardinalities"). Index 0 is an unused placeholder -- `k` is never 0.
const ALPHA: [f64; 32] = [
    0.0,
    0.44567926005415,
    1.2480639342271,
    2.8391255240079,
    6.0165231584811,
    12.369319965552,
    25.073991603109,
    50.482891762521,
    101.30047482549,
    202.93553337953,
    406.20559693552,
    812.74569741657,
    1625.8258887309,
    3251.9862249084,
    6504.3071471860,
    13008.949929672,
    26018.222470181,
    52036.684135280,
    104073.41696276,
    208139.24771523,
    416265.57100022,
    832478.53851627,
    1669443.2499579,
    3356902.8702907,
    6863377.8429508,
    11978069.823687,
    31333767.455026,
    52114301.457757,
    72080129.928986,
    68945006.880409,
    31538957.552704,
    3299942.4347441,
];

/// Switching empty-bucket ratio: below this, the estimator uses the LogLog
/// formula rather than Linear Counting. Fixed by the algorithm, never
/// derived from data.
pub(crate) const B_S: f64 = 0.051;

/// Wire constant for the "Adaptive Counting" algorithm byte.
pub(crate) const ALGO_ADAPTIVE: u8 = 2;

/// Derived, immutable parameters for a given precision `k`: bucket count,
/// sparse index width, and the bias constant. Computed once at
/// construction and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Precision {
    pub(crate) k: u8,
    pub(crate) m: u32,
    pub(crate) d: u8,
    pub(crate) ca: f64,
}

impl Precision {
    pub(crate) fn new(k: u8) -> Result<Self, Error> {
        let precision = Self {
            k,
            m: 1u32.checked_shl(k as u32).unwrap_or(0),
            d: crate::varint::index_width(k),
            ca: *ALPHA.get(k as usize).unwrap_or(&0.0),
        };
        precision.validate()?;
        Ok(precision)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(MIN_K..=MAX_K).contains(&self.k) {
            return Err(Error::InvalidArg("k must be between 1 and 31"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_range_k() {
        assert!(Precision::new(0).is_err());
        assert!(Precision::new(32).is_err());
    }

    #[test]
    fn accepts_bounds() {
        assert!(Precision::new(1).is_ok());
        assert!(Precision::new(31).is_ok());
    }

    #[test]
    fn m_is_power_of_two() {
        let p = Precision::new(13).unwrap();
        assert_eq!(p.m, 8192);
        assert_eq!(p.d, 2);
    }
}
