//! Adaptive Counting: a probabilistic distinct-element (cardinality)
//! estimator with a hybrid sparse/dense bucket representation, a
//! bias-corrected estimator that switches between Linear Counting and
//! LogLog formulas, n-way merge across heterogeneous sources, and a
//! small header-tagged wire format.
//!
//! A sketch is a single-owner, single-threaded mutable value (see the
//! crate's design notes on concurrency): independent sketches on
//! independent threads are safe, but mutating one sketch from multiple
//! threads at once is not -- shard locally, then merge in one thread.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::dense::DenseStorage;
use crate::precision::{Precision, ALGO_ADAPTIVE, B_S};
use crate::sparse::SparseStorage;
use crate::storage::Storage;

mod dense;
mod hash;
mod precision;
mod sparse;
#[cfg(test)]
#[path = "sparse_test.rs"]
mod sparse_test;
mod storage;
mod varint;

pub use storage::StorageKind as BlobKind;

/// Which hashing contract a sketch uses. Selected at construction and
/// fixed for the sketch's lifetime; `from_framed`/`merge` reject any
/// source whose `hash_id` doesn't match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashId {
    Murmur2_32 = 1,
    Lookup3_64 = 2,
}

impl HashId {
    fn bits(self) -> u32 {
        match self {
            HashId::Murmur2_32 => 32,
            HashId::Lookup3_64 => 64,
        }
    }

    fn hash(self, bytes: &[u8]) -> u64 {
        match self {
            HashId::Murmur2_32 => hash::murmur2_32(bytes, 0xFFFFFFFF) as u64,
            HashId::Lookup3_64 => hash::lookup3_64(bytes),
        }
    }

    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            1 => Ok(HashId::Murmur2_32),
            2 => Ok(HashId::Lookup3_64),
            _ => Err(Error::InvalidArg("unrecognized hash_id")),
        }
    }
}

/// Outcome of `offer`: whether the observation changed the sketch's
/// state, i.e. whether it could affect `cardinality()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    Modified,
    Unmodified,
}

/// The four error codes from spec.md §6, each translating to exactly one
/// human-readable string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid or uninitialized sketch context")]
    InvalidCtx,
    #[error("merge failed: hash_id, precision, or algorithm mismatch between sources")]
    MergeFailed,
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),
    #[error("allocation failure")]
    OutOfMemory,
}

/// A merge input: an in-memory sketch, a raw (header-less) storage blob,
/// or a header-prefixed ("framed") blob. All three are accepted
/// interchangeably by `AdaptiveCounting::merge`.
pub enum MergeSource<'a> {
    Sketch(&'a AdaptiveCounting),
    Raw(&'a [u8]),
    Framed(&'a [u8]),
}

/// The operational contract shared by every cardinality estimator in this
/// family (spec.md Design Notes, "Polymorphism": the capability set
/// `{Init, Offer, Cardinality, Merge, Serialize, Reset}` that the
/// original's `ccard_algo_t` vtable grouped together). `Init` and `Merge`
/// are not part of this trait: construction varies by source shape
/// (fresh, raw blob, framed blob) in ways that don't fit one signature,
/// and `merge` takes a slice of `MergeSource` whose variants are specific
/// to this engine's wire formats. Both still exist as inherent methods on
/// `AdaptiveCounting`.
pub trait Sketch {
    fn offer(&mut self, bytes: &[u8]) -> Result<Offer, Error>;
    fn cardinality(&self) -> u64;
    fn reset(&mut self);
    fn to_raw(&self) -> Vec<u8>;
    fn to_framed(&self) -> Vec<u8>;
}

/// The Adaptive Counting sketch: precision, hash selector, running
/// indicator sums, and hybrid sparse/dense bucket storage.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveCounting {
    precision: Precision,
    hash_id: HashId,
    storage: Storage,
    r_sum: u64,
    b_e: u32,
}

impl AdaptiveCounting {
    /// Creates an empty sketch for precision `k` (`1..=31`) using
    /// `hash_id`. `sparse_hint` selects the initial storage kind; sparse
    /// starts as a single ID byte, dense starts zero-filled.
    pub fn new(k: u8, hash_id: HashId, sparse_hint: bool) -> Result<Self, Error> {
        let precision = Precision::new(k)?;
        let storage = if sparse_hint {
            Storage::Sparse(SparseStorage::empty())
        } else {
            Storage::Dense(DenseStorage::zeroed(precision.m)?)
        };

        Ok(Self {
            precision,
            hash_id,
            storage,
            r_sum: 0,
            b_e: precision.m,
        })
    }

    /// Reconstructs a sketch from a header-less storage blob. The caller
    /// must already know whether `bytes` holds sparse or dense storage
    /// (see spec.md §9's open question on sparse/dense disambiguation) --
    /// this constructor never sniffs.
    pub fn from_raw(bytes: &[u8], k: u8, hash_id: HashId, kind: BlobKind) -> Result<Self, Error> {
        let precision = Precision::new(k)?;
        let storage = Storage::parse(kind, precision.k, precision.d, precision.m, bytes)?;
        let (r_sum, b_e) = storage.indicator_sums(precision.m);

        Ok(Self {
            precision,
            hash_id,
            storage,
            r_sum,
            b_e,
        })
    }

    /// Reconstructs a sketch from a 3-byte-header-prefixed blob produced
    /// by `to_framed`. The storage body is sniffed (high bit set and low
    /// 7 bits equal to `k` means sparse) -- this is safe here only
    /// because the header's algorithm byte has already confirmed this is
    /// an Adaptive Counting blob.
    pub fn from_framed(bytes: &[u8]) -> Result<Self, Error> {
        let (algo, hash_byte, k, body) =
            split_header(bytes).ok_or(Error::InvalidArg("framed blob too short"))?;
        if algo != ALGO_ADAPTIVE {
            return Err(Error::InvalidArg("algorithm byte does not match Adaptive Counting"));
        }
        let hash_id = HashId::from_byte(hash_byte)?;
        let kind = sniff_kind(body, k);

        Self::from_raw(body, k, hash_id, kind)
    }

    /// Offers a raw byte key. Hashes it, routes it to a bucket, and
    /// updates `Rsum`/`b_e`, promoting sparse to dense storage if the
    /// projected sparse size would no longer be smaller.
    pub fn offer_bytes(&mut self, bytes: &[u8]) -> Result<Offer, Error> {
        let hl = self.hash_id.bits();
        let k = self.precision.k as u32;
        let x = self.hash_id.hash(bytes);

        let j = (x >> (hl - k)) as u32;
        let r = rank(x, k, hl);

        if let Storage::Sparse(sparse) = &mut self.storage {
            if let Some(&cur) = sparse.entries.get(&j) {
                return if r > cur {
                    sparse.entries.insert(j, r);
                    self.r_sum += (r - cur) as u64;
                    Ok(Offer::Modified)
                } else {
                    Ok(Offer::Unmodified)
                };
            }

            if !sparse.should_use_dense(self.precision.d, self.precision.m, true) {
                sparse.entries.insert(j, r);
                self.r_sum += r as u64;
                self.b_e -= 1;
                return Ok(Offer::Modified);
            }

            let dense = sparse.to_dense(self.precision.m)?;
            self.storage = Storage::Dense(dense);
        }

        let dense = match &mut self.storage {
            Storage::Dense(d) => d,
            Storage::Sparse(_) => unreachable!("promoted to dense above"),
        };

        let cur = dense.get(j);
        if r > cur {
            if cur == 0 {
                self.b_e -= 1;
            }
            self.r_sum += (r - cur) as u64;
            dense.set_if_greater(j, r);
            Ok(Offer::Modified)
        } else {
            Ok(Offer::Unmodified)
        }
    }

    /// The LogLog cardinality estimate, regardless of the empty-bucket
    /// ratio (a query-only path distinct from `cardinality()`'s
    /// LC/LL switch).
    pub fn cardinality_loglog(&self) -> u64 {
        let r_avg = self.r_sum as f64 / self.precision.m as f64;
        (self.precision.ca * r_avg.exp2()).round() as u64
    }

    /// Current precision `k`.
    pub fn k(&self) -> u8 {
        self.precision.k
    }

    /// Current bucket count `m = 2^k`.
    pub fn m(&self) -> u32 {
        self.precision.m
    }

    /// `true` iff storage is currently in dense form.
    pub fn is_dense(&self) -> bool {
        self.storage.is_dense()
    }

    /// Merges `sources` into `self`, validating every source before
    /// mutating anything (strong exception safety: a failed merge leaves
    /// `self` exactly as it was). The result is dense if any source
    /// (including `self`) is dense; otherwise sparse, unless the merged
    /// sparse entry count would no longer be smaller than dense.
    pub fn merge(&mut self, sources: &[MergeSource]) -> Result<(), Error> {
        let mut parsed = Vec::with_capacity(sources.len());
        for source in sources {
            parsed.push(self.validate_and_extract(source)?);
        }

        let any_dense = self.storage.is_dense() || parsed.iter().any(Storage::is_dense);

        if any_dense {
            let mut target = DenseStorage::zeroed(self.precision.m)?;
            for j in 0..self.precision.m {
                target.set_if_greater(j, self.storage.get(j));
            }
            for source in &parsed {
                match source {
                    Storage::Dense(d) => {
                        for j in 0..self.precision.m {
                            target.set_if_greater(j, d.get(j));
                        }
                    }
                    Storage::Sparse(s) => {
                        for (&idx, &v) in s.entries.iter() {
                            target.set_if_greater(idx, v);
                        }
                    }
                }
            }
            self.replace_dense(target);
        } else {
            let mut merged: BTreeMap<u32, u8> = match &self.storage {
                Storage::Sparse(s) => s.entries.clone(),
                Storage::Dense(_) => unreachable!("any_dense already handled"),
            };
            for source in &parsed {
                if let Storage::Sparse(s) = source {
                    for (&idx, &v) in s.entries.iter() {
                        merged
                            .entry(idx)
                            .and_modify(|e| {
                                if v > *e {
                                    *e = v;
                                }
                            })
                            .or_insert(v);
                    }
                }
            }

            let sparse = SparseStorage { entries: merged };
            if sparse.should_use_dense(self.precision.d, self.precision.m, false) {
                let dense = sparse.to_dense(self.precision.m)?;
                self.replace_dense(dense);
            } else {
                self.replace_sparse(sparse);
            }
        }

        Ok(())
    }

    fn validate_and_extract(&self, source: &MergeSource) -> Result<Storage, Error> {
        match source {
            MergeSource::Sketch(other) => {
                if other.precision.k != self.precision.k || other.hash_id != self.hash_id {
                    return Err(Error::MergeFailed);
                }
                Ok(other.storage.clone())
            }
            MergeSource::Raw(buf) => Storage::parse_merge_source(
                self.precision.k,
                self.precision.d,
                self.precision.m,
                buf,
            ),
            MergeSource::Framed(buf) => {
                let (algo, hash_byte, k, body) = split_header(buf).ok_or(Error::MergeFailed)?;
                if algo != ALGO_ADAPTIVE || hash_byte != self.hash_id.to_byte() || k != self.precision.k {
                    return Err(Error::MergeFailed);
                }
                Storage::parse_merge_source(self.precision.k, self.precision.d, self.precision.m, body)
            }
        }
    }

    fn replace_dense(&mut self, dense: DenseStorage) {
        let (r_sum, b_e) = dense.indicator_sums();
        self.storage = Storage::Dense(dense);
        self.r_sum = r_sum;
        self.b_e = b_e;
    }

    fn replace_sparse(&mut self, sparse: SparseStorage) {
        let r_sum = sparse.entries.values().map(|&v| v as u64).sum();
        let b_e = self.precision.m - sparse.entries.len() as u32;
        self.storage = Storage::Sparse(sparse);
        self.r_sum = r_sum;
        self.b_e = b_e;
    }
}

impl Sketch for AdaptiveCounting {
    fn offer(&mut self, bytes: &[u8]) -> Result<Offer, Error> {
        self.offer_bytes(bytes)
    }

    /// The LC/LL switching estimate: Linear Counting above the
    /// empty-bucket threshold `B_s`, LogLog below it.
    fn cardinality(&self) -> u64 {
        let b = self.b_e as f64 / self.precision.m as f64;
        if b >= B_S {
            (-(self.precision.m as f64) * b.ln()).round() as u64
        } else {
            self.cardinality_loglog()
        }
    }

    /// Empties the sketch, preserving its storage kind: sparse collapses
    /// to its single ID byte, dense zeroes its register array.
    fn reset(&mut self) {
        match &mut self.storage {
            Storage::Sparse(s) => s.entries.clear(),
            Storage::Dense(d) => d.clear(),
        }
        self.r_sum = 0;
        self.b_e = self.precision.m;
    }

    fn to_raw(&self) -> Vec<u8> {
        self.storage.to_bytes(self.precision.k, self.precision.d)
    }

    /// `{algo=2, hash_id, k}` followed by `to_raw()`.
    fn to_framed(&self) -> Vec<u8> {
        let raw = self.to_raw();
        let mut out = Vec::with_capacity(raw.len() + 3);
        out.push(ALGO_ADAPTIVE);
        out.push(self.hash_id.to_byte());
        out.push(self.precision.k);
        out.extend_from_slice(&raw);
        out
    }
}

/// Splits a framed blob into `(algo, hash_id, k, body)`, or `None` if
/// it's shorter than the 3-byte header.
fn split_header(bytes: &[u8]) -> Option<(u8, u8, u8, &[u8])> {
    if bytes.len() < 3 {
        return None;
    }
    Some((bytes[0], bytes[1], bytes[2], &bytes[3..]))
}

/// Sniffs whether a framed blob's body is sparse or dense: high bit set
/// and low 7 bits equal to `k` means sparse, otherwise dense. Only valid
/// once the header's algorithm byte has confirmed this is an Adaptive
/// Counting blob for precision `k`.
fn sniff_kind(body: &[u8], k: u8) -> BlobKind {
    if !body.is_empty() && body[0] & 0x80 != 0 && (body[0] & 0x7f) == k {
        BlobKind::Sparse
    } else {
        BlobKind::Dense
    }
}

/// Computes `(rank)` for a hashed key `x` of bit-width `hl`, given
/// precision `k`: `1 + trailing-zero count of the low `hl - k` bits,
/// capped at `hl - k + 1`. `u64::trailing_zeros` already returns 64 for
/// an all-zero input, matching the reference `num_of_trail_zeros`'s
/// special case.
fn rank(x: u64, k: u32, hl: u32) -> u8 {
    let shift = k + 64 - hl;
    let tz = (x << shift).trailing_zeros();
    (tz as i64 - shift as i64 + 1) as u8
}
