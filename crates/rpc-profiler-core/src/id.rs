//! Identity types for RPC profiling correlation.
//!
//! A [`ProfilingId`] packs the owning worker into the high 16 bits and a
//! per-worker counter into the low 48 bits:
//!
//! ```text
//!  63            48 47                                             0
//! +----------------+------------------------------------------------+
//! |   worker id    |                local sequence                  |
//! +----------------+------------------------------------------------+
//! ```
//!
//! The per-worker counter is seeded with `worker << 48`, so a raw
//! [`LocalId`] already carries its origin and ids from distinct workers
//! never collide without any cross-process coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProfilerError, Result};

/// Number of low-order bits reserved for the per-worker counter.
pub const LOCAL_ID_BITS: u32 = 48;

/// Mask selecting the per-worker sequence from a raw id.
pub const LOCAL_ID_MASK: u64 = (1 << LOCAL_ID_BITS) - 1;

/// Identity of one process within the distributed RPC group.
///
/// Only 16 bits remain above the local counter, so the type itself bounds
/// the worker id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u16);

impl WorkerId {
    /// Create a worker id
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw worker id value
    pub const fn get(self) -> u16 {
        self.0
    }

    /// First local id handed out by a worker with this identity
    pub const fn first_local_id(self) -> LocalId {
        LocalId((self.0 as u64) << LOCAL_ID_BITS)
    }

    fn checked(value: i128) -> Result<Self> {
        u16::try_from(value)
            .map(Self)
            .map_err(|_| ProfilerError::WorkerIdOutOfRange(value))
    }
}

impl From<u16> for WorkerId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl TryFrom<i64> for WorkerId {
    type Error = ProfilerError;

    fn try_from(value: i64) -> Result<Self> {
        Self::checked(i128::from(value))
    }
}

impl TryFrom<u64> for WorkerId {
    type Error = ProfilerError;

    fn try_from(value: u64) -> Result<Self> {
        Self::checked(i128::from(value))
    }
}

impl TryFrom<u32> for WorkerId {
    type Error = ProfilerError;

    fn try_from(value: u32) -> Result<Self> {
        Self::checked(i128::from(value))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counter value allocated by one worker's registry.
///
/// Values start pre-shifted by the worker id, so they are unique across the
/// whole group and not just within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(u64);

impl LocalId {
    /// Raw counter value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The following counter value
    pub(crate) const fn successor(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally-unique profiling identifier, the registry's key type.
///
/// Serializes as its raw `u64` so it can be embedded in request and
/// response payloads as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfilingId(u64);

impl ProfilingId {
    /// Compose an id from the creating worker and one of its local ids.
    ///
    /// Local ids are pre-shifted, so OR-ing in the worker bits again leaves
    /// a well-formed local id unchanged.
    pub const fn new(created_on: WorkerId, local_id: LocalId) -> Self {
        Self(((created_on.0 as u64) << LOCAL_ID_BITS) | local_id.0)
    }

    /// Compose an id from a worker and a position in its sequence.
    ///
    /// Fails with [`ProfilerError::InvalidId`] when `sequence` does not fit
    /// in the low 48 bits.
    pub fn from_parts(created_on: WorkerId, sequence: u64) -> Result<Self> {
        if sequence > LOCAL_ID_MASK {
            return Err(ProfilerError::InvalidId(format!(
                "sequence {sequence} does not fit in {LOCAL_ID_BITS} bits"
            )));
        }
        Ok(Self::new(created_on, LocalId(sequence)))
    }

    /// Reinterpret a raw value received over the wire
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value for embedding in payloads
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Worker that allocated this id
    pub const fn created_on(self) -> WorkerId {
        WorkerId((self.0 >> LOCAL_ID_BITS) as u16)
    }

    /// Position of this id in its worker's allocation sequence
    pub const fn sequence(self) -> u64 {
        self.0 & LOCAL_ID_MASK
    }
}

impl From<LocalId> for ProfilingId {
    fn from(local_id: LocalId) -> Self {
        Self(local_id.0)
    }
}

impl fmt::Display for ProfilingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.created_on(), self.sequence())
    }
}

impl FromStr for ProfilingId {
    type Err = ProfilerError;

    /// Accepts either `"<worker>:<sequence>"` or a bare raw decimal value.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || ProfilerError::InvalidId(s.to_string());

        match s.split_once(':') {
            Some((worker, sequence)) => {
                let worker: u16 = worker.trim().parse().map_err(|_| invalid())?;
                let sequence: u64 = sequence.trim().parse().map_err(|_| invalid())?;
                Self::from_parts(WorkerId::new(worker), sequence).map_err(|_| invalid())
            }
            None => s.parse().map(Self).map_err(|_| invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_local_id_is_pre_shifted() {
        assert_eq!(WorkerId::new(0).first_local_id().get(), 0);
        assert_eq!(WorkerId::new(3).first_local_id().get(), 3 << 48);
        assert_eq!(
            WorkerId::new(u16::MAX).first_local_id().get(),
            (u16::MAX as u64) << 48
        );
    }

    #[test]
    fn test_compose_is_idempotent_for_pre_shifted_ids() {
        let worker = WorkerId::new(3);
        let local = worker.first_local_id().successor();
        let id = ProfilingId::new(worker, local);

        assert_eq!(id, ProfilingId::from(local));
        assert_eq!(id.created_on(), worker);
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn test_worker_id_range_checks() {
        assert_eq!(WorkerId::try_from(42i64).unwrap(), WorkerId::new(42));
        assert_eq!(WorkerId::try_from(65535u64).unwrap(), WorkerId::new(u16::MAX));
        assert!(matches!(
            WorkerId::try_from(-1i64),
            Err(ProfilerError::WorkerIdOutOfRange(-1))
        ));
        assert!(matches!(
            WorkerId::try_from(65536u32),
            Err(ProfilerError::WorkerIdOutOfRange(65536))
        ));
    }

    #[test]
    fn test_display_and_parse() {
        let id = ProfilingId::new(WorkerId::new(3), LocalId(1));
        assert_eq!(id.to_string(), "3:1");
        assert_eq!("3:1".parse::<ProfilingId>().unwrap(), id);
        assert_eq!(
            id.as_u64().to_string().parse::<ProfilingId>().unwrap(),
            id
        );
    }

    #[test]
    fn test_from_parts() {
        let id = ProfilingId::from_parts(WorkerId::new(3), 7).unwrap();
        assert_eq!(id.created_on(), WorkerId::new(3));
        assert_eq!(id.sequence(), 7);
        assert_eq!(id, "3:7".parse().unwrap());

        let last = ProfilingId::from_parts(WorkerId::new(u16::MAX), LOCAL_ID_MASK).unwrap();
        assert_eq!(last.as_u64(), u64::MAX);

        assert!(matches!(
            ProfilingId::from_parts(WorkerId::new(0), 1 << 48),
            Err(ProfilerError::InvalidId(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ProfilingId>().is_err());
        assert!("abc".parse::<ProfilingId>().is_err());
        assert!("70000:1".parse::<ProfilingId>().is_err());
        assert!(format!("1:{}", 1u64 << 48).parse::<ProfilingId>().is_err());
    }

    #[test]
    fn test_serializes_as_raw_integer() {
        let id = ProfilingId::from_u64((5 << 48) | 9);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, ((5u64 << 48) | 9).to_string());

        let back: ProfilingId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn prop_distinct_workers_never_collide(
            w1 in any::<u16>(),
            w2 in any::<u16>(),
            s1 in 0u64..=LOCAL_ID_MASK,
            s2 in 0u64..=LOCAL_ID_MASK,
        ) {
            prop_assume!(w1 != w2);
            let a = ProfilingId::from(LocalId(WorkerId::new(w1).first_local_id().get() + s1));
            let b = ProfilingId::from(LocalId(WorkerId::new(w2).first_local_id().get() + s2));
            prop_assert_ne!(a, b);
        }

        #[test]
        fn prop_worker_and_sequence_are_recoverable(
            w in any::<u16>(),
            s in 0u64..=LOCAL_ID_MASK,
        ) {
            let id = ProfilingId::from(LocalId(WorkerId::new(w).first_local_id().get() + s));
            prop_assert_eq!(id.created_on(), WorkerId::new(w));
            prop_assert_eq!(id.sequence(), s);
        }
    }
}
