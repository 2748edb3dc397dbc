//! Error side-channel
//!
//! An error occupies one ring slot as a marker record (`UTIL_FLAG_ERROR`
//! set) and its full detail sits in a FIFO list beside the ring. Markers
//! and list entries are pushed and popped together under the completion
//! lock, so the marker at the ring head always pairs with the list head.

use fabric_core::domain::Version;
use fabric_core::entry::{CompletionRecord, CqErrEntry};
use fabric_core::error::{FabricError, FabricResult};

use super::CqState;

/// First API version that lets readers bound the copied `err_data`.
const ERR_DATA_SIZE_VERSION: Version = Version::new(1, 5);

impl CqState {
    /// Append `err` and commit its marker.
    pub(super) fn push_error(&mut self, mut err: CqErrEntry) -> FabricResult<()> {
        if self.ring.is_full() {
            return Err(FabricError::Overrun);
        }
        self.errors.try_reserve(1).map_err(|_| FabricError::NoMemory)?;
        err.err_data_size = err.err_data.len();
        self.errors.push_back(err);
        self.ring.push(CompletionRecord::ERROR_MARKER);
        Ok(())
    }

    /// Hand the head error record to the reader.
    ///
    /// `Again` unless the ring head is an error marker.
    pub(super) fn pop_error(&mut self, out: &mut CqErrEntry, api: Version) -> FabricResult<usize> {
        if self.ring.is_empty() || !self.ring.head().is_error() {
            return Err(FabricError::Again);
        }
        let Some(mut rec) = self.errors.pop_front() else {
            debug_assert!(false, "error marker without an error record");
            return Err(FabricError::Again);
        };
        self.ring.discard();

        if api >= ERR_DATA_SIZE_VERSION && out.err_data_size > 0 {
            let n = out.err_data_size.min(rec.err_data.len());
            rec.err_data.truncate(n);
            rec.err_data_size = n;
        }
        *out = rec;
        Ok(1)
    }

    pub(super) fn drain_errors(&mut self) -> usize {
        let n = self.errors.len();
        self.errors.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cirque::Cirque;
    use std::collections::VecDeque;

    fn state(size: usize) -> CqState {
        CqState {
            ring: Cirque::create(size).unwrap(),
            src: None,
            errors: VecDeque::new(),
            closed: false,
        }
    }

    fn record(ctx: usize, blob: &[u8]) -> CqErrEntry {
        CqErrEntry { op_context: ctx, err: 5, err_data: blob.to_vec(), ..Default::default() }
    }

    #[test]
    fn test_pairs_in_order() {
        let mut st = state(4);
        st.push_error(record(1, b"a")).unwrap();
        st.push_error(record(2, b"b")).unwrap();
        assert_eq!(st.ring.used_count(), 2);

        let mut out = CqErrEntry::default();
        assert_eq!(st.pop_error(&mut out, Version::CURRENT).unwrap(), 1);
        assert_eq!(out.op_context, 1);
        assert_eq!(st.pop_error(&mut out, Version::CURRENT).unwrap(), 1);
        assert_eq!(out.op_context, 2);
        assert!(st.ring.is_empty());
        assert!(st.pop_error(&mut out, Version::CURRENT).unwrap_err().is_again());
    }

    #[test]
    fn test_head_not_marker() {
        let mut st = state(4);
        st.ring.push(CompletionRecord { op_context: 7, ..Default::default() });
        st.push_error(record(1, b"")).unwrap();
        let mut out = CqErrEntry::default();
        assert!(st.pop_error(&mut out, Version::CURRENT).unwrap_err().is_again());
        assert_eq!(st.errors.len(), 1);
    }

    #[test]
    fn test_err_data_truncation() {
        let mut st = state(4);
        st.push_error(record(1, b"0123456789")).unwrap();
        st.push_error(record(2, b"0123456789")).unwrap();
        st.push_error(record(3, b"0123456789")).unwrap();

        let mut out = CqErrEntry { err_data_size: 4, ..Default::default() };
        st.pop_error(&mut out, Version::CURRENT).unwrap();
        assert_eq!(out.err_data, b"0123");
        assert_eq!(out.err_data_size, 4);

        // zero capacity: whole record handed over
        let mut out = CqErrEntry::default();
        st.pop_error(&mut out, Version::CURRENT).unwrap();
        assert_eq!(out.err_data.len(), 10);
        assert_eq!(out.err_data_size, 10);

        // older API ignores the declared capacity
        let mut out = CqErrEntry { err_data_size: 2, ..Default::default() };
        st.pop_error(&mut out, Version::new(1, 4)).unwrap();
        assert_eq!(out.err_data.len(), 10);
    }

    #[test]
    fn test_full_ring_overruns() {
        let mut st = state(1);
        st.push_error(record(1, b"")).unwrap();
        assert!(matches!(st.push_error(record(2, b"")), Err(FabricError::Overrun)));
        assert_eq!(st.errors.len(), 1);
        assert_eq!(st.drain_errors(), 1);
    }
}
