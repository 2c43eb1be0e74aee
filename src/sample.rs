//! Sample record decoding.
//!
//! A SAMPLE record carries only the fields whose bit was negotiated into the
//! descriptor's `sample_type`, laid out in ascending bit order: instruction
//! pointer, task ids, sample id, period. An absent field shifts every later
//! offset; there are no zero-filled placeholders on the wire.
//!
//! Decoding failures are recoverable: the caller drops the record and keeps
//! consuming.

use thiserror::Error;

use crate::domain::{Pid, Tid};
use crate::events::sys;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("sample record truncated at {field} ({have} bytes left)")]
    Truncated { field: &'static str, have: usize },
}

/// One decoded observation. Each field is present iff its bit was negotiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleRecord {
    pub ip: Option<u64>,
    pub pid: Option<Pid>,
    pub tid: Option<Tid>,
    pub id: Option<u64>,
    pub period: Option<u64>,
}

struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let (bytes, rest) = self
            .data
            .split_at_checked(8)
            .ok_or(DecodeError::Truncated { field, have: self.data.len() })?;
        self.data = rest;
        Ok(u64::from_ne_bytes(bytes.try_into().unwrap()))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let (bytes, rest) = self
            .data
            .split_at_checked(4)
            .ok_or(DecodeError::Truncated { field, have: self.data.len() })?;
        self.data = rest;
        Ok(u32::from_ne_bytes(bytes.try_into().unwrap()))
    }
}

/// Decode the payload of a SAMPLE record against its negotiated layout.
pub fn parse_sample(data: &[u8], sample_type: u64) -> Result<SampleRecord, DecodeError> {
    let mut cur = Cursor { data };
    let mut sample = SampleRecord::default();

    if sample_type & sys::PERF_SAMPLE_IP != 0 {
        sample.ip = Some(cur.u64("ip")?);
    }
    if sample_type & sys::PERF_SAMPLE_TID != 0 {
        #[allow(clippy::cast_possible_wrap)]
        let pid = cur.u32("pid")? as i32;
        sample.pid = Some(Pid(pid));
        sample.tid = Some(Tid(cur.u32("tid")?));
    }
    if sample_type & sys::PERF_SAMPLE_ID != 0 {
        sample.id = Some(cur.u64("id")?);
    }
    if sample_type & sys::PERF_SAMPLE_PERIOD != 0 {
        sample.period = Some(cur.u64("period")?);
    }

    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::sys::{PERF_SAMPLE_ID, PERF_SAMPLE_IP, PERF_SAMPLE_PERIOD, PERF_SAMPLE_TID};

    fn wire(fields: &[WireField]) -> Vec<u8> {
        let mut buf = Vec::new();
        for f in fields {
            match f {
                WireField::U64(v) => buf.extend_from_slice(&v.to_ne_bytes()),
                WireField::U32(v) => buf.extend_from_slice(&v.to_ne_bytes()),
            }
        }
        buf
    }

    enum WireField {
        U64(u64),
        U32(u32),
    }
    use WireField::{U32, U64};

    #[test]
    fn decodes_full_layout() {
        let buf = wire(&[U64(0xdead_beef), U32(42), U32(43), U64(7), U64(4000)]);
        let st = PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_ID | PERF_SAMPLE_PERIOD;
        let s = parse_sample(&buf, st).unwrap();
        assert_eq!(s.ip, Some(0xdead_beef));
        assert_eq!(s.pid, Some(Pid(42)));
        assert_eq!(s.tid, Some(Tid(43)));
        assert_eq!(s.id, Some(7));
        assert_eq!(s.period, Some(4000));
    }

    #[test]
    fn absent_fields_shift_offsets() {
        // No TID negotiated: the period sits right after the ip.
        let buf = wire(&[U64(0x1000), U64(99)]);
        let s = parse_sample(&buf, PERF_SAMPLE_IP | PERF_SAMPLE_PERIOD).unwrap();
        assert_eq!(s.ip, Some(0x1000));
        assert_eq!(s.pid, None);
        assert_eq!(s.tid, None);
        assert_eq!(s.period, Some(99));
    }

    #[test]
    fn id_precedes_period_on_the_wire() {
        let buf = wire(&[U64(11), U64(22)]);
        let s = parse_sample(&buf, PERF_SAMPLE_ID | PERF_SAMPLE_PERIOD).unwrap();
        assert_eq!(s.id, Some(11));
        assert_eq!(s.period, Some(22));
    }

    #[test]
    fn every_subset_roundtrips() {
        let all = [PERF_SAMPLE_IP, PERF_SAMPLE_TID, PERF_SAMPLE_ID, PERF_SAMPLE_PERIOD];
        for mask in 0u32..16 {
            let st: u64 = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, b)| *b)
                .sum();
            let mut fields = Vec::new();
            if st & PERF_SAMPLE_IP != 0 {
                fields.push(U64(0x4242));
            }
            if st & PERF_SAMPLE_TID != 0 {
                fields.push(U32(5));
                fields.push(U32(6));
            }
            if st & PERF_SAMPLE_ID != 0 {
                fields.push(U64(77));
            }
            if st & PERF_SAMPLE_PERIOD != 0 {
                fields.push(U64(1234));
            }
            let buf = wire(&fields);
            let s = parse_sample(&buf, st).unwrap();
            assert_eq!(s.ip.is_some(), st & PERF_SAMPLE_IP != 0);
            assert_eq!(s.tid.is_some(), st & PERF_SAMPLE_TID != 0);
            assert_eq!(s.id.is_some(), st & PERF_SAMPLE_ID != 0);
            assert_eq!(s.period.is_some(), st & PERF_SAMPLE_PERIOD != 0);
        }
    }

    #[test]
    fn truncation_is_rejected_per_field() {
        let st = PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_PERIOD;
        let full = wire(&[U64(1), U32(2), U32(3), U64(4)]);
        // Chop at every byte boundary short of the full layout.
        for len in 0..full.len() {
            let err = parse_sample(&full[..len], st).unwrap_err();
            let DecodeError::Truncated { field, .. } = err;
            let expected = match len {
                0..=7 => "ip",
                8..=11 => "pid",
                12..=15 => "tid",
                _ => "period",
            };
            assert_eq!(field, expected, "truncated at {len}");
        }
        assert!(parse_sample(&full, st).is_ok());
    }

    #[test]
    fn empty_mask_accepts_empty_record() {
        let s = parse_sample(&[], 0).unwrap();
        assert_eq!(s, SampleRecord::default());
    }
}
