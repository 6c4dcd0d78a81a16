//! HTTP/1.1 single-range parsing and satisfaction (spec §4.C, §8 "Boundary
//! behaviors"). Grounded on `vorce-qbz`'s `media_server::parse_range`, but
//! its suffix/start-past-end handling is more lenient than specified here
//! (it falls back to a full-content response instead of signalling
//! unsatisfiable); this version follows spec §8 exactly instead.

/// A satisfied byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// The outcome of parsing a `Range` header against a known content size.
pub enum RangeOutcome {
    /// No `Range` header, or not a `bytes=` range: serve the full body.
    Full,
    Satisfied(ByteRange),
    Unsatisfiable,
}

/// Parses a single-range `Range` header (`bytes=S-E`, `bytes=S-`, or
/// `bytes=-N`) against a resource of `size` bytes.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let header = match header {
        Some(h) => h,
        None => return RangeOutcome::Full,
    };
    let spec = match header.strip_prefix("bytes=") {
        Some(s) => s,
        None => return RangeOutcome::Full,
    };
    // Multiple comma-separated ranges are not supported; treat as full.
    if spec.contains(',') {
        return RangeOutcome::Full;
    }

    let mut parts = spec.splitn(2, '-');
    let start_str = parts.next().unwrap_or("");
    let end_str = parts.next().unwrap_or("");

    if start_str.is_empty() {
        let suffix: u64 = match end_str.parse() {
            Ok(n) => n,
            Err(_) => return RangeOutcome::Unsatisfiable,
        };
        if suffix == 0 || size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let len = suffix.min(size);
        return RangeOutcome::Satisfied(ByteRange {
            start: size - len,
            end: size - 1,
        });
    }

    let start: u64 = match start_str.parse() {
        Ok(n) => n,
        Err(_) => return RangeOutcome::Unsatisfiable,
    };
    let end: u64 = if end_str.is_empty() {
        if size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        size - 1
    } else {
        match end_str.parse() {
            Ok(n) => n,
            Err(_) => return RangeOutcome::Unsatisfiable,
        }
    };

    if start > end || start >= size || end >= size {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Satisfied(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn satisfied(outcome: RangeOutcome) -> ByteRange {
        match outcome {
            RangeOutcome::Satisfied(r) => r,
            _ => panic!("expected Satisfied"),
        }
    }

    #[test]
    fn no_header_is_full() {
        assert!(matches!(parse_range(None, 100), RangeOutcome::Full));
    }

    #[test]
    fn single_byte_range() {
        let r = satisfied(parse_range(Some("bytes=0-0"), 100));
        assert_eq!(r, ByteRange { start: 0, end: 0 });
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn suffix_range_last_n_bytes() {
        let r = satisfied(parse_range(Some("bytes=-100"), 1000));
        assert_eq!(r, ByteRange { start: 900, end: 999 });
    }

    #[test]
    fn open_ended_range_runs_to_end() {
        let r = satisfied(parse_range(Some("bytes=10-"), 100));
        assert_eq!(r, ByteRange { start: 10, end: 99 });
    }

    #[test]
    fn start_greater_than_end_is_unsatisfiable() {
        assert!(matches!(
            parse_range(Some("bytes=50-10"), 100),
            RangeOutcome::Unsatisfiable
        ));
    }

    #[test]
    fn start_past_size_is_unsatisfiable() {
        assert!(matches!(
            parse_range(Some("bytes=100-100"), 100),
            RangeOutcome::Unsatisfiable
        ));
    }

    #[test]
    fn end_one_past_last_valid_index_is_unsatisfiable() {
        // size=100, valid indices 0..=99; end=100 is out of bounds.
        assert!(matches!(
            parse_range(Some("bytes=0-100"), 100),
            RangeOutcome::Unsatisfiable
        ));
    }

    #[test]
    fn suffix_zero_is_unsatisfiable() {
        assert!(matches!(
            parse_range(Some("bytes=-0"), 100),
            RangeOutcome::Unsatisfiable
        ));
    }
}
