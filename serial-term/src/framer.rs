// Newline framing for the incoming byte stream.
//
// Serial reads hand us arbitrary chunks: a record may straddle several reads
// and one read may carry several records. `LineFramer` keeps the unterminated
// tail between calls and emits every complete record exactly once.

/// Record delimiter on the wire. `\r` is ordinary content.
pub const LINE_DELIMITER: u8 = b'\n';

/// Splits a byte stream into `\n`-terminated records.
///
/// After any call to [`LineFramer::feed`] the pending buffer holds no
/// delimiter. Trailing data without a delimiter is never flushed.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every record it completes, in arrival order.
    /// Records exclude the delimiter and may be empty.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        if chunk.is_empty() {
            return records;
        }

        // Bytes already pending were scanned on a previous call.
        let mut scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[scan_from..]
            .iter()
            .position(|&b| b == LINE_DELIMITER)
        {
            let end = scan_from + offset;
            records.push(self.pending[start..end].to_vec());
            start = end + 1;
            scan_from = start;
        }

        self.pending.drain(..start);
        records
    }

    /// The buffered partial record.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the partial record without emitting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Best-effort text decoding of a record. Invalid UTF-8 sequences become
/// U+FFFD; this never fails.
pub fn decode_record(record: &[u8]) -> String {
    String::from_utf8_lossy(record).into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed_all(framer: &mut LineFramer, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        chunks.iter().flat_map(|c| framer.feed(c)).collect()
    }

    #[test]
    fn test_empty_chunk_emits_nothing() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"").is_empty());
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_order_preserved_across_calls() {
        let mut framer = LineFramer::new();
        let records = feed_all(&mut framer, &[b"a\nb\n", b"c\n"]);
        assert_eq!(records, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_only_newlines_yield_empty_records() {
        let mut framer = LineFramer::new();
        let records = framer.feed(b"\n\n");
        assert_eq!(records, vec![Vec::<u8>::new(), Vec::new()]);
    }

    #[test]
    fn test_partial_record_spans_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"AB").is_empty());
        assert_eq!(framer.pending(), b"AB");

        assert_eq!(framer.feed(b"C\nDE"), vec![b"ABC".to_vec()]);
        assert_eq!(framer.pending(), b"DE");

        assert_eq!(framer.feed(b"F\n"), vec![b"DEF".to_vec()]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_trailing_data_not_flushed() {
        let mut framer = LineFramer::new();
        let records = feed_all(&mut framer, &[b"one\ntw", b"o"]);
        assert_eq!(records, vec![b"one".to_vec()]);
        assert_eq!(framer.pending(), b"two");
    }

    #[test]
    fn test_carriage_return_kept() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"ok\r\n"), vec![b"ok\r".to_vec()]);
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut framer = LineFramer::new();
        framer.feed(b"half");
        framer.clear();
        assert_eq!(framer.feed(b"line\n"), vec![b"line".to_vec()]);
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        assert_eq!(decode_record(b"temp=21"), "temp=21");
        assert_eq!(decode_record(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
        assert_eq!(decode_record(b""), "");
    }

    /// Split `data` at the given cut points (taken modulo its length).
    fn split_at_cuts(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        if data.is_empty() {
            return vec![Vec::new()];
        }
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        points.push(0);
        points.push(data.len());
        points.sort_unstable();
        points.dedup();
        points.windows(2).map(|w| data[w[0]..w[1]].to_vec()).collect()
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_records(
            data in prop::collection::vec(prop_oneof![Just(b'\n'), any::<u8>()], 0..256),
            cuts in prop::collection::vec(any::<usize>(), 0..16),
        ) {
            let mut framer = LineFramer::new();
            let mut records = Vec::new();
            for chunk in split_at_cuts(&data, &cuts) {
                records.extend(framer.feed(&chunk));
            }

            let mut segments: Vec<Vec<u8>> =
                data.split(|&b| b == LINE_DELIMITER).map(|s| s.to_vec()).collect();
            let tail = segments.pop().unwrap_or_default();

            let newline_count = data.iter().filter(|&&b| b == LINE_DELIMITER).count();
            prop_assert_eq!(records.len(), newline_count);
            prop_assert_eq!(records, segments);
            prop_assert_eq!(framer.pending(), tail.as_slice());
        }
    }
}
