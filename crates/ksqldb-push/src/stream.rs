//! Stream classifier
//!
//! Turns the raw response body of a push query into typed fragments:
//! - [`LineDecoder`] splits byte chunks on `\n` (LF and CRLF)
//! - [`LineReader`] pulls chunks from the body stream and hands out complete lines
//! - [`classify`] decides whether a line is a [`Header`] or a [`Row`]
//!

use crate::error::{KsqlError, Result};
use crate::protocol::{Column, Header, Row};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::debug;

/// One classified line of the response body
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Header(Header),
    Row(Row),
}

/// Classify one line of the response body.
///
/// Blank lines yield `Ok(None)`. A JSON object is a header (or a header-shaped
/// control message without columns), a JSON array is a row. Any other JSON value
/// is a protocol violation.
pub fn classify(line: &[u8]) -> Result<Option<Fragment>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(line).map_err(|source| KsqlError::Parse {
        raw: line.to_vec(),
        source,
    })?;

    match value {
        Value::Object(object) => Ok(Some(Fragment::Header(header_from_object(&object)))),
        Value::Array(values) => Ok(Some(Fragment::Row(Row(values)))),
        _ => Err(KsqlError::Protocol { raw: line.to_vec() }),
    }
}

fn header_from_object(object: &Map<String, Value>) -> Header {
    let query_id = object.get("queryId").and_then(Value::as_str).map(str::to_string);

    let names = object.get("columnNames").and_then(Value::as_array);
    let types = object.get("columnTypes").and_then(Value::as_array);

    let columns = match (names, types) {
        (Some(names), Some(types)) if names.len() == types.len() => names
            .iter()
            .zip(types)
            .filter_map(|(name, ty)| Column::new(name.as_str()?, ty.as_str()?))
            .collect(),
        (Some(names), Some(types)) => {
            debug!(
                names = names.len(),
                types = types.len(),
                "column names and types differ in length, ignoring columns"
            );
            Vec::new()
        }
        _ => Vec::new(),
    };

    Header { query_id, columns }
}

/// Newline decoder for byte-level buffering
///
/// Handles both CRLF and LF line endings. Lines are returned without their
/// terminator and as raw bytes, so malformed input can be reported verbatim.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    // Bytes before this offset are known to contain no newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes, extracting complete lines
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let newline = search_from + offset;
            let end = if newline > start && self.buffer[newline - 1] == b'\r' {
                newline - 1
            } else {
                newline
            };
            lines.push(self.buffer[start..end].to_vec());
            start = newline + 1;
            search_from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Flush remaining buffer as final line
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Line reader over a response body stream
///
/// `next_line` is cancel-safe: a chunk is either fully buffered or not taken
/// from the stream at all, so dropping the future loses no data.
pub struct LineReader<S> {
    body: S,
    decoder: LineDecoder,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
}

impl<S> LineReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next complete line, or `None` once the body has ended cleanly.
    ///
    /// Bytes after the last newline are returned as a final line at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.decode(&chunk)),
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(KsqlError::StreamInterrupted(e));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.decoder.flush());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn header(line: &str) -> Header {
        match classify(line.as_bytes()).unwrap() {
            Some(Fragment::Header(header)) => header,
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_header() {
        let line = r#"{"queryId":"abc","columnNames":["ID","TS"],"columnTypes":["STRING","INT"]}"#;
        let header = header(line);
        assert_eq!(header.query_id.as_deref(), Some("abc"));
        assert_eq!(
            header.columns,
            vec![
                Column::new("ID", "STRING").unwrap(),
                Column::new("TS", "INT").unwrap()
            ]
        );
    }

    #[test]
    fn test_classify_header_null_query_id() {
        let line = r#"{"queryId":null,"columnNames":["W","CT"],"columnTypes":["STRING","BIGINT"]}"#;
        let header = header(line);
        assert_eq!(header.query_id, None);
        assert_eq!(header.columns.len(), 2);
    }

    #[test]
    fn test_classify_header_skips_incomplete_columns() {
        let line = r#"{"columnNames":["A","",null,"D","E"],"columnTypes":["S","X","X",7,""]}"#;
        let header = header(line);
        assert_eq!(header.columns, vec![Column::new("A", "S").unwrap()]);
    }

    #[test]
    fn test_classify_control_object_without_columns() {
        let line = r#"{"@type":"generic_error","error_code":50000,"message":"x"}"#;
        let header = header(line);
        assert_eq!(header, Header::default());
    }

    #[test]
    fn test_classify_mismatched_column_arrays() {
        let line = r#"{"queryId":"q","columnNames":["A","B"],"columnTypes":["STRING"]}"#;
        let header = header(line);
        assert_eq!(header.query_id.as_deref(), Some("q"));
        assert!(header.columns.is_empty());
    }

    #[test]
    fn test_classify_row_verbatim() {
        let line = br#"["x1", 42, 1.5, true, null, [1, 2], {"k": "v"}]"#;
        match classify(line).unwrap() {
            Some(Fragment::Row(row)) => assert_eq!(
                row.into_values(),
                vec![
                    json!("x1"),
                    json!(42),
                    json!(1.5),
                    json!(true),
                    Value::Null,
                    json!([1, 2]),
                    json!({"k": "v"})
                ]
            ),
            other => panic!("expected row, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_blank_line() {
        assert_eq!(classify(b"").unwrap(), None);
        assert_eq!(classify(b"  \r").unwrap(), None);
    }

    #[test]
    fn test_classify_malformed_json() {
        match classify(b"{\"queryId\":") {
            Err(KsqlError::Parse { raw, .. }) => assert_eq!(raw, b"{\"queryId\":".to_vec()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_scalar_is_protocol_error() {
        for line in ["\"text\"", "42", "null", "true"] {
            let result = classify(line.as_bytes());
            assert!(matches!(result, Err(KsqlError::Protocol { .. })), "{line}");
        }
    }

    #[test]
    fn test_line_decoder_lf() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.decode(b"line1\nline2\n");
        assert_eq!(lines, vec![b"line1".to_vec(), b"line2".to_vec()]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_line_decoder_crlf() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.decode(b"line1\r\nline2\r\n");
        assert_eq!(lines, vec![b"line1".to_vec(), b"line2".to_vec()]);
    }

    #[test]
    fn test_line_decoder_partial() {
        let mut decoder = LineDecoder::new();

        assert!(decoder.decode(b"[\"par").is_empty());
        assert!(decoder.decode(b"tial").is_empty());
        assert_eq!(decoder.decode(b"\"]\n[1"), vec![b"[\"partial\"]".to_vec()]);
        assert_eq!(decoder.flush(), Some(b"[1".to_vec()));
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_line_decoder_empty_lines() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.decode(b"\n\n[1]\n");
        assert_eq!(lines, vec![Vec::new(), Vec::new(), b"[1]".to_vec()]);
    }

    #[tokio::test]
    async fn test_line_reader_across_chunks() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"{\"queryId\":\"abc\"}\n[\"x")),
            Ok(Bytes::from_static(b"1\"]\n")),
            Ok(Bytes::from_static(b"[\"x2\"]")),
        ];
        let mut reader = LineReader::new(futures::stream::iter(chunks));

        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(b"{\"queryId\":\"abc\"}".to_vec())
        );
        assert_eq!(reader.next_line().await.unwrap(), Some(b"[\"x1\"]".to_vec()));
        assert_eq!(reader.next_line().await.unwrap(), Some(b"[\"x2\"]".to_vec()));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    fn column_part() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[A-Z_]{0,6}".prop_map(Value::String),
            Just(Value::Null),
            any::<i32>().prop_map(|n| json!(n)),
        ]
    }

    proptest! {
        #[test]
        fn prop_header_keeps_only_complete_columns(
            pairs in prop::collection::vec((column_part(), column_part()), 0..12)
        ) {
            let names: Vec<Value> = pairs.iter().map(|(n, _)| n.clone()).collect();
            let types: Vec<Value> = pairs.iter().map(|(_, t)| t.clone()).collect();
            let line = json!({"queryId": "q", "columnNames": names, "columnTypes": types});
            let line = line.to_string();

            let expected: Vec<Column> = pairs
                .iter()
                .filter_map(|(n, t)| match (n.as_str(), t.as_str()) {
                    (Some(n), Some(t)) if !n.is_empty() && !t.is_empty() => Column::new(n, t),
                    _ => None,
                })
                .collect();

            match classify(line.as_bytes()).unwrap() {
                Some(Fragment::Header(header)) => {
                    let complete = |c: &Column| !c.name.is_empty() && !c.column_type.is_empty();
                    prop_assert!(header.columns.iter().all(complete));
                    prop_assert_eq!(header.columns, expected);
                }
                other => prop_assert!(false, "expected header, got {:?}", other),
            }
        }

        #[test]
        fn prop_row_passes_values_through(
            values in prop::collection::vec(
                prop_oneof![
                    any::<i64>().prop_map(|n| json!(n)),
                    any::<bool>().prop_map(Value::Bool),
                    ".{0,8}".prop_map(Value::String),
                    Just(Value::Null),
                ],
                0..10,
            )
        ) {
            let line = Value::Array(values.clone()).to_string();
            match classify(line.as_bytes()).unwrap() {
                Some(Fragment::Row(row)) => prop_assert_eq!(row.into_values(), values),
                other => prop_assert!(false, "expected row, got {:?}", other),
            }
        }
    }
}
