// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn lines_round_trip() {
    let message = GearMessage::Request {
        correlation_id: "c-1".to_string(),
        action: "read".to_string(),
        parameters: serde_json::json!({"path": "/w/a.txt"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
        signature: Some("ab".repeat(32)),
    };
    let line = encode_line(&message).unwrap();
    assert!(line.ends_with('\n'));
    assert_eq!(parse_line(&line), Some(message));
}

#[test]
fn wire_type_tags() {
    let cases: Vec<(GearMessage, &str)> = vec![
        (
            GearMessage::Handshake { mode: "v1".to_string(), key: "00".to_string(), secrets: Default::default() },
            "handshake",
        ),
        (
            GearMessage::Progress { correlation_id: "c".to_string(), message: None, percent: Some(0.5) },
            "progress",
        ),
        (GearMessage::Log { level: "info".to_string(), message: "m".to_string() }, "log"),
        (
            GearMessage::Subjob { content: "x".to_string(), metadata: Default::default() },
            "subjob",
        ),
        (
            GearMessage::Command {
                request_id: "r".to_string(),
                command: "journal.query".to_string(),
                parameters: Default::default(),
            },
            "command",
        ),
    ];
    for (message, tag) in cases {
        assert_eq!(message.tag(), tag);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], tag);
    }
}

#[test]
fn non_json_lines_are_discarded() {
    assert_eq!(parse_line("not json at all"), None);
    assert_eq!(parse_line(""), None);
    assert_eq!(parse_line("   \n"), None);
    assert_eq!(parse_line("{\"type\": \"mystery\"}"), None);
}

#[test]
fn oversized_lines_are_discarded() {
    let huge = format!(
        "{{\"type\":\"log\",\"level\":\"info\",\"message\":\"{}\"}}",
        "x".repeat(MAX_LINE_BYTES)
    );
    assert_eq!(parse_line(&huge), None);
}

#[tokio::test]
async fn bounded_reader_yields_lines_then_eof() {
    let data: &[u8] = b"{\"type\":\"log\",\"level\":\"info\",\"message\":\"hi\"}\nplain\n";
    let mut reader = tokio::io::BufReader::new(data);
    let mut buf = Vec::new();

    let first = read_wire_line(&mut reader, &mut buf).await.unwrap();
    assert!(matches!(first, WireLine::Line(ref line) if parse_line(line).is_some()));
    assert_eq!(
        read_wire_line(&mut reader, &mut buf).await.unwrap(),
        WireLine::Line("plain".to_string())
    );
    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Eof);
}

#[tokio::test]
async fn bounded_reader_drops_oversized_line_and_recovers() {
    let mut data = vec![b'x'; MAX_LINE_BYTES + 10];
    data.push(b'\n');
    data.extend_from_slice(b"after\n");
    let mut reader = tokio::io::BufReader::new(&data[..]);
    let mut buf = Vec::new();

    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Oversized);
    // The accumulator never held more than the bound
    assert!(buf.len() <= MAX_LINE_BYTES);
    // The stream resynchronizes on the next line
    assert_eq!(
        read_wire_line(&mut reader, &mut buf).await.unwrap(),
        WireLine::Line("after".to_string())
    );
    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Eof);
}

#[tokio::test]
async fn bounded_reader_rejects_an_unterminated_flood() {
    // No newline anywhere: the read must settle as oversized without
    // materializing the stream.
    let data = vec![b'x'; MAX_LINE_BYTES + 4_096];
    let mut reader = tokio::io::BufReader::new(&data[..]);
    let mut buf = Vec::new();

    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Oversized);
    assert!(buf.len() <= MAX_LINE_BYTES);
    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Eof);
}

#[tokio::test]
async fn bounded_reader_accepts_a_line_at_the_bound() {
    let mut data = vec![b'y'; MAX_LINE_BYTES];
    data.push(b'\n');
    let mut reader = tokio::io::BufReader::new(&data[..]);
    let mut buf = Vec::new();

    match read_wire_line(&mut reader, &mut buf).await.unwrap() {
        WireLine::Line(line) => assert_eq!(line.len(), MAX_LINE_BYTES),
        other => panic!("expected a full line, got {other:?}"),
    }
}

#[tokio::test]
async fn bounded_reader_returns_final_unterminated_line() {
    let data: &[u8] = b"no trailing newline";
    let mut reader = tokio::io::BufReader::new(data);
    let mut buf = Vec::new();
    assert_eq!(
        read_wire_line(&mut reader, &mut buf).await.unwrap(),
        WireLine::Line("no trailing newline".to_string())
    );
    assert_eq!(read_wire_line(&mut reader, &mut buf).await.unwrap(), WireLine::Eof);
}

#[test]
fn signing_payload_excludes_signature() {
    let with_sig = GearMessage::Response {
        correlation_id: "c-1".to_string(),
        result: Some(serde_json::json!({"ok": true})),
        error: None,
        signature: Some("ff".repeat(32)),
    };
    let without_sig = GearMessage::Response {
        correlation_id: "c-1".to_string(),
        result: Some(serde_json::json!({"ok": true})),
        error: None,
        signature: None,
    };
    assert_eq!(signing_payload(&with_sig).unwrap(), signing_payload(&without_sig).unwrap());
}

#[test]
fn signing_payload_is_canonical() {
    // Key order in the source object must not matter.
    let a: GearMessage =
        serde_json::from_str("{\"type\":\"response\",\"correlation_id\":\"c\",\"result\":{\"b\":1,\"a\":2}}")
            .unwrap();
    let b: GearMessage =
        serde_json::from_str("{\"type\":\"response\",\"result\":{\"a\":2,\"b\":1},\"correlation_id\":\"c\"}")
            .unwrap();
    assert_eq!(signing_payload(&a).unwrap(), signing_payload(&b).unwrap());
}
