//! End-to-end loopback tests
//!
//! Each test runs a frame-level HTTP/2 server on a TcpListener thread,
//! scripted with the crate's own codec, and drives the client against it.
//! The server side asserts on the exact bytes and frames the client emits,
//! starting with the 24-octet preface.

use bytes::Bytes;
use h2wire::codec::FrameCodec;
use h2wire::error::{Error, ErrorCode};
use h2wire::frames::*;
use h2wire::hpack::{HeaderField, HpackDecoder, HpackEncoder};
use h2wire::session::{FdSessionOps, SessionOps};
use h2wire::settings::{Settings, SettingsBuilder};
use h2wire::{dial, CONNECTION_PREFACE};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

const SERVER_MAX_FRAME: usize = 16_777_215;

fn read_frame(session: &mut FdSessionOps) -> Frame {
    FrameCodec::read_frame(session, SERVER_MAX_FRAME).expect("server failed to read frame")
}

/// Read frames until one that is not a SETTINGS ACK arrives; the client's
/// ACK of our SETTINGS may interleave anywhere early in the conversation.
fn read_frame_skip_acks(session: &mut FdSessionOps) -> Frame {
    loop {
        match read_frame(session) {
            Frame::Settings(s) if s.ack => continue,
            frame => return frame,
        }
    }
}

/// Accept a connection and perform the server side of the bring-up:
/// verify the preface literal, consume the client's SETTINGS, announce our
/// own parameters and acknowledge theirs.
fn accept_h2(listener: &TcpListener, server_settings: Settings) -> FdSessionOps {
    let (stream, _) = listener.accept().unwrap();
    let mut session = FdSessionOps::new(stream);

    let mut preface = [0u8; 24];
    session.read_exact(&mut preface).unwrap();
    assert_eq!(&preface, CONNECTION_PREFACE, "client preface mismatch");

    match read_frame(&mut session) {
        Frame::Settings(s) => assert!(!s.ack, "client must not lead with a SETTINGS ACK"),
        other => panic!("expected client SETTINGS, got {:?}", other),
    }

    session
        .write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::new(
            server_settings,
        )))
        .unwrap();
    session
        .write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))
        .unwrap();

    session
}

/// Send a complete response: one HEADERS frame and one DATA frame.
fn respond(session: &mut FdSessionOps, stream_id: u32, status: &str, body: &[u8]) {
    let encoder = HpackEncoder::new();
    let block = encoder.encode(&[
        HeaderField::new(b":status".as_slice(), status),
        HeaderField::new(b"content-type".as_slice(), b"text/plain".as_slice()),
    ]);

    let headers = HeadersFrame::new(stream_id, Bytes::from(block), false, true);
    session
        .write_all(&FrameCodec::encode_headers_frame(&headers))
        .unwrap();

    let data = DataFrame::new(stream_id, Bytes::copy_from_slice(body), true);
    session
        .write_all(&FrameCodec::encode_data_frame(&data))
        .unwrap();
}

#[test]
fn test_get_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        let headers = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        assert_eq!(headers.stream_id, 1);
        assert!(headers.end_stream, "GET carries END_STREAM");
        assert!(headers.end_headers);

        let mut decoder = HpackDecoder::new(4096);
        let fields = decoder.decode(&headers.header_block).unwrap();
        assert_eq!(
            fields[0],
            HeaderField::new(b":method".as_slice(), b"GET".as_slice())
        );
        assert_eq!(
            fields[1],
            HeaderField::new(b":scheme".as_slice(), b"http".as_slice())
        );
        assert_eq!(
            fields[2],
            HeaderField::new(b":path".as_slice(), b"/".as_slice())
        );

        respond(&mut session, 1, "200", b"OK");
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    // Argument errors are reported before any wire action.
    assert!(matches!(
        conn.request("", "/", &[]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        conn.request("GET", "", &[]),
        Err(Error::InvalidArgument(_))
    ));

    let response = conn.get("/").unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.header(":status"), Some("200"));
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.body(), b"OK");

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_response_headers_with_continuation() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        let headers = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        let stream_id = headers.stream_id;

        // Split the response header block across HEADERS + CONTINUATION.
        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[
            HeaderField::new(b":status".as_slice(), b"200".as_slice()),
            HeaderField::new(b"x-filler".as_slice(), b"split across two frames".as_slice()),
        ]);
        let mid = block.len() / 2;

        let head = HeadersFrame::new(stream_id, Bytes::copy_from_slice(&block[..mid]), false, false);
        session
            .write_all(&FrameCodec::encode_headers_frame(&head))
            .unwrap();
        let tail = ContinuationFrame {
            stream_id,
            header_block: Bytes::copy_from_slice(&block[mid..]),
            end_headers: true,
        };
        session
            .write_all(&FrameCodec::encode_continuation_frame(&tail))
            .unwrap();

        let data = DataFrame::new(stream_id, Bytes::from_static(b"done"), true);
        session
            .write_all(&FrameCodec::encode_data_frame(&data))
            .unwrap();
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    let response = conn.get("/split").unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.header("x-filler"), Some("split across two frames"));
    assert_eq!(response.body(), b"done");

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_large_request_headers_fragmented() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // A header value bigger than the default max frame size forces the
    // client to fragment the block into HEADERS + CONTINUATION frames.
    let big_value: String = "v".repeat(20_000);
    let expected = big_value.clone();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        let headers = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        assert!(!headers.end_headers, "oversized block must be fragmented");
        assert!(headers.header_block.len() <= 16384);

        let mut block = headers.header_block.to_vec();
        loop {
            match read_frame(&mut session) {
                Frame::Continuation(c) => {
                    assert_eq!(c.stream_id, headers.stream_id);
                    assert!(c.header_block.len() <= 16384);
                    block.extend_from_slice(&c.header_block);
                    if c.end_headers {
                        break;
                    }
                }
                Frame::Settings(s) if s.ack => continue,
                other => panic!("expected CONTINUATION, got {:?}", other),
            }
        }

        let mut decoder = HpackDecoder::new(4096);
        let fields = decoder.decode(&block).unwrap();
        let huge = fields
            .iter()
            .find(|f| f.name == b"x-huge")
            .expect("x-huge header present");
        assert_eq!(huge.value, expected.as_bytes());

        respond(&mut session, headers.stream_id, "200", b"ok");
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    let response = conn
        .request("GET", "/", &[("x-huge", big_value.as_str())])
        .unwrap();
    assert_eq!(response.status(), 200);

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_stream_reset_leaves_connection_usable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        // Refuse the first request.
        let first = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        assert_eq!(first.stream_id, 1);
        let rst = RstStreamFrame {
            stream_id: 1,
            error_code: ErrorCode::RefusedStream,
        };
        session
            .write_all(&FrameCodec::encode_rst_stream_frame(&rst))
            .unwrap();

        // Serve the second.
        let second = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        assert_eq!(second.stream_id, 3, "stream ids keep increasing");
        respond(&mut session, 3, "200", b"second");
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    let err = conn.get("/first").unwrap_err();
    assert!(matches!(
        err,
        Error::StreamReset(1, ErrorCode::RefusedStream)
    ));

    // The reset failed one request; the connection survives.
    let response = conn.get("/second").unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), b"second");

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_window_updates_for_large_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    const BODY_LEN: usize = 70_000;

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        let headers = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        let stream_id = headers.stream_id;

        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[HeaderField::new(b":status".as_slice(), b"200".as_slice())]);
        let head = HeadersFrame::new(stream_id, Bytes::from(block), false, true);
        session
            .write_all(&FrameCodec::encode_headers_frame(&head))
            .unwrap();

        // More than one 65535-octet window's worth of DATA.
        let body = vec![b'x'; BODY_LEN];
        for (i, chunk) in body.chunks(16384).enumerate() {
            let end_stream = (i + 1) * 16384 >= BODY_LEN;
            let data = DataFrame::new(stream_id, Bytes::copy_from_slice(chunk), end_stream);
            session
                .write_all(&FrameCodec::encode_data_frame(&data))
                .unwrap();
        }

        // Both receive windows deplete exactly once: the client owes one
        // connection-scoped and one stream-scoped WINDOW_UPDATE.
        let mut updates = Vec::new();
        while updates.len() < 2 {
            match read_frame(&mut session) {
                Frame::WindowUpdate(w) => updates.push((w.stream_id, w.size_increment)),
                Frame::Settings(s) if s.ack => continue,
                other => panic!("expected WINDOW_UPDATE, got {:?}", other),
            }
        }
        updates.sort();
        assert_eq!(updates, vec![(0, 65535), (stream_id, 65535)]);
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    let response = conn.get("/big").unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body().len(), BODY_LEN);
    assert!(response.body().iter().all(|&b| b == b'x'));

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_ping_both_directions() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        // Our PING: the client's settings handler must answer with an ACK
        // carrying the same opaque payload.
        let ping = PingFrame::new([1, 2, 3, 4, 5, 6, 7, 8]);
        session
            .write_all(&FrameCodec::encode_ping_frame(&ping))
            .unwrap();

        let mut got_ack = false;
        let mut got_client_ping = false;
        while !(got_ack && got_client_ping) {
            match read_frame(&mut session) {
                Frame::Settings(s) if s.ack => continue,
                Frame::Ping(p) if p.ack => {
                    assert_eq!(p.data, [1, 2, 3, 4, 5, 6, 7, 8]);
                    got_ack = true;
                }
                Frame::Ping(p) => {
                    assert_eq!(p.data, *b"h2wire!!");
                    session
                        .write_all(&FrameCodec::encode_ping_frame(&PingFrame::ack(p.data)))
                        .unwrap();
                    got_client_ping = true;
                }
                other => panic!("expected PING traffic, got {:?}", other),
            }
        }
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();
    conn.ping(*b"h2wire!!").unwrap();

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_peer_initial_window_size_caps_request_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server_settings = SettingsBuilder::new()
        .initial_window_size(1024)
        .max_concurrent_streams(10)
        .build()
        .unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, server_settings);

        // The body exceeds the 1024-octet stream send window: the client
        // opens the stream, cannot send DATA, and abandons it.
        let headers = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        assert_eq!(headers.stream_id, 1);
        assert!(!headers.end_stream, "a request with a body keeps the stream open");

        match read_frame_skip_acks(&mut session) {
            Frame::RstStream(rst) => {
                assert_eq!(rst.stream_id, 1);
                assert_eq!(rst.error_code, ErrorCode::Cancel);
            }
            other => panic!("expected RST_STREAM, got {:?}", other),
        }

        // A body-less request still goes through.
        let second = match read_frame_skip_acks(&mut session) {
            Frame::Headers(h) => h,
            other => panic!("expected HEADERS, got {:?}", other),
        };
        respond(&mut session, second.stream_id, "200", b"ok");
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    // Wait for the peer's SETTINGS to be applied by the handler thread.
    let deadline = Instant::now() + Duration::from_secs(2);
    while conn.peer_settings().initial_window_size != Some(1024) {
        assert!(Instant::now() < deadline, "peer SETTINGS never applied");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(conn.peer_settings().max_concurrent_streams, Some(10));

    let err = conn
        .request_with_body("POST", "/upload", &[], Bytes::from(vec![0u8; 2000]))
        .unwrap_err();
    assert!(matches!(err, Error::SendWindowExhausted(1)));

    let response = conn.get("/").unwrap();
    assert_eq!(response.status(), 200);

    server.join().unwrap();
    conn.close();
}

#[test]
fn test_goaway_fails_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut session = accept_h2(&listener, Settings::new());

        let goaway = GoawayFrame::new(0, ErrorCode::NoError, Bytes::from_static(b"bye"));
        session
            .write_all(&FrameCodec::encode_goaway_frame(&goaway))
            .unwrap();

        // Drain whatever the client still sends until it hangs up.
        while FrameCodec::read_frame(&mut session, SERVER_MAX_FRAME).is_ok() {}
    });

    let mut conn = dial(addr).unwrap();
    conn.start().unwrap();

    // The settings handler tears the connection down on GOAWAY; every
    // subsequent operation reports the closure.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if conn.ping(*b"00000000").is_err() {
            break;
        }
        assert!(Instant::now() < deadline, "connection never closed");
        thread::sleep(Duration::from_millis(5));
    }

    assert!(matches!(
        conn.get("/"),
        Err(Error::ConnectionClosed)
    ));

    server.join().unwrap();
    conn.close();
}
