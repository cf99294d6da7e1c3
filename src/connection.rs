//! HTTP/2 connection engine
//!
//! Bring-up (RFC 7540 Section 3.5): the client writes the 24-octet preface
//! and a SETTINGS frame before anything else, then two background threads
//! take over. The reader thread parses frames off the transport, performs
//! connection-level flow accounting, reassembles and HPACK-decodes header
//! blocks, and dispatches events onto per-stream queues. The settings
//! handler consumes stream 0's queue: it applies peer SETTINGS (answering
//! with an ACK), answers PINGs, credits the connection send window from
//! WINDOW_UPDATE, and tears the connection down on GOAWAY.
//!
//! Requester threads block on their stream's queue. The transport is
//! serialized by a mutex; the reader only takes it while a frame is
//! actually readable, so writers are not starved while the connection is
//! idle. Locks are never held across each other.

use crate::codec::FrameCodec;
use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::FlowControlWindow;
use crate::frames::{
    ContinuationFrame, DataFrame, Frame, GoawayFrame, HeadersFrame, PingFrame, RstStreamFrame,
    SettingsFrame, WindowUpdateFrame,
};
use crate::hpack::{HeaderField, HpackDecoder, HpackEncoder};
use crate::session::{poll_fd, shutdown_fd, FdSessionOps, PollEvents, SessionOps};
use crate::settings::Settings;
use crate::stream::{StreamEvent, StreamId, StreamRegistry};
use crate::tls::{TlsConfig, TlsSessionOps};
use crate::CONNECTION_PREFACE;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the reader waits in poll(2) before rechecking the closed flag.
const READER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Open a cleartext HTTP/2 connection (prior knowledge, scheme `http`).
pub fn dial(addr: impl ToSocketAddrs) -> Result<Connection<FdSessionOps>> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    Ok(Connection::new(FdSessionOps::new(stream), "http"))
}

/// Open an HTTP/2 connection over TLS (scheme `https`).
///
/// ALPN must settle on `h2`; anything else fails before any HTTP/2 bytes
/// are written.
pub fn dial_tls(addr: impl ToSocketAddrs) -> Result<Connection<TlsSessionOps>> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;

    let config = TlsConfig::client().build()?;
    let session = config.connect(stream)?;
    if !session.is_h2() {
        return Err(Error::AlpnFailed(session.negotiated_alpn()));
    }

    Ok(Connection::new(session, "https"))
}

/// An HTTP/2 response
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code from the `:status` pseudo-header
    pub status: u16,
    /// Response headers, lowercase names, in a multimap
    pub headers: HashMap<String, Vec<String>>,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Get status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the first value of a header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Get body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get body as string
    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Internal(format!("invalid UTF-8 in body: {}", e)))
    }
}

/// State shared between the connection handle and its background threads.
struct Shared<S: SessionOps> {
    /// The transport. Reads and writes are serialized through this lock.
    io: Mutex<S>,
    /// Raw descriptor for lock-free readiness polling and shutdown.
    fd: RawFd,
    /// `http` or `https`, for the `:scheme` pseudo-header.
    scheme: &'static str,
    /// Stream registry: states, send windows, inbound queues.
    streams: Mutex<StreamRegistry>,
    /// Our own SETTINGS preferences, fixed at start().
    local_settings: Mutex<Settings>,
    /// Parameters the peer has declared via SETTINGS.
    peer_settings: Mutex<Settings>,
    /// HPACK decoder for inbound header blocks (reader-ordered).
    decoder: Mutex<HpackDecoder>,
    /// HPACK encoder for outbound header blocks.
    encoder: Mutex<HpackEncoder>,
    /// Connection-level send window, credited by WINDOW_UPDATE on stream 0.
    conn_send_window: Mutex<FlowControlWindow>,
    closed: AtomicBool,
    started: AtomicBool,
}

impl<S: SessionOps> Shared<S> {
    fn write_frame(&self, frame: &Frame) -> Result<()> {
        log::debug!("send {} on stream {}", frame.type_name(), frame.stream_id());
        let bytes = FrameCodec::encode(frame);
        self.io.lock().unwrap().write_all(&bytes)
    }

    /// Terminate the connection: best-effort GOAWAY, socket shutdown, and
    /// waking every requester with a connection-closed error.
    fn fail(&self, err: &Error) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::warn!("connection failed: {}", err);

        if err.is_connection_error() {
            let code = err.error_code();
            let last = {
                let streams = self.streams.lock().unwrap();
                streams.peek_next_stream_id().saturating_sub(2)
            };
            let goaway = Frame::Goaway(GoawayFrame::new(
                last,
                code,
                Bytes::from(err.to_string()),
            ));
            // Strictly best-effort: if the reader is parked inside a
            // blocking read it holds the transport lock, and waiting here
            // would stall the teardown that unblocks it.
            if let Ok(mut io) = self.io.try_lock() {
                let _ = io.write_all(&FrameCodec::encode(&goaway));
            }
        }

        shutdown_fd(self.fd);
        self.streams.lock().unwrap().close_all();
    }
}

/// A client HTTP/2 connection.
///
/// Safe to share across threads: [`Connection::request`] takes `&self` and
/// any number of requests may be in flight concurrently.
pub struct Connection<S: SessionOps + 'static> {
    shared: Arc<Shared<S>>,
    /// Stream 0's queue, handed to the settings thread at start().
    control_rx: Mutex<Option<Receiver<StreamEvent>>>,
    reader: Option<JoinHandle<()>>,
    settings_task: Option<JoinHandle<()>>,
}

impl<S: SessionOps + 'static> Connection<S> {
    /// Wrap an established transport. No bytes are written until
    /// [`Connection::start`].
    pub fn new(session: S, scheme: &'static str) -> Self {
        let fd = session.raw_fd();
        let (registry, control_rx) = StreamRegistry::new();

        let shared = Arc::new(Shared {
            io: Mutex::new(session),
            fd,
            scheme,
            streams: Mutex::new(registry),
            local_settings: Mutex::new(Settings::new()),
            peer_settings: Mutex::new(Settings::new()),
            decoder: Mutex::new(HpackDecoder::default()),
            encoder: Mutex::new(HpackEncoder::new()),
            conn_send_window: Mutex::new(FlowControlWindow::new()),
            closed: AtomicBool::new(false),
            started: AtomicBool::new(false),
        });

        Connection {
            shared,
            control_rx: Mutex::new(Some(control_rx)),
            reader: None,
            settings_task: None,
        }
    }

    /// Replace the SETTINGS preferences announced at bring-up. By default
    /// an empty SETTINGS frame is sent and RFC defaults apply.
    pub fn set_local_settings(&self, settings: Settings) -> Result<()> {
        if self.shared.started.load(Ordering::SeqCst) {
            return Err(Error::Protocol(
                "local settings must be set before start".to_string(),
            ));
        }
        settings.validate()?;
        *self.shared.local_settings.lock().unwrap() = settings;
        Ok(())
    }

    /// The parameters the peer has declared so far
    pub fn peer_settings(&self) -> Settings {
        self.shared.peer_settings.lock().unwrap().clone()
    }

    /// Perform the HTTP/2 bring-up and launch the background threads.
    ///
    /// Writes the 24-octet client preface followed by our SETTINGS frame;
    /// both precede any other write on the connection.
    pub fn start(&mut self) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let local = self.shared.local_settings.lock().unwrap().clone();
        {
            let mut io = self.shared.io.lock().unwrap();
            io.write_all(CONNECTION_PREFACE)?;
            let settings = FrameCodec::encode_settings_frame(&SettingsFrame::new(local.clone()));
            io.write_all(&settings)?;
        }
        log::debug!("sent preface and SETTINGS");

        let shared = Arc::clone(&self.shared);
        self.reader = Some(std::thread::spawn(move || {
            Reader::new(shared, local).run();
        }));

        let control_rx = self
            .control_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::Internal("connection already started".to_string()))?;
        let shared = Arc::clone(&self.shared);
        self.settings_task = Some(std::thread::spawn(move || {
            run_settings_handler(shared, control_rx);
        }));

        Ok(())
    }

    /// Send a GET request
    pub fn get(&self, path: &str) -> Result<Response> {
        self.request("GET", path, &[])
    }

    /// Send a request without a body
    pub fn request(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> Result<Response> {
        self.send_request(method, path, headers, None)
    }

    /// Send a request with a body (DATA frames, chunked to the peer's
    /// maximum frame size, debiting the send-side flow control windows)
    pub fn request_with_body(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<Response> {
        self.send_request(method, path, headers, Some(body))
    }

    /// Send a PING with the given opaque payload. The peer's ACK is
    /// consumed by the settings handler.
    pub fn ping(&self, payload: [u8; 8]) -> Result<()> {
        self.check_usable()?;
        self.shared.write_frame(&Frame::Ping(PingFrame::new(payload)))
    }

    /// Tear down the transport and background threads. All in-flight
    /// requests fail with a connection-closed error.
    pub fn close(&mut self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            shutdown_fd(self.shared.fd);
            self.shared.streams.lock().unwrap().close_all();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.settings_task.take() {
            let _ = handle.join();
        }
    }

    fn check_usable(&self) -> Result<()> {
        if !self.shared.started.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn send_request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<Response> {
        self.check_usable()?;
        if method.is_empty() {
            return Err(Error::InvalidArgument("empty method".to_string()));
        }
        if path.is_empty() {
            return Err(Error::InvalidArgument("empty path".to_string()));
        }

        let shared = &self.shared;
        let (initial_send_window, max_frame_size) = {
            let peer = shared.peer_settings.lock().unwrap();
            (
                peer.get_initial_window_size(),
                peer.get_max_frame_size() as usize,
            )
        };

        let (stream_id, rx) = shared
            .streams
            .lock()
            .unwrap()
            .allocate(initial_send_window)?;

        // Pseudo-headers first, then the caller's fields.
        let mut fields = Vec::with_capacity(3 + headers.len());
        fields.push(HeaderField::new(b":method".as_slice(), method));
        fields.push(HeaderField::new(b":scheme".as_slice(), shared.scheme));
        fields.push(HeaderField::new(b":path".as_slice(), path));
        for (name, value) in headers {
            fields.push(HeaderField::new(name.to_lowercase(), *value));
        }

        let block = shared.encoder.lock().unwrap().encode(&fields);

        let has_body = body.as_ref().is_some_and(|b| !b.is_empty());
        let end_stream = !has_body;

        // idle -> open, or idle -> halfClosedLocal when there is no body.
        {
            let mut streams = shared.streams.lock().unwrap();
            let entry = streams.get_mut(stream_id).ok_or(Error::ConnectionClosed)?;
            entry.send_headers(end_stream)?;
        }

        let result = self
            .write_header_block(stream_id, Bytes::from(block), end_stream, max_frame_size)
            .and_then(|()| match body {
                Some(body) if has_body => self.send_body(stream_id, body, max_frame_size),
                _ => Ok(()),
            })
            .and_then(|()| self.recv_response(stream_id, &rx));

        // The registry entry is dropped whether the request succeeded or
        // not; the reader ignores late frames for unknown streams.
        shared.streams.lock().unwrap().remove(stream_id);

        match &result {
            // Connection-scoped errors fail every request and close the
            // transport (GOAWAY is emitted on the way down).
            Err(err) if err.is_connection_error() => shared.fail(err),
            // The peer already reset this stream; nothing more to say.
            Err(Error::StreamReset(_, _)) => {}
            // Abandoning the stream for a stream-scoped reason: tell the
            // peer we are done with it.
            Err(_) => {
                let _ = shared.write_frame(&Frame::RstStream(RstStreamFrame {
                    stream_id,
                    error_code: ErrorCode::Cancel,
                }));
            }
            Ok(_) => {}
        }

        result
    }

    /// Write the HEADERS frame, fragmenting into CONTINUATION frames when
    /// the block exceeds the peer's maximum frame size. The fragments are
    /// written under one transport lock so no other frame can interleave
    /// with an unterminated header block.
    fn write_header_block(
        &self,
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        max_frame_size: usize,
    ) -> Result<()> {
        let shared = &self.shared;

        if block.len() <= max_frame_size {
            let frame = Frame::Headers(HeadersFrame::new(stream_id, block, end_stream, true));
            return shared.write_frame(&frame);
        }

        log::debug!(
            "fragmenting {} byte header block for stream {}",
            block.len(),
            stream_id
        );
        let mut io = shared.io.lock().unwrap();

        let first = block.slice(0..max_frame_size);
        let head = Frame::Headers(HeadersFrame::new(stream_id, first, end_stream, false));
        io.write_all(&FrameCodec::encode(&head))?;

        let mut offset = max_frame_size;
        while offset < block.len() {
            let end = (offset + max_frame_size).min(block.len());
            let cont = Frame::Continuation(ContinuationFrame {
                stream_id,
                header_block: block.slice(offset..end),
                end_headers: end == block.len(),
            });
            io.write_all(&FrameCodec::encode(&cont))?;
            offset = end;
        }

        Ok(())
    }

    /// Send the request body as DATA frames. Each frame debits the
    /// connection and stream send windows before transmission; an exhausted
    /// window is surfaced as a flow-control error rather than blocking.
    fn send_body(&self, stream_id: StreamId, body: Bytes, max_frame_size: usize) -> Result<()> {
        let shared = &self.shared;
        let mut offset = 0;

        while offset < body.len() {
            let end = (offset + max_frame_size).min(body.len());
            let chunk = body.slice(offset..end);
            let end_stream = end == body.len();

            {
                // Both windows are checked before either is debited. The
                // connection window lock is always taken before the
                // registry lock, never the other way around.
                let mut conn_window = shared.conn_send_window.lock().unwrap();
                let mut streams = shared.streams.lock().unwrap();
                let entry = streams.get_mut(stream_id).ok_or(Error::ConnectionClosed)?;

                if !conn_window.can_send(chunk.len()) {
                    return Err(Error::SendWindowExhausted(0));
                }
                if !entry.send_window_mut().can_send(chunk.len()) {
                    return Err(Error::SendWindowExhausted(stream_id));
                }
                conn_window.consume(chunk.len());
                entry.send_window_mut().consume(chunk.len());
                entry.send_data(end_stream)?;
            }

            shared.write_frame(&Frame::Data(DataFrame::new(stream_id, chunk, end_stream)))?;
            offset = end;
        }

        Ok(())
    }

    /// Pull events off the stream queue until END_STREAM.
    ///
    /// Two sub-states: headers are merged into the response multimap until
    /// the first header block completes, then DATA accumulates into the
    /// body, debiting the stream-level receive window and emitting
    /// stream-scoped WINDOW_UPDATE when it runs dry. A later header block
    /// (trailers) merges into the same map.
    fn recv_response(&self, stream_id: StreamId, rx: &Receiver<StreamEvent>) -> Result<Response> {
        let shared = &self.shared;

        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        let mut status: u16 = 0;
        let mut body = BytesMut::new();
        let mut reading_headers = true;
        let initial_window = shared.local_settings.lock().unwrap().get_initial_window_size();
        let mut recv_window = FlowControlWindow::with_initial_size(initial_window);

        loop {
            let event = rx.recv().map_err(|_| Error::ConnectionClosed)?;
            match event {
                StreamEvent::Headers { fields, end_stream } => {
                    for field in fields {
                        let name = String::from_utf8_lossy(&field.name).into_owned();
                        let value = String::from_utf8_lossy(&field.value).into_owned();
                        if name == ":status" {
                            status = value.parse().unwrap_or(0);
                        }
                        headers.entry(name).or_default().push(value);
                    }
                    reading_headers = false;
                    if end_stream {
                        break;
                    }
                }
                StreamEvent::Data {
                    data,
                    flow_len,
                    end_stream,
                } => {
                    if reading_headers {
                        return Err(Error::Protocol(format!(
                            "stream {}: DATA before response headers",
                            stream_id
                        )));
                    }
                    recv_window.decrease(flow_len);
                    if let Some(increment) = recv_window.replenish() {
                        shared.write_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(
                            stream_id, increment,
                        )))?;
                    }
                    body.extend_from_slice(&data);
                    if end_stream {
                        break;
                    }
                }
                StreamEvent::Reset { error_code } => {
                    return Err(Error::StreamReset(stream_id, error_code));
                }
                StreamEvent::Control(frame) => {
                    // Connection-scoped frames only ever go to stream 0.
                    log::warn!(
                        "stream {}: unexpected {} event",
                        stream_id,
                        frame.type_name()
                    );
                }
            }
        }

        Ok(Response {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

impl<S: SessionOps + 'static> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// An in-progress header block: HEADERS (or PUSH_PROMISE) arrived without
/// END_HEADERS and CONTINUATION frames are still due.
struct HeaderAssembly {
    stream_id: StreamId,
    fragment: Vec<u8>,
    end_stream: bool,
    /// Block belongs to a pushed stream: decode for table consistency,
    /// discard the fields.
    discard: bool,
}

/// The reader: parses frames off the transport in a loop, does
/// connection-level flow accounting, decodes header blocks in wire order,
/// and dispatches to stream queues. Sole producer into the queues.
struct Reader<S: SessionOps> {
    shared: Arc<Shared<S>>,
    /// Connection-level receive window (reader-owned, no lock needed).
    recv_window: FlowControlWindow,
    assembly: Option<HeaderAssembly>,
    max_frame_size: usize,
}

impl<S: SessionOps> Reader<S> {
    fn new(shared: Arc<Shared<S>>, local_settings: Settings) -> Self {
        Reader {
            shared,
            recv_window: FlowControlWindow::with_initial_size(
                local_settings.get_initial_window_size(),
            ),
            assembly: None,
            max_frame_size: local_settings.get_max_frame_size() as usize,
        }
    }

    fn run(mut self) {
        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                return;
            }

            // Wait for inbound bytes without holding the transport lock, so
            // requesters can keep writing while the connection is idle. TLS
            // may have decrypted bytes buffered past the descriptor.
            let buffered = self.shared.io.lock().unwrap().pending() > 0;
            if !buffered {
                match poll_fd(self.shared.fd, PollEvents::Read, Some(READER_POLL_INTERVAL)) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        self.shared.fail(&err);
                        return;
                    }
                }
            }

            let frame = {
                let mut io = self.shared.io.lock().unwrap();
                FrameCodec::read_frame(&mut *io, self.max_frame_size)
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    self.shared.fail(&err);
                    return;
                }
            };

            log::debug!("recv {} on stream {}", frame.type_name(), frame.stream_id());
            if let Err(err) = self.handle_frame(frame) {
                self.shared.fail(&err);
                return;
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        // CONTINUATION must immediately follow the frame that opened the
        // header block; nothing else may interleave.
        if self.assembly.is_some() && !matches!(frame, Frame::Continuation(_)) {
            return Err(Error::Protocol(
                "expected CONTINUATION for open header block".to_string(),
            ));
        }

        match frame {
            Frame::Data(data) => self.on_data(data),
            Frame::Headers(headers) => self.on_headers(headers),
            Frame::Continuation(cont) => self.on_continuation(cont),
            Frame::PushPromise(push) => {
                // Not consumed beyond parsing, but the header block still
                // runs through the decoder so the dynamic table tracks the
                // peer's encoder.
                log::debug!(
                    "ignoring PUSH_PROMISE for stream {} (promised {})",
                    push.stream_id,
                    push.promised_stream_id
                );
                self.begin_block(HeaderAssembly {
                    stream_id: push.stream_id,
                    fragment: push.header_block.to_vec(),
                    end_stream: false,
                    discard: true,
                }, push.end_headers)
            }
            Frame::RstStream(rst) => {
                let mut streams = self.shared.streams.lock().unwrap();
                if let Some(entry) = streams.get_mut(rst.stream_id) {
                    entry.reset();
                }
                streams.dispatch(
                    rst.stream_id,
                    StreamEvent::Reset {
                        error_code: rst.error_code,
                    },
                );
                Ok(())
            }
            Frame::WindowUpdate(update) => self.on_window_update(update),
            Frame::Priority(priority) => {
                // Prioritization is not implemented; the frame is legal
                // everywhere and carries no state we track.
                log::debug!("ignoring PRIORITY for stream {}", priority.stream_id);
                Ok(())
            }
            frame @ (Frame::Settings(_) | Frame::Ping(_) | Frame::Goaway(_)) => {
                self.shared
                    .streams
                    .lock()
                    .unwrap()
                    .dispatch(0, StreamEvent::Control(frame));
                Ok(())
            }
            Frame::Unknown(unknown) => {
                log::debug!(
                    "ignoring unknown frame type 0x{:x} on stream {}",
                    unknown.frame_type,
                    unknown.stream_id
                );
                Ok(())
            }
        }
    }

    fn on_data(&mut self, data: DataFrame) -> Result<()> {
        // Connection-level accounting: the full payload length, padding
        // included, and a WINDOW_UPDATE on stream 0 once depleted.
        let flow_len = data.flow_len();
        self.recv_window.decrease(flow_len);
        log::trace!(
            "connection recv window at {} after {} octets",
            self.recv_window.size(),
            flow_len
        );
        if let Some(increment) = self.recv_window.replenish() {
            self.shared
                .write_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(0, increment)))?;
        }

        let mut streams = self.shared.streams.lock().unwrap();
        if data.end_stream {
            if let Some(entry) = streams.get_mut(data.stream_id) {
                entry.recv_end_stream();
            }
        }
        streams.dispatch(
            data.stream_id,
            StreamEvent::Data {
                data: data.data,
                flow_len,
                end_stream: data.end_stream,
            },
        );
        Ok(())
    }

    fn on_headers(&mut self, headers: HeadersFrame) -> Result<()> {
        self.begin_block(
            HeaderAssembly {
                stream_id: headers.stream_id,
                fragment: headers.header_block.to_vec(),
                end_stream: headers.end_stream,
                discard: false,
            },
            headers.end_headers,
        )
    }

    fn on_continuation(&mut self, cont: ContinuationFrame) -> Result<()> {
        let Some(mut assembly) = self.assembly.take() else {
            return Err(Error::Protocol(
                "CONTINUATION without preceding HEADERS".to_string(),
            ));
        };
        if assembly.stream_id != cont.stream_id {
            return Err(Error::Protocol(format!(
                "CONTINUATION for stream {} inside header block of stream {}",
                cont.stream_id, assembly.stream_id
            )));
        }

        assembly.fragment.extend_from_slice(&cont.header_block);
        if cont.end_headers {
            self.finish_block(assembly)
        } else {
            self.assembly = Some(assembly);
            Ok(())
        }
    }

    fn begin_block(&mut self, assembly: HeaderAssembly, end_headers: bool) -> Result<()> {
        if end_headers {
            self.finish_block(assembly)
        } else {
            self.assembly = Some(assembly);
            Ok(())
        }
    }

    /// Decode a completed header block and dispatch it. Decoding happens
    /// here, in the reader, so dynamic table mutations apply in wire order
    /// no matter how requester threads are scheduled.
    fn finish_block(&mut self, assembly: HeaderAssembly) -> Result<()> {
        let fields = self
            .shared
            .decoder
            .lock()
            .unwrap()
            .decode(&assembly.fragment)?;
        log::trace!(
            "decoded {} header fields for stream {}",
            fields.len(),
            assembly.stream_id
        );

        if assembly.discard {
            return Ok(());
        }

        let mut streams = self.shared.streams.lock().unwrap();
        if assembly.end_stream {
            if let Some(entry) = streams.get_mut(assembly.stream_id) {
                entry.recv_end_stream();
            }
        }
        streams.dispatch(
            assembly.stream_id,
            StreamEvent::Headers {
                fields,
                end_stream: assembly.end_stream,
            },
        );
        Ok(())
    }

    fn on_window_update(&mut self, update: WindowUpdateFrame) -> Result<()> {
        if update.stream_id == 0 {
            if update.size_increment == 0 {
                return Err(Error::FlowControl(
                    "zero WINDOW_UPDATE increment on connection".to_string(),
                ));
            }
            self.shared
                .streams
                .lock()
                .unwrap()
                .dispatch(0, StreamEvent::Control(Frame::WindowUpdate(update)));
            return Ok(());
        }

        // Stream-scoped: credit the send window. A zero increment or an
        // overflow past 2^31-1 fails only this stream.
        let credit = {
            let mut streams = self.shared.streams.lock().unwrap();
            match streams.get_mut(update.stream_id) {
                Some(entry) => {
                    let result = entry.send_window_mut().increase(update.size_increment);
                    if result.is_err() {
                        entry.reset();
                        streams.dispatch(
                            update.stream_id,
                            StreamEvent::Reset {
                                error_code: ErrorCode::FlowControlError,
                            },
                        );
                    }
                    result.map(|_| ())
                }
                None => {
                    log::debug!(
                        "dropping WINDOW_UPDATE for unknown stream {}",
                        update.stream_id
                    );
                    Ok(())
                }
            }
        };

        if credit.is_err() {
            self.shared.write_frame(&Frame::RstStream(RstStreamFrame {
                stream_id: update.stream_id,
                error_code: ErrorCode::FlowControlError,
            }))?;
        }
        Ok(())
    }
}

/// The settings handler: consumes connection-scoped frames off stream 0's
/// queue. Applies non-ACK SETTINGS and answers with an ACK, answers PING,
/// credits the connection send window, and tears down on GOAWAY.
fn run_settings_handler<S: SessionOps>(shared: Arc<Shared<S>>, rx: Receiver<StreamEvent>) {
    // The loop ends when the registry is torn down and the senders drop.
    while let Ok(event) = rx.recv() {
        let StreamEvent::Control(frame) = event else {
            continue;
        };

        let result = match frame {
            Frame::Settings(settings) => on_settings(&shared, settings),
            Frame::Ping(ping) if !ping.ack => {
                shared.write_frame(&Frame::Ping(PingFrame::ack(ping.data)))
            }
            Frame::Ping(_) => Ok(()),
            Frame::Goaway(goaway) => {
                let err = Error::GoAway(goaway.last_stream_id, goaway.error_code);
                shared.fail(&err);
                return;
            }
            Frame::WindowUpdate(update) => shared
                .conn_send_window
                .lock()
                .unwrap()
                .increase(update.size_increment)
                .map(|_| ()),
            other => {
                log::warn!("unexpected {} on stream 0", other.type_name());
                Ok(())
            }
        };

        if let Err(err) = result {
            shared.fail(&err);
            return;
        }
    }
}

/// Apply a peer SETTINGS frame per RFC 7540 Section 6.5.2 and emit the ACK.
fn on_settings<S: SessionOps>(shared: &Arc<Shared<S>>, frame: SettingsFrame) -> Result<()> {
    if frame.ack {
        log::debug!("peer acknowledged our SETTINGS");
        return Ok(());
    }

    let settings = frame.settings;

    // HEADER_TABLE_SIZE caps the decoder's dynamic table immediately.
    if let Some(size) = settings.header_table_size {
        shared.decoder.lock().unwrap().set_max_size(size as usize);
    }

    // INITIAL_WINDOW_SIZE retroactively shifts every live stream's send
    // window by the delta (range was validated at parse time).
    if let Some(size) = settings.initial_window_size {
        shared.streams.lock().unwrap().adjust_send_windows(size)?;
    }

    shared.peer_settings.lock().unwrap().merge(&settings);

    shared.write_frame(&Frame::Settings(SettingsFrame::ack()))
}
