//! HTTP/2 stream management (RFC 7540 Section 5.1)
//!
//! The stream registry maps stream identifiers to their state, send-side
//! flow control window and inbound event queue. The connection's reader
//! thread is the only producer into the queues, which preserves per-stream
//! wire order; requester threads block on their queue's receiving end.
//!
//! Stream 0 is always present and carries connection-scoped frames
//! (SETTINGS, PING, GOAWAY, WINDOW_UPDATE) to the settings handler.

use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::FlowControlWindow;
use crate::frames::Frame;
use crate::hpack::HeaderField;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frames have been sent or received
    Idle,
    /// PUSH_PROMISE sent
    ReservedLocal,
    /// PUSH_PROMISE received
    ReservedRemote,
    /// Both sides can send frames
    Open,
    /// We can no longer send, the peer can
    HalfClosedLocal,
    /// The peer can no longer send, we can
    HalfClosedRemote,
    /// Stream is closed
    Closed,
}

impl StreamState {
    /// Check if we may send data in this state
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the peer may send data in this state
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// An item on a stream's inbound queue.
///
/// For request streams the reader delivers decoded events: header blocks
/// are already reassembled and HPACK-decoded (in wire order, inside the
/// reader) by the time they reach the queue. Stream 0 receives raw
/// connection-scoped frames instead.
#[derive(Debug)]
pub enum StreamEvent {
    /// A complete, decoded header block
    Headers {
        fields: Vec<HeaderField>,
        end_stream: bool,
    },
    /// A DATA frame's payload. `flow_len` is the wire payload length
    /// including padding, which is what flow control debits.
    Data {
        data: Bytes,
        flow_len: usize,
        end_stream: bool,
    },
    /// RST_STREAM received
    Reset { error_code: ErrorCode },
    /// A connection-scoped frame (stream 0 only)
    Control(Frame),
}

/// Per-stream registry entry
#[derive(Debug)]
pub struct StreamEntry {
    state: StreamState,
    send_window: FlowControlWindow,
    sender: Sender<StreamEvent>,
}

impl StreamEntry {
    /// Stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Send-side flow control window
    pub fn send_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.send_window
    }

    /// Transition for sending HEADERS
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        self.state = match self.state {
            StreamState::Idle => {
                if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                }
            }
            StreamState::Open | StreamState::HalfClosedRemote if end_stream => {
                match self.state {
                    StreamState::Open => StreamState::HalfClosedLocal,
                    _ => StreamState::Closed,
                }
            }
            StreamState::Open | StreamState::HalfClosedRemote => self.state,
            state => {
                return Err(Error::Protocol(format!(
                    "cannot send HEADERS in state {:?}",
                    state
                )))
            }
        };
        Ok(())
    }

    /// Transition for sending DATA
    pub fn send_data(&mut self, end_stream: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::Protocol(format!(
                "cannot send DATA in state {:?}",
                self.state
            )));
        }
        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedLocal,
                _ => StreamState::Closed,
            };
        }
        Ok(())
    }

    /// Transition for a received frame carrying END_STREAM
    pub fn recv_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            state => state,
        };
    }

    /// Transition for RST_STREAM (sent or received)
    pub fn reset(&mut self) {
        self.state = StreamState::Closed;
    }
}

/// The stream registry for one connection.
///
/// Mutated from the writer side on allocation and from the reader side on
/// dispatch and removal; callers hold it behind a mutex with short critical
/// sections.
#[derive(Debug)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, StreamEntry>,
    next_stream_id: StreamId,
    closed: bool,
}

impl StreamRegistry {
    /// Create a registry with stream 0 preregistered. Returns the receiving
    /// end of stream 0's queue for the settings handler.
    pub fn new() -> (Self, Receiver<StreamEvent>) {
        let mut streams = HashMap::new();
        let (sender, receiver) = channel();
        streams.insert(
            0,
            StreamEntry {
                state: StreamState::Idle,
                send_window: FlowControlWindow::new(),
                sender,
            },
        );

        (
            StreamRegistry {
                streams,
                next_stream_id: 1,
                closed: false,
            },
            receiver,
        )
    }

    /// The stream id the next allocation will use
    pub fn peek_next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    /// Allocate the next client stream. Client-initiated ids are odd and
    /// strictly increasing; ids are never reused within a connection.
    pub fn allocate(&mut self, initial_send_window: u32) -> Result<(StreamId, Receiver<StreamEvent>)> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.next_stream_id > crate::MAX_STREAM_ID {
            return Err(Error::Protocol("stream ids exhausted".to_string()));
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let (sender, receiver) = channel();
        self.streams.insert(
            stream_id,
            StreamEntry {
                state: StreamState::Idle,
                send_window: FlowControlWindow::with_initial_size(initial_send_window),
                sender,
            },
        );

        Ok((stream_id, receiver))
    }

    /// Look up a stream entry
    pub fn get_mut(&mut self, stream_id: StreamId) -> Option<&mut StreamEntry> {
        self.streams.get_mut(&stream_id)
    }

    /// Whether a stream is registered
    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.streams.contains_key(&stream_id)
    }

    /// Deliver an event to a stream's queue. Events for unknown streams and
    /// streams whose requester has gone away are dropped.
    pub fn dispatch(&self, stream_id: StreamId, event: StreamEvent) {
        match self.streams.get(&stream_id) {
            Some(entry) => {
                if entry.sender.send(event).is_err() {
                    log::debug!("stream {}: requester gone, dropping event", stream_id);
                }
            }
            None => {
                log::debug!("dropping frame for unknown stream {}", stream_id);
            }
        }
    }

    /// Remove a stream once its requester is done with it
    pub fn remove(&mut self, stream_id: StreamId) {
        if stream_id != 0 {
            self.streams.remove(&stream_id);
        }
    }

    /// Number of registered streams, including stream 0
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether only stream 0 remains
    pub fn is_empty(&self) -> bool {
        self.streams.len() <= 1
    }

    /// Apply a changed SETTINGS_INITIAL_WINDOW_SIZE to every live stream's
    /// send window (RFC 7540 Section 6.9.2).
    pub fn adjust_send_windows(&mut self, new_initial_size: u32) -> Result<()> {
        for (id, entry) in self.streams.iter_mut() {
            if *id == 0 {
                continue;
            }
            entry.send_window.update_initial_size(new_initial_size)?;
        }
        Ok(())
    }

    /// Tear down all queues: dropping the senders wakes every blocked
    /// requester with a connection-closed error.
    pub fn close_all(&mut self) {
        self.closed = true;
        self.streams.clear();
    }
}
