//! Outgoing message queue with partial-send support
//!
//! Messages are queued with [`StpWriter::enqueue_message`] and handed to the
//! [`DataSink`] one leg at a time: the STP/1 prefix, the header, then every
//! payload chunk. A sink may take less than it was offered and report the
//! rest later through [`StpWriter::on_data_sent`]; nothing new is offered
//! while bytes are pending.
//!
//! Frames are encoded when a message is queued, so a message that cannot be
//! encoded is refused by `enqueue_message` and never enters the queue.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame;
use crate::transport::{ProtocolVersion, TransportMessage};

/// Destination for encoded bytes
pub trait DataSink {
    /// Offer `data`; returns how many bytes were sent right away
    ///
    /// Bytes not reported here must be acknowledged later with
    /// [`StpWriter::on_data_sent`].
    fn send_data(&mut self, data: &[u8]) -> Result<usize>;
}

impl DataSink for Vec<u8> {
    fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.try_reserve(data.len())?;
        self.extend_from_slice(data);
        Ok(data.len())
    }
}

/// Writer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Framing generation to produce
    pub protocol_version: ProtocolVersion,
    /// Whether queued messages are sent as soon as possible
    pub enabled: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::Stp1,
            enabled: true,
        }
    }
}

impl WriterConfig {
    /// Set the framing generation
    pub fn with_protocol_version(mut self, protocol_version: ProtocolVersion) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    /// Start enabled or paused
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Leg of the current message being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No message in progress
    Idle,
    /// Whole STP/0 frame
    Stp0,
    /// STP/1 magic, version and body length
    Header,
    /// STP/1 type byte, routing fields and payload length
    HeaderData,
    /// Payload chunk at this index
    Chunk(usize),
}

/// Queued message with its frame legs already encoded
#[derive(Debug)]
struct Outgoing {
    message: TransportMessage,
    version: ProtocolVersion,
    /// STP/1 prefix leg, or the whole STP/0 frame
    prefix: Vec<u8>,
    /// STP/1 header leg, empty for STP/0
    head: Vec<u8>,
}

impl Outgoing {
    fn encode(message: TransportMessage, version: ProtocolVersion) -> Result<Self> {
        let (prefix, head) = match version {
            ProtocolVersion::Stp0 => (frame::encode_stp0(&message)?, Vec::new()),
            ProtocolVersion::Stp1 => {
                let head = frame::encode_header(&message)?;
                let prefix = frame::encode_prefix(head.len() + message.payload.len());
                (prefix, head)
            }
        };
        Ok(Self {
            message,
            version,
            prefix,
            head,
        })
    }
}

/// Outgoing STP stream
#[derive(Debug)]
pub struct StpWriter<S> {
    sink: S,
    config: WriterConfig,
    state: WriterState,
    queue: VecDeque<Outgoing>,
    current: Option<Outgoing>,
    /// Bytes of the current leg offered but not yet acknowledged
    pending: usize,
}

impl<S: DataSink> StpWriter<S> {
    /// STP/1 writer, enabled
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    /// Writer with explicit settings
    pub fn with_config(sink: S, config: WriterConfig) -> Self {
        Self {
            sink,
            config,
            state: WriterState::Idle,
            queue: VecDeque::new(),
            current: None,
            pending: 0,
        }
    }

    /// Current leg
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Settings in effect
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// The data sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the data sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Give the sink back
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Messages waiting behind the current one
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Bytes offered to the sink and not yet acknowledged
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Nothing in flight and nothing queued
    pub fn is_idle(&self) -> bool {
        self.state == WriterState::Idle && self.queue.is_empty()
    }

    /// Switch framing generation for messages queued after this call
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.config.protocol_version = version;
    }

    /// Queue `message` and start sending when enabled
    ///
    /// The frame is encoded here with the current protocol version; if that
    /// fails the message is not queued and the writer is unchanged.
    pub fn enqueue_message(&mut self, message: TransportMessage) -> Result<()> {
        self.queue.try_reserve(1)?;
        let outgoing = Outgoing::encode(message, self.config.protocol_version)?;
        trace!(
            service = %outgoing.message.service_name,
            command = outgoing.message.command_id,
            version = ?outgoing.version,
            queued = self.queue.len() + 1,
            "queued STP message"
        );
        self.queue.push_back(outgoing);
        self.process_message()
    }

    /// Pause or resume sending
    ///
    /// Pausing does not cancel bytes already offered; their acknowledgements
    /// are still accepted.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.config.enabled = enabled;
        self.process_message()
    }

    /// Acknowledge `sent` bytes of the leg in flight
    pub fn on_data_sent(&mut self, sent: usize) -> Result<()> {
        if sent > self.pending {
            return Err(Error::InvalidAcknowledgement {
                acknowledged: sent,
                pending: self.pending,
            });
        }
        self.pending -= sent;
        if self.pending == 0 && self.state != WriterState::Idle {
            self.finish_leg();
        }
        self.process_message()
    }

    /// Drop the queue and the message in progress
    pub fn reset(&mut self) {
        self.queue.clear();
        self.current = None;
        self.pending = 0;
        self.state = WriterState::Idle;
        trace!("writer reset");
    }

    /// Offer legs until the sink holds back or there is nothing left
    fn process_message(&mut self) -> Result<()> {
        while self.config.enabled && self.pending == 0 {
            if self.state == WriterState::Idle {
                let Some(outgoing) = self.queue.pop_front() else {
                    return Ok(());
                };
                self.start(outgoing);
            }

            let Some(current) = &self.current else {
                self.state = WriterState::Idle;
                continue;
            };
            let leg = match self.state {
                WriterState::Idle => return Ok(()),
                WriterState::Stp0 | WriterState::Header => current.prefix.as_slice(),
                WriterState::HeaderData => current.head.as_slice(),
                WriterState::Chunk(index) => {
                    current.message.payload.chunk(index).unwrap_or_default()
                }
            };
            let len = leg.len();
            let sent = if len == 0 { 0 } else { self.sink.send_data(leg)? };
            if sent > len {
                return Err(Error::InvalidAcknowledgement {
                    acknowledged: sent,
                    pending: len,
                });
            }

            self.pending = len - sent;
            if self.pending == 0 {
                self.finish_leg();
            }
        }
        Ok(())
    }

    fn start(&mut self, outgoing: Outgoing) {
        self.state = match outgoing.version {
            ProtocolVersion::Stp0 => WriterState::Stp0,
            ProtocolVersion::Stp1 => WriterState::Header,
        };
        self.current = Some(outgoing);
    }

    fn finish_leg(&mut self) {
        let chunks = self
            .current
            .as_ref()
            .map_or(0, |outgoing| outgoing.message.payload.chunk_count());

        self.state = match self.state {
            WriterState::Header => WriterState::HeaderData,
            WriterState::HeaderData if chunks > 0 => WriterState::Chunk(0),
            WriterState::Chunk(index) if index + 1 < chunks => WriterState::Chunk(index + 1),
            WriterState::Idle => WriterState::Idle,
            WriterState::Stp0 | WriterState::HeaderData | WriterState::Chunk(_) => {
                if let Some(Outgoing { message, .. }) = self.current.take() {
                    debug!(
                        service = %message.service_name,
                        command = message.command_id,
                        kind = ?message.kind,
                        tag = message.tag,
                        payload_len = message.payload.len(),
                        "STP message sent"
                    );
                }
                WriterState::Idle
            }
        };
    }
}
