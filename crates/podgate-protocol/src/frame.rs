// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame codec for gateway RPC streams.
//!
//! One QUIC stream carries exactly one call: the caller writes a request
//! frame and finishes its half, the gateway answers with one response frame.
//!
//! ```text
//! +----------------+-------------+------------------+
//! | length: u32 BE | type: u16 BE| protobuf payload |
//! +----------------+-------------+------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in either direction (4 MiB).
///
/// Workload documents are capped well below this by the gateway; the limit
/// only bounds what a misbehaving peer can make us allocate.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Length prefix plus message type.
pub const HEADER_SIZE: usize = 6;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// Caller to gateway.
    Request = 1,
    /// Gateway to caller.
    Response = 2,
}

impl TryFrom<u16> for MessageType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, FrameError> {
        match value {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            other => Err(FrameError::InvalidMessageType(other)),
        }
    }
}

/// Frame encoding and decoding errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid message type: {0}")]
    InvalidMessageType(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("unexpected message type: {0:?}")]
    UnexpectedMessageType(MessageType),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A typed, length-delimited protobuf payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    /// Encode `msg` as a request.
    pub fn request<M: Message>(msg: &M) -> Result<Self, FrameError> {
        Self::new(MessageType::Request, msg)
    }

    /// Encode `msg` as a response.
    pub fn response<M: Message>(msg: &M) -> Result<Self, FrameError> {
        Self::new(MessageType::Response, msg)
    }

    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        let len = msg.encoded_len();
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(len));
        }
        Ok(Self {
            message_type,
            payload: Bytes::from(msg.encode_to_vec()),
        })
    }

    /// Decode the payload, whatever the frame type.
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Decode the payload of a request frame.
    pub fn decode_request<M: Message + Default>(&self) -> Result<M, FrameError> {
        self.expect(MessageType::Request)?;
        self.decode()
    }

    /// Decode the payload of a response frame.
    pub fn decode_response<M: Message + Default>(&self) -> Result<M, FrameError> {
        self.expect(MessageType::Response)?;
        self.decode()
    }

    fn expect(&self, wanted: MessageType) -> Result<(), FrameError> {
        if self.message_type == wanted {
            Ok(())
        } else {
            Err(FrameError::UnexpectedMessageType(self.message_type))
        }
    }

    /// Header and payload as one contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_u16(self.message_type as u16);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    writer.write_all(&frame.encode()).await?;
    Ok(())
}

/// Read one frame.
///
/// A stream that ends before the first header byte yields
/// [`FrameError::ConnectionClosed`]; one that ends mid-frame is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Err(FrameError::ConnectionClosed);
    }
    if first < HEADER_SIZE {
        reader.read_exact(&mut header[first..]).await?;
    }

    let mut fields = &header[..];
    let length = fields.get_u32() as usize;
    let message_type = MessageType::try_from(fields.get_u16())?;

    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        message_type,
        payload: Bytes::from(payload),
    })
}
