//! Wire types for the book RPC protocol
//!
//! Every frame is one MessagePack-encoded [`Envelope`] behind a 4-byte
//! big-endian length prefix. The envelope id correlates a response with its
//! request, so responses on a connection may arrive in any order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::bytes::Bytes;
use tokio_util::codec::LengthDelimitedCodec;

use crate::storage::models::{Book, NewBook};

#[derive(Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Request {
    GetBook { id: i64 },
    ListBooks,
    AddBook(NewBook),
    DeleteBook { id: i64 },
    /// Keepalive probe, answered with [`Response::Pong`]
    Ping,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Response {
    Book(Book),
    Books(Vec<Book>),
    Deleted { success: bool, message: String },
    Pong,
    Status(Status),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum StatusCode {
    Internal,
    NotFound,
    /// The response would not fit in a frame
    ResourceExhausted,
}

/// A non-success outcome of a call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Frame codec shared by both ends. Frames above `max_message_size` are
/// rejected by the decoder.
pub fn codec(max_message_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_message_size)
        .new_codec()
}

pub fn encode<T: Serialize>(id: u64, body: &T) -> Result<Bytes, rmp_serde::encode::Error> {
    let payload = rmp_serde::to_vec(&Envelope { id, body })?;
    Ok(Bytes::from(payload))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<Envelope<T>, rmp_serde::decode::Error> {
    rmp_serde::from_slice(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_id() {
        let frame = encode(42, &Request::DeleteBook { id: 7 }).unwrap();
        let envelope: Envelope<Request> = decode(&frame).unwrap();
        assert_eq!(envelope.id, 42);
        assert_eq!(envelope.body, Request::DeleteBook { id: 7 });
    }

    #[test]
    fn test_request_is_not_a_response() {
        let frame = encode(1, &Request::ListBooks).unwrap();
        assert!(decode::<Response>(&frame).is_err());
    }

    #[test]
    fn test_garbage_frame() {
        assert!(decode::<Request>(b"\xc1\xc1\xc1").is_err());
        assert!(decode::<Request>(b"").is_err());
    }
}
