//! Length-delimited MessagePack RPC over TCP, used between the gateway and
//! the book service.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{Request, Response, Status, StatusCode};
pub use server::{serve, Handler, ServerOptions, ShutdownOutcome};
pub use transport::{ChannelOptions, RpcChannel, TransportError};
