//! Request/response multiplexing for framelink.
//!
//! Many threads share one framed connection. Each outbound two-way request
//! carries a sequence number that the peer echoes in its response, so
//! responses can arrive in any order and still reach the right caller.
//! One-way requests carry no sequence number and expect no answer.
//!
//! Payload layout inside a frame:
//!
//! ```text
//! ┌──────────┬───────────────────────┬──────────────────┐
//! │ Header   │ Sequence (8B, BE)     │ Application      │
//! │ (1B)     │ two-way + responses   │ bytes            │
//! └──────────┴───────────────────────┴──────────────────┘
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod header;
pub mod registry;
pub mod stream;
pub mod writer;

pub use call::Call;
pub use config::{SaturationPolicy, StreamConfig};
pub use error::{Result, RpcError};
pub use header::{Header, MessageKind, FLAG_ONE_WAY, FLAG_REQUEST, SEQ_SIZE};
pub use registry::CallRegistry;
pub use stream::{RequestHandler, Stream, StreamState, WriteErrorHandler};
pub use writer::{InputError, SerializedWriter};
