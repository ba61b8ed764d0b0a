//! Unified oscilloscope session: commands, queries, waveform and panel transfers over
//! any transport implementing [`transport::Transport`].

pub mod address;
pub mod block;
pub mod config;
pub mod discovery;
mod link;
pub mod policy;
pub mod session;
pub mod transport;

pub use dsolink_protocol::{
    decode_ascii, decode_block, decode_numeric, encode_block, parse_block_header, BinaryBlock, BlockHeader,
    Endianness, Error, ErrorRecord, Identity, NumericScheme, ScpiRequest, ScpiResponse, TransportError,
    TransportKind, NO_ERROR,
};

pub use address::Address;
pub use config::{BusyPolicy, SessionConfig};
pub use discovery::Discovery;
pub use policy::{ErrorPoll, ErrorPolicy, PollMode};
pub use session::{CallOptions, Session, SessionState};

pub type Result<T> = std::result::Result<T, Error>;
