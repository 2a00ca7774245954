//! Wire protocol: length-prefixed framing and the connection handshake

pub mod constants;
pub mod frame;
pub mod handshake;

pub use constants::{DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY, FRAME_HEADER_LEN};
pub use frame::{encode_frame, read_frame, write_frame};
pub use handshake::{Handshake, InfoResponse, Role};
