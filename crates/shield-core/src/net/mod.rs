//! Connection management: address resolution, dial/listen and framed I/O.

pub mod address;
pub mod connection;

pub use address::{resolve_address, AddressError, ResolvedAddress, DEFAULT_PORT};
pub use connection::{dial, listen, write_frame, FrameReader, NetError, MAX_FRAME_LEN};
