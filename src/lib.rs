//! IEEE 802.15.4 frame/IE codec and 6LoWPAN (RFC 6282) IPHC header
//! compression, built over caller-owned buffers for use on constrained
//! radios.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod buffer;
pub mod error;
pub mod ieee802154;
pub mod sixlo;

pub use buffer::ByteBuffer;
pub use error::CodecError;
