//! 6LoWPAN (RFC 6282) IPv6 header compression over an IEEE 802.15.4 link.
//!
//! [`ipv6`] is a minimal view/builder for the 40-byte IPv6 header,
//! [`context`] is the stateful compression context table, and [`iphc`]
//! implements the LOWPAN_IPHC compressor/decompressor itself.

pub mod context;
pub mod ipv6;
pub mod iphc;

pub use context::{Context, ContextTable};
pub use ipv6::Ipv6Packet;
pub use iphc::{compress, decompress, L2Addr};
