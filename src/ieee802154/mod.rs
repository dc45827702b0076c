//! IEEE 802.15.4 MAC Header (MHR) framing: Frame Control Field, addressing,
//! and the nested Information Element (IE) region.
//!
//! The container primitives the original firmware builds this on top of
//! (range/list/map/heap/ring buffer/intrusive linked list) are external
//! collaborators, not part of this crate: the codec only ever needs a
//! bounded, cursor-anchored byte window, which [`crate::buffer::ByteBuffer`]
//! provides.

mod addr;
mod frame;
mod ie;

pub use addr::{extended_to_iid, iid_to_short, short_to_iid, AddrMode};
pub use frame::{Frame, FrameType, MAX_FRAME_LEN};
pub use ie::{
    nie_iter, IeBuilder, IeClass, IeIter, IeView, NieIter, NieView, HT1, HT2, MLME_GROUP, PT_GROUP,
    VENDOR_GROUP,
};
