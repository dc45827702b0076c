//! Error taxonomy for the frame, IE, and IPHC codecs.

use core::fmt;

/// Errors produced by the byte buffer, 802.15.4 frame, IE, and IPHC codecs.
///
/// All operations are non-retrying and non-partial: a failed write leaves
/// the buffer's cursor unchanged, and a failed parse never mutates its
/// output.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// An append would overflow the destination buffer.
    CapacityExceeded,
    /// A read referenced an offset outside the buffer.
    OutOfRange,
    /// Illegal dest/src/PAN addressing combination passed to `set_addr`.
    AddressingInvalid,
    /// `set_seqnum` called while the sequence-number-suppression bit is set.
    SeqnumSuppressed,
    /// IE content exceeds 127 (HIE) or 2047 (PIE/long NIE) bytes.
    IeTooLong,
    /// A PIE was appended before the HIE terminator, or a NIE was appended
    /// to a non-MLME PIE.
    IeOrderViolation,
    /// The decompressor dispatched on a buffer that is not an IPHC header.
    NotIphc,
    /// The decompressor referenced a context id whose slot is empty.
    UnknownContext,
    /// A structural violation was found while parsing (truncated field,
    /// inconsistent FCF, unsupported addressing mode, ...).
    MalformedHeader,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CodecError::CapacityExceeded => "capacity exceeded",
            CodecError::OutOfRange => "read out of range",
            CodecError::AddressingInvalid => "invalid addressing combination",
            CodecError::SeqnumSuppressed => "sequence number suppressed",
            CodecError::IeTooLong => "information element too long",
            CodecError::IeOrderViolation => "information element order violation",
            CodecError::NotIphc => "not an IPHC header",
            CodecError::UnknownContext => "unknown context id",
            CodecError::MalformedHeader => "malformed header",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}
