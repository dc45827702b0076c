//! Information Element (IE) codec: header IEs, payload IEs, and nested IEs.
//!
//! Layout (IEEE 802.15.4-2015 §7.4):
//!
//! - Header IE descriptor (2 bytes, LE): `length(7) | element_id(8) | type(1)=0`
//! - Payload IE descriptor (2 bytes, LE): `length(11) | group_id(4) | type(1)=1`
//! - Short nested IE descriptor: `length(8) | sub_id(7) | type(1)=0`
//! - Long nested IE descriptor: `length(11) | sub_id(4) | type(1)=1`
//!
//! The header region is closed by a zero-length Header Termination IE: HT1
//! (element id [`HT1`]) when payload IEs follow, HT2 ([`HT2`]) when the MAC
//! payload follows directly. The payload IE region, if present, is closed by
//! a zero-length Payload Termination IE ([`PT_GROUP`]).

use crate::buffer::ByteBuffer;
use crate::error::CodecError;
use crate::ieee802154::frame::Frame;
use log::debug;

/// Header Termination 1: header IEs are followed by payload IEs.
pub const HT1: u8 = 0x7e;
/// Header Termination 2: header IEs are followed directly by the MAC payload.
pub const HT2: u8 = 0x7f;
/// Payload IE group carrying MLME nested IEs.
pub const MLME_GROUP: u8 = 0x1;
/// Payload IE group reserved for vendor-specific nested IEs.
pub const VENDOR_GROUP: u8 = 0x2;
/// Payload Termination IE group, closes the payload IE region.
pub const PT_GROUP: u8 = 0xf;

const HEADER_LEN_MASK: u16 = 0x7f;
const HEADER_ID_SHIFT: u16 = 7;
const HEADER_TYPE_BIT: u16 = 1 << 15;

const PAYLOAD_LEN_MASK: u16 = 0x7ff;
const PAYLOAD_GROUP_SHIFT: u16 = 11;

const NIE_SHORT_LEN_MASK: u16 = 0xff;
const NIE_SHORT_ID_SHIFT: u16 = 8;
const NIE_LONG_LEN_MASK: u16 = 0x7ff;
const NIE_LONG_ID_SHIFT: u16 = 11;
const NIE_TYPE_BIT: u16 = 1 << 15;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IeClass {
    Header,
    Payload,
}

/// A parsed IE: its id (element id for header, group id for payload) and
/// the content that follows its descriptor.
#[derive(Copy, Clone, Debug)]
pub struct IeView<'a> {
    pub class: IeClass,
    pub id: u8,
    pub content: &'a [u8],
}

/// A parsed nested IE within an MLME/vendor payload IE's content.
#[derive(Copy, Clone, Debug)]
pub struct NieView<'a> {
    pub long: bool,
    pub sub_id: u8,
    pub content: &'a [u8],
}

fn encode_header_descriptor(element_id: u8, len: usize) -> Result<u16, CodecError> {
    if len > HEADER_LEN_MASK as usize {
        return Err(CodecError::IeTooLong);
    }
    Ok((len as u16 & HEADER_LEN_MASK) | ((element_id as u16) << HEADER_ID_SHIFT))
}

fn encode_payload_descriptor(group_id: u8, len: usize) -> Result<u16, CodecError> {
    if len > PAYLOAD_LEN_MASK as usize {
        debug!("payload IE group {:#04x}: content length {} exceeds {}", group_id, len, PAYLOAD_LEN_MASK);
        return Err(CodecError::IeTooLong);
    }
    Ok((len as u16 & PAYLOAD_LEN_MASK) | ((group_id as u16 & 0xf) << PAYLOAD_GROUP_SHIFT) | HEADER_TYPE_BIT)
}

fn encode_nie_short(sub_id: u8, len: usize) -> Result<u16, CodecError> {
    if len > NIE_SHORT_LEN_MASK as usize {
        return Err(CodecError::IeTooLong);
    }
    Ok((len as u16 & NIE_SHORT_LEN_MASK) | ((sub_id as u16 & 0x7f) << NIE_SHORT_ID_SHIFT))
}

fn encode_nie_long(sub_id: u8, len: usize) -> Result<u16, CodecError> {
    if len > NIE_LONG_LEN_MASK as usize {
        return Err(CodecError::IeTooLong);
    }
    Ok((len as u16 & NIE_LONG_LEN_MASK) | ((sub_id as u16 & 0xf) << NIE_LONG_ID_SHIFT) | NIE_TYPE_BIT)
}

impl<'a> Frame<'a> {
    /// Append a header IE. Must be called before any payload IE and before
    /// [`Frame::terminate_header_ies`].
    pub fn hie_append(&mut self, element_id: u8, content: &[u8]) -> Result<(), CodecError> {
        if self.hie_terminated || self.payload_ie_offset.is_some() {
            debug!("hie_append({:#04x}): header IE region already closed", element_id);
            return Err(CodecError::IeOrderViolation);
        }
        if self.header_ie_offset.is_none() {
            self.header_ie_offset = Some(self.buf.cursor());
            self.set_ie_present();
        }
        let descriptor = encode_header_descriptor(element_id, content.len())?;
        self.buf.append_u16_le(descriptor)?;
        self.buf.append_bytes(content)?;
        self.end = self.buf.cursor();
        Ok(())
    }

    /// Close the header IE region with HT1 (if at least one payload IE will
    /// follow) or HT2 (otherwise). Idempotent once called.
    pub fn terminate_header_ies(&mut self, payload_ies_follow: bool) -> Result<(), CodecError> {
        if self.hie_terminated {
            return Ok(());
        }
        if self.header_ie_offset.is_none() {
            self.header_ie_offset = Some(self.buf.cursor());
            self.set_ie_present();
        }
        let term = if payload_ies_follow { HT1 } else { HT2 };
        let descriptor = encode_header_descriptor(term, 0)?;
        self.buf.append_u16_le(descriptor)?;
        self.hie_terminated = true;
        self.end = self.buf.cursor();
        if !payload_ies_follow {
            self.payload_start = Some(self.end);
        }
        Ok(())
    }

    /// Append a payload IE whose content is `content` verbatim (used
    /// directly, or with [`IeBuilder::finalize`]'s output for MLME/vendor
    /// nested-IE payloads).
    pub fn pie_append(&mut self, group_id: u8, content: &[u8]) -> Result<(), CodecError> {
        if !self.hie_terminated {
            self.terminate_header_ies(true)?;
        }
        if self.payload_ie_offset.is_none() {
            self.payload_ie_offset = Some(self.buf.cursor());
        }
        let descriptor = encode_payload_descriptor(group_id, content.len())?;
        self.buf.append_u16_le(descriptor)?;
        self.buf.append_bytes(content)?;
        self.end = self.buf.cursor();
        Ok(())
    }

    /// Close the payload IE region with a zero-length Payload Termination IE.
    pub fn terminate_payload_ies(&mut self) -> Result<(), CodecError> {
        if self.payload_ie_offset.is_none() {
            self.payload_ie_offset = Some(self.buf.cursor());
        }
        let descriptor = encode_payload_descriptor(PT_GROUP, 0)?;
        self.buf.append_u16_le(descriptor)?;
        self.end = self.buf.cursor();
        self.payload_start = Some(self.end);
        Ok(())
    }

    /// Iterate the header IEs (excluding the HT1/HT2 terminator).
    pub fn header_ies(&self) -> IeIter<'_> {
        IeIter {
            data: self.buf.as_slice(),
            cursor: self.header_ie_offset,
            class: IeClass::Header,
            done: self.header_ie_offset.is_none(),
        }
    }

    /// Iterate the payload IEs (excluding the PT terminator).
    pub fn payload_ies(&self) -> IeIter<'_> {
        IeIter {
            data: self.buf.as_slice(),
            cursor: self.payload_ie_offset,
            class: IeClass::Payload,
            done: self.payload_ie_offset.is_none(),
        }
    }
}

/// Iterator over a sequence of header or payload IE descriptors, stopping at
/// the region's terminator (HT1/HT2 or PT) without yielding it.
pub struct IeIter<'a> {
    data: &'a [u8],
    cursor: Option<usize>,
    class: IeClass,
    done: bool,
}

impl<'a> Iterator for IeIter<'a> {
    type Item = IeView<'a>;

    fn next(&mut self) -> Option<IeView<'a>> {
        if self.done {
            return None;
        }
        let cur = self.cursor?;
        if cur + 2 > self.data.len() {
            self.done = true;
            return None;
        }
        let raw = u16::from_le_bytes([self.data[cur], self.data[cur + 1]]);

        match self.class {
            IeClass::Header => {
                if raw & HEADER_TYPE_BIT != 0 {
                    self.done = true;
                    return None;
                }
                let element_id = ((raw >> HEADER_ID_SHIFT) & 0xff) as u8;
                let len = (raw & HEADER_LEN_MASK) as usize;
                if element_id == HT1 || element_id == HT2 {
                    self.done = true;
                    return None;
                }
                let (start, end) = (cur + 2, cur + 2 + len);
                if end > self.data.len() {
                    self.done = true;
                    return None;
                }
                let content = &self.data[start..end];
                self.cursor = Some(end);
                Some(IeView { class: IeClass::Header, id: element_id, content })
            }
            IeClass::Payload => {
                if raw & HEADER_TYPE_BIT == 0 {
                    self.done = true;
                    return None;
                }
                let group_id = ((raw >> PAYLOAD_GROUP_SHIFT) & 0xf) as u8;
                let len = (raw & PAYLOAD_LEN_MASK) as usize;
                if group_id == PT_GROUP {
                    self.done = true;
                    return None;
                }
                let (start, end) = (cur + 2, cur + 2 + len);
                if end > self.data.len() {
                    self.done = true;
                    return None;
                }
                let content = &self.data[start..end];
                self.cursor = Some(end);
                Some(IeView { class: IeClass::Payload, id: group_id, content })
            }
        }
    }
}

/// Iterate the nested IEs inside an MLME/vendor payload IE's content.
pub fn nie_iter(content: &[u8]) -> NieIter<'_> {
    NieIter { content, cursor: 0 }
}

pub struct NieIter<'a> {
    content: &'a [u8],
    cursor: usize,
}

impl<'a> Iterator for NieIter<'a> {
    type Item = NieView<'a>;

    fn next(&mut self) -> Option<NieView<'a>> {
        if self.cursor + 2 > self.content.len() {
            return None;
        }
        let raw = u16::from_le_bytes([self.content[self.cursor], self.content[self.cursor + 1]]);
        let long = raw & NIE_TYPE_BIT != 0;
        let (sub_id, len) = if long {
            (((raw >> NIE_LONG_ID_SHIFT) & 0xf) as u8, (raw & NIE_LONG_LEN_MASK) as usize)
        } else {
            (((raw >> NIE_SHORT_ID_SHIFT) & 0x7f) as u8, (raw & NIE_SHORT_LEN_MASK) as usize)
        };
        let start = self.cursor + 2;
        let end = start + len;
        if end > self.content.len() {
            return None;
        }
        self.cursor = end;
        Some(NieView { long, sub_id, content: &self.content[start..end] })
    }
}

/// Composes nested IEs into a scratch buffer for use as an MLME or
/// vendor-specific payload IE's content.
///
/// Building nested IEs into their own scratch region sidesteps having to
/// back-patch the enclosing payload IE's length after every nested
/// `finalize`: the whole blob is measured once, when it is handed to
/// [`Frame::pie_append`].
pub struct IeBuilder<'a> {
    buf: ByteBuffer<'a>,
}

impl<'a> IeBuilder<'a> {
    pub fn new(scratch: &'a mut [u8]) -> Self {
        IeBuilder { buf: ByteBuffer::new(scratch) }
    }

    /// Resume composing into a scratch region that already holds `len`
    /// bytes of nested IEs (used to append further nested IEs across
    /// multiple calls without losing earlier ones).
    pub fn reset_buffer(scratch: &'a mut [u8], len: usize) -> Self {
        IeBuilder { buf: ByteBuffer::with_cursor(scratch, len) }
    }

    /// Append a nested IE, choosing the short descriptor form when
    /// `sub_id < 128` and `content.len() <= 255`, else the long form.
    pub fn nie_append(&mut self, sub_id: u8, content: &[u8]) -> Result<(), CodecError> {
        if sub_id < 0x80 && content.len() <= NIE_SHORT_LEN_MASK as usize {
            self.nie_append_short(sub_id, content)
        } else {
            self.nie_append_long(sub_id, content)
        }
    }

    /// Append a short-form nested IE directly. Fails with `IeTooLong` if
    /// `sub_id` does not fit the 7-bit short sub-id field.
    pub fn nie_append_short(&mut self, sub_id: u8, content: &[u8]) -> Result<(), CodecError> {
        if sub_id >= 0x80 {
            debug!("nie_append_short: sub_id {:#04x} does not fit the 7-bit short form", sub_id);
            return Err(CodecError::IeTooLong);
        }
        let descriptor = encode_nie_short(sub_id, content.len())?;
        self.buf.append_u16_le(descriptor)?;
        self.buf.append_bytes(content)
    }

    /// Append a long-form nested IE directly. Fails with `IeTooLong` if
    /// `sub_id` does not fit the 4-bit long sub-id field.
    pub fn nie_append_long(&mut self, sub_id: u8, content: &[u8]) -> Result<(), CodecError> {
        if sub_id >= 0x10 {
            debug!("nie_append_long: sub_id {:#04x} does not fit the 4-bit long form", sub_id);
            return Err(CodecError::IeTooLong);
        }
        let descriptor = encode_nie_long(sub_id, content.len())?;
        self.buf.append_u16_le(descriptor)?;
        self.buf.append_bytes(content)
    }

    /// The nested-IE bytes composed so far, ready to pass to
    /// [`Frame::pie_append`] as the enclosing payload IE's content.
    pub fn finalize(self) -> &'a [u8] {
        let len = self.buf.cursor();
        let raw = self.buf.into_inner();
        &raw[..len]
    }
}

/// Scan the IE region starting at `offset`, used by [`Frame::parse`].
///
/// Returns `(header_ie_offset, payload_ie_offset, payload_start, hie_terminated)`.
pub(crate) fn scan_ie_region(
    view: &ByteBuffer<'_>,
    offset: usize,
    ie_present: bool,
) -> Result<(Option<usize>, Option<usize>, usize, bool), CodecError> {
    if !ie_present {
        return Ok((None, None, offset, false));
    }

    let header_ie_offset = Some(offset);
    let mut cur = offset;
    let mut hie_terminated = false;
    let mut payload_ies_follow = false;

    loop {
        let raw = view.read_u16_le(cur)?;
        if raw & HEADER_TYPE_BIT != 0 {
            return Err(CodecError::MalformedHeader);
        }
        let element_id = ((raw >> HEADER_ID_SHIFT) & 0xff) as u8;
        let len = (raw & HEADER_LEN_MASK) as usize;
        cur += 2;
        if element_id == HT1 {
            hie_terminated = true;
            payload_ies_follow = true;
            break;
        }
        if element_id == HT2 {
            hie_terminated = true;
            break;
        }
        cur = cur.checked_add(len).ok_or(CodecError::MalformedHeader)?;
        if cur > view.capacity() {
            return Err(CodecError::MalformedHeader);
        }
    }

    if !payload_ies_follow {
        return Ok((header_ie_offset, None, cur, hie_terminated));
    }

    let payload_ie_offset = Some(cur);
    loop {
        if cur + 2 > view.capacity() {
            // No explicit Payload Termination IE; treat as implicit end.
            break;
        }
        let raw = view.read_u16_le(cur)?;
        if raw & HEADER_TYPE_BIT == 0 {
            return Err(CodecError::MalformedHeader);
        }
        let group_id = ((raw >> PAYLOAD_GROUP_SHIFT) & 0xf) as u8;
        let len = (raw & PAYLOAD_LEN_MASK) as usize;
        cur += 2;
        if group_id == PT_GROUP {
            break;
        }
        cur = cur.checked_add(len).ok_or(CodecError::MalformedHeader)?;
        if cur > view.capacity() {
            return Err(CodecError::MalformedHeader);
        }
    }

    Ok((header_ie_offset, payload_ie_offset, cur, hie_terminated))
}
