//! Frame Control Field, MHR construction, and MHR parsing.

use crate::buffer::ByteBuffer;
use crate::error::CodecError;
use crate::ieee802154::addr::AddrMode;
use log::{debug, warn};

// FCF bit layout, LSB first per the standard:
// frame type(3) | security(1) | pending(1) | AR(1) | PIDC(1) | reserved(1)
// | seqnum-suppress(1) | IE-present(1) | DAM(2) | frame-version(2) | SAM(2)
const FRAME_TYPE_MASK: u16 = 0b111;
const SECURITY_BIT: u16 = 1 << 3;
const PENDING_BIT: u16 = 1 << 4;
const AR_BIT: u16 = 1 << 5;
const PIDC_BIT: u16 = 1 << 6;
const SEQNUM_SUPPRESS_BIT: u16 = 1 << 8;
const IE_PRESENT_BIT: u16 = 1 << 9;
const DAM_SHIFT: u16 = 10;
const DAM_MASK: u16 = 0b11 << DAM_SHIFT;
const VERSION_SHIFT: u16 = 12;
const VERSION_MASK: u16 = 0b11 << VERSION_SHIFT;
const SAM_SHIFT: u16 = 14;
const SAM_MASK: u16 = 0b11 << SAM_SHIFT;

/// IEEE 802.15.4-2015, the only frame version this codec emits.
const FRAME_VERSION_2015: u16 = 0b10;

pub const MAX_FRAME_LEN: usize = 127;

/// 802.15.4 frame type, the low 3 bits of the FCF.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Beacon = 0b000,
    Data = 0b001,
    Ack = 0b010,
    MacCommand = 0b011,
}

impl FrameType {
    fn from_bits(bits: u16) -> Option<FrameType> {
        match bits & FRAME_TYPE_MASK {
            0b000 => Some(FrameType::Beacon),
            0b001 => Some(FrameType::Data),
            0b010 => Some(FrameType::Ack),
            0b011 => Some(FrameType::MacCommand),
            _ => None,
        }
    }
}

/// A single 802.15.4 MHR, built or parsed over caller-owned memory.
///
/// The FCF is the source of truth for structure (§3); every other field
/// here is a derived offset kept in sync with it on every mutation.
pub struct Frame<'a> {
    pub(crate) buf: ByteBuffer<'a>,

    seqnum_offset: Option<usize>,

    dest_pan_offset: Option<usize>,
    dest_addr_offset: Option<usize>,
    dest_addr_mode: AddrMode,

    src_pan_offset: Option<usize>,
    src_addr_offset: Option<usize>,
    src_addr_mode: AddrMode,

    pub(crate) header_ie_offset: Option<usize>,
    pub(crate) payload_ie_offset: Option<usize>,
    pub(crate) hie_terminated: bool,

    /// Offset where the MAC payload begins, once known (after HT2 or the
    /// Payload Termination IE, or immediately from a parse). `None` while a
    /// frame under construction might still grow its IE region.
    pub(crate) payload_start: Option<usize>,

    /// End of everything written/parsed so far; doubles as frame length.
    pub(crate) end: usize,
}

impl<'a> Frame<'a> {
    fn init(buf: &'a mut [u8], frame_type: FrameType, ack_request: bool) -> Result<Self, CodecError> {
        let mut buf = ByteBuffer::new(buf);

        let mut fctrl = frame_type as u16;
        fctrl |= FRAME_VERSION_2015 << VERSION_SHIFT;
        if ack_request {
            fctrl |= AR_BIT;
        }

        buf.append_u16_le(fctrl)?;
        buf.append_u8(0)?;

        Ok(Frame {
            buf,
            seqnum_offset: Some(2),
            dest_pan_offset: None,
            dest_addr_offset: None,
            dest_addr_mode: AddrMode::None,
            src_pan_offset: None,
            src_addr_offset: None,
            src_addr_mode: AddrMode::None,
            header_ie_offset: None,
            payload_ie_offset: None,
            hie_terminated: false,
            payload_start: None,
            end: 3,
        })
    }

    pub fn beacon_init(buf: &'a mut [u8]) -> Result<Self, CodecError> {
        Self::init(buf, FrameType::Beacon, false)
    }

    pub fn data_init(buf: &'a mut [u8]) -> Result<Self, CodecError> {
        Self::init(buf, FrameType::Data, false)
    }

    pub fn ack_init(buf: &'a mut [u8]) -> Result<Self, CodecError> {
        Self::init(buf, FrameType::Ack, false)
    }

    pub fn cmd_init(buf: &'a mut [u8]) -> Result<Self, CodecError> {
        Self::init(buf, FrameType::MacCommand, true)
    }

    fn fctrl_raw(&self) -> u16 {
        // Always present: every init() and parse() writes/reads 2 bytes at offset 0.
        self.buf.read_u16_le(0).unwrap_or(0)
    }

    fn set_fctrl_bits(&mut self, mask: u16, value: u16) {
        let cur = self.fctrl_raw();
        let next = (cur & !mask) | (value & mask);
        let dst = self.buf.slice_mut(0, 2).expect("fctrl always present");
        dst.copy_from_slice(&next.to_le_bytes());
    }

    pub fn fctrl(&self) -> u16 {
        self.fctrl_raw()
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_bits(self.fctrl_raw())
    }

    pub fn ack_request(&self) -> bool {
        self.fctrl_raw() & AR_BIT != 0
    }

    pub fn set_ack_request(&mut self, v: bool) {
        self.set_fctrl_bits(AR_BIT, if v { AR_BIT } else { 0 });
    }

    pub fn security_enabled(&self) -> bool {
        self.fctrl_raw() & SECURITY_BIT != 0
    }

    pub fn frame_pending(&self) -> bool {
        self.fctrl_raw() & PENDING_BIT != 0
    }

    pub fn set_frame_pending(&mut self, v: bool) {
        self.set_fctrl_bits(PENDING_BIT, if v { PENDING_BIT } else { 0 });
    }

    pub fn pan_id_compress(&self) -> bool {
        self.fctrl_raw() & PIDC_BIT != 0
    }

    pub fn seqnum_suppressed(&self) -> bool {
        self.fctrl_raw() & SEQNUM_SUPPRESS_BIT != 0
    }

    pub fn ie_present(&self) -> bool {
        self.fctrl_raw() & IE_PRESENT_BIT != 0
    }

    pub(crate) fn set_ie_present(&mut self) {
        self.set_fctrl_bits(IE_PRESENT_BIT, IE_PRESENT_BIT);
    }

    /// Toggle sequence-number suppression. Only legal immediately after
    /// `*_init`, before addresses or IEs have been written.
    pub fn set_seqnum_suppress(&mut self, suppress: bool) -> Result<(), CodecError> {
        let currently_suppressed = self.seqnum_offset.is_none();
        if currently_suppressed == suppress {
            return Ok(());
        }
        let base = if currently_suppressed { 2 } else { 3 };
        if self.buf.cursor() != base || self.end != base {
            return Err(CodecError::MalformedHeader);
        }

        if suppress {
            self.buf.rewind_to(2);
            self.seqnum_offset = None;
            self.end = 2;
        } else {
            self.buf.append_u8(0)?;
            self.seqnum_offset = Some(2);
            self.end = 3;
        }
        self.set_fctrl_bits(SEQNUM_SUPPRESS_BIT, if suppress { SEQNUM_SUPPRESS_BIT } else { 0 });
        Ok(())
    }

    pub fn set_seqnum(&mut self, n: u8) -> Result<(), CodecError> {
        match self.seqnum_offset {
            Some(off) => {
                self.buf.slice_mut(off, off + 1)?[0] = n;
                Ok(())
            }
            None => Err(CodecError::SeqnumSuppressed),
        }
    }

    pub fn seqnum(&self) -> Option<u8> {
        self.seqnum_offset.and_then(|off| self.buf.read_u8(off).ok())
    }

    /// Validate a (dest mode, src mode, dest-pan-present, src-pan-present)
    /// combination per the PAN-ID-Compression truth table, returning the
    /// PAN-ID-Compression bit value to use.
    fn pidc_for(dm: AddrMode, sm: AddrMode, dp: bool, sp: bool) -> Result<bool, CodecError> {
        use AddrMode::*;
        let short_or_ext = |m: AddrMode| m == Short || m == Extended;

        let pidc = match (dm, sm, dp, sp) {
            (None, self::AddrMode::None, false, false) => false,
            (None, self::AddrMode::None, true, false) => true,

            (d, self::AddrMode::None, true, false) if short_or_ext(d) => false,
            (d, self::AddrMode::None, false, false) if short_or_ext(d) => true,

            (None, s, false, true) if short_or_ext(s) => false,
            (None, s, false, false) if short_or_ext(s) => true,

            (Extended, Extended, true, false) => false,
            (Extended, Extended, false, false) => true,

            (Short, Short, true, true) => false,
            (Short, Extended, true, true) => false,
            (Extended, Short, true, true) => false,

            (Short, Short, true, false) => true,
            (Short, Extended, true, false) => true,
            (Extended, Short, true, false) => true,

            _ => return Err(CodecError::AddressingInvalid),
        };
        Ok(pidc)
    }

    /// Set the destination/source PAN ids and addresses in one shot.
    ///
    /// Fails with `AddressingInvalid` (frame unchanged) when the combination
    /// of presence/absence is not one of the legal rows in the PIDC truth
    /// table, and with `CapacityExceeded` if the frame has no room (also
    /// leaving the frame unchanged, since the check runs before any write).
    pub fn set_addr(
        &mut self,
        dest_pan: Option<u16>,
        dest_addr: Option<&[u8]>,
        src_pan: Option<u16>,
        src_addr: Option<&[u8]>,
    ) -> Result<(), CodecError> {
        let dm = AddrMode::from_len(dest_addr.map_or(0, |a| a.len())).ok_or(CodecError::AddressingInvalid)?;
        let sm = AddrMode::from_len(src_addr.map_or(0, |a| a.len())).ok_or(CodecError::AddressingInvalid)?;
        let dp = dest_pan.is_some();
        let sp = src_pan.is_some();

        let pidc = Self::pidc_for(dm, sm, dp, sp).map_err(|e| {
            warn!("set_addr: illegal combination dm={:?} sm={:?} dest_pan={} src_pan={}", dm, sm, dp, sp);
            e
        })?;

        let total = (if dp { 2 } else { 0 })
            + dm.len()
            + (if sp { 2 } else { 0 })
            + sm.len();
        if self.buf.cursor() + total > self.buf.capacity() {
            debug!("set_addr: {} bytes required, {} available", total, self.buf.capacity() - self.buf.cursor());
            return Err(CodecError::CapacityExceeded);
        }

        let mut dest_pan_offset = None;
        let mut dest_addr_offset = None;
        let mut src_pan_offset = None;
        let mut src_addr_offset = None;

        if let Some(pan) = dest_pan {
            dest_pan_offset = Some(self.buf.cursor());
            self.buf.append_u16_le(pan)?;
        }
        if let Some(addr) = dest_addr {
            dest_addr_offset = Some(self.buf.cursor());
            self.buf.append_bytes(addr)?;
        }
        if let Some(pan) = src_pan {
            src_pan_offset = Some(self.buf.cursor());
            self.buf.append_u16_le(pan)?;
        }
        if let Some(addr) = src_addr {
            src_addr_offset = Some(self.buf.cursor());
            self.buf.append_bytes(addr)?;
        }

        self.dest_pan_offset = dest_pan_offset;
        self.dest_addr_offset = dest_addr_offset;
        self.dest_addr_mode = dm;
        self.src_pan_offset = src_pan_offset;
        self.src_addr_offset = src_addr_offset;
        self.src_addr_mode = sm;

        self.set_fctrl_bits(DAM_MASK, (dm.code() as u16) << DAM_SHIFT);
        self.set_fctrl_bits(SAM_MASK, (sm.code() as u16) << SAM_SHIFT);
        self.set_fctrl_bits(PIDC_BIT, if pidc { PIDC_BIT } else { 0 });

        self.end = self.buf.cursor();
        Ok(())
    }

    pub fn dest_addr_mode(&self) -> AddrMode {
        self.dest_addr_mode
    }

    pub fn src_addr_mode(&self) -> AddrMode {
        self.src_addr_mode
    }

    pub fn has_dest_pan(&self) -> bool {
        self.dest_pan_offset.is_some()
    }

    pub fn has_src_pan(&self) -> bool {
        self.src_pan_offset.is_some()
    }

    pub fn dest_pan(&self) -> Option<u16> {
        self.dest_pan_offset.and_then(|o| self.buf.read_u16_le(o).ok())
    }

    pub fn src_pan(&self) -> Option<u16> {
        self.src_pan_offset.and_then(|o| self.buf.read_u16_le(o).ok())
    }

    pub fn dest_addr(&self) -> Option<&[u8]> {
        let off = self.dest_addr_offset?;
        self.buf.slice(off, off + self.dest_addr_mode.len()).ok()
    }

    pub fn src_addr(&self) -> Option<&[u8]> {
        let off = self.src_addr_offset?;
        self.buf.slice(off, off + self.src_addr_mode.len()).ok()
    }

    /// Offset of the first byte after the MHR/IE region, i.e. where the
    /// frame payload (or 6LoWPAN/IPHC bytes) begins.
    ///
    /// Before any IE has been opened this tracks the end of addressing;
    /// once IEs are in use it is fixed at the point their region closes
    /// (HT2 or the Payload Termination IE), so it stays correct even as
    /// further payload bytes are appended afterwards.
    pub fn payload_start(&self) -> usize {
        self.payload_start.unwrap_or_else(|| self.mhr_end())
    }

    fn mhr_end(&self) -> usize {
        let addr_end = |off: Option<usize>, len: usize| off.map(|o| o + len).unwrap_or(0);
        let a = addr_end(self.dest_pan_offset, 2).max(addr_end(self.dest_addr_offset, self.dest_addr_mode.len()));
        let b = addr_end(self.src_pan_offset, 2).max(addr_end(self.src_addr_offset, self.src_addr_mode.len()));
        a.max(b).max(self.seqnum_offset.map(|o| o + 1).unwrap_or(2))
    }

    /// Total length of the frame written/parsed so far (excludes the FCS,
    /// which the caller appends out of band).
    pub fn length(&self) -> usize {
        self.end
    }

    /// Reserve the remainder of the frame as a writable payload region.
    pub fn reserve_payload(&mut self, n: usize) -> Result<&mut [u8], CodecError> {
        let r = self.buf.reserve(n)?;
        self.end = self.end.max(self.buf.cursor());
        Ok(r)
    }

    pub fn append_payload(&mut self, content: &[u8]) -> Result<(), CodecError> {
        self.buf.append_bytes(content)?;
        self.end = self.buf.cursor();
        Ok(())
    }

    pub fn payload(&self) -> Result<&[u8], CodecError> {
        self.buf.slice(self.payload_start(), self.end)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf.as_slice()[..self.end]
    }

    /// Parse an existing MHR. Pure: never mutates, idempotent, derives all
    /// offsets from a single forward pass driven by the FCF.
    pub fn parse(buf: &'a mut [u8]) -> Result<Self, CodecError> {
        let total_len = buf.len().min(MAX_FRAME_LEN);
        let view = ByteBuffer::new(buf);

        let fctrl = view.read_u16_le(0)?;
        let mut offset = 2;

        let seqnum_offset = if fctrl & SEQNUM_SUPPRESS_BIT != 0 {
            None
        } else {
            let o = offset;
            offset += 1;
            Some(o)
        };

        let dm = AddrMode::from_code(((fctrl & DAM_MASK) >> DAM_SHIFT) as u8).ok_or_else(|| {
            warn!("frame parse: invalid destination addressing mode in fctrl {:#06x}", fctrl);
            CodecError::MalformedHeader
        })?;
        let sm = AddrMode::from_code(((fctrl & SAM_MASK) >> SAM_SHIFT) as u8).ok_or_else(|| {
            warn!("frame parse: invalid source addressing mode in fctrl {:#06x}", fctrl);
            CodecError::MalformedHeader
        })?;
        let pidc = fctrl & PIDC_BIT != 0;

        let (dp, sp) = Self::infer_pan_presence(dm, sm, pidc).map_err(|e| {
            warn!("frame parse: no legal PAN presence for dm={:?} sm={:?} pidc={}", dm, sm, pidc);
            e
        })?;

        let dest_pan_offset = if dp {
            let o = offset;
            offset += 2;
            Some(o)
        } else {
            None
        };
        let dest_addr_offset = if dm != AddrMode::None {
            let o = offset;
            offset += dm.len();
            Some(o)
        } else {
            None
        };
        let src_pan_offset = if sp {
            let o = offset;
            offset += 2;
            Some(o)
        } else {
            None
        };
        let src_addr_offset = if sm != AddrMode::None {
            let o = offset;
            offset += sm.len();
            Some(o)
        } else {
            None
        };

        let ie_present = fctrl & IE_PRESENT_BIT != 0;
        let (header_ie_offset, payload_ie_offset, payload_offset, hie_terminated) =
            super::ie::scan_ie_region(&view, offset, ie_present)?;

        let end = total_len.max(payload_offset);

        Ok(Frame {
            buf: view,
            seqnum_offset,
            dest_pan_offset,
            dest_addr_offset,
            dest_addr_mode: dm,
            src_pan_offset,
            src_addr_offset,
            src_addr_mode: sm,
            header_ie_offset,
            payload_ie_offset,
            hie_terminated,
            payload_start: Some(payload_offset),
            end,
        })
    }

    fn infer_pan_presence(dm: AddrMode, sm: AddrMode, pidc: bool) -> Result<(bool, bool), CodecError> {
        use AddrMode::*;
        let short_or_ext = |m: AddrMode| m == Short || m == Extended;

        let result = match (dm, sm, pidc) {
            (None, self::AddrMode::None, false) => (false, false),
            (None, self::AddrMode::None, true) => (true, false),

            (d, self::AddrMode::None, false) if short_or_ext(d) => (true, false),
            (d, self::AddrMode::None, true) if short_or_ext(d) => (false, false),

            (None, s, false) if short_or_ext(s) => (false, true),
            (None, s, true) if short_or_ext(s) => (false, false),

            (Extended, Extended, false) => (true, false),
            (Extended, Extended, true) => (false, false),

            (Short, Short, false) => (true, true),
            (Short, Extended, false) => (true, true),
            (Extended, Short, false) => (true, true),

            (Short, Short, true) => (true, false),
            (Short, Extended, true) => (true, false),
            (Extended, Short, true) => (true, false),

            _ => return Err(CodecError::MalformedHeader),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn beacon_init_fctrl_has_no_address_no_ie_version_2015() {
        let mut mem = [0u8; 32];
        let f = Frame::beacon_init(&mut mem).unwrap();
        assert_eq!(f.frame_type(), Some(FrameType::Beacon));
        assert!(!f.ack_request());
        assert!(!f.seqnum_suppressed());
        assert!(!f.ie_present());
        assert_eq!(f.dest_addr_mode(), AddrMode::None);
        assert_eq!(f.src_addr_mode(), AddrMode::None);
    }

    #[test]
    fn set_ack_request_sets_bit() {
        let mut mem = [0u8; 32];
        let mut f = Frame::beacon_init(&mut mem).unwrap();
        f.set_ack_request(true);
        assert!(f.ack_request());
    }

    #[test]
    fn set_seqnum_writes_fixed_offset() {
        let mut mem = [0u8; 32];
        let mut f = Frame::beacon_init(&mut mem).unwrap();
        f.set_seqnum(0xC1).unwrap();
        assert_eq!(f.seqnum(), Some(0xC1));
        assert_eq!(f.as_bytes()[2], 0xC1);
    }

    #[test]
    fn suppressing_seqnum_frees_its_byte_and_blocks_set_seqnum() {
        let mut mem = [0u8; 32];
        let mut f = Frame::beacon_init(&mut mem).unwrap();
        f.set_seqnum_suppress(true).unwrap();
        assert_eq!(f.length(), 2);
        assert_eq!(f.set_seqnum(1), Err(CodecError::SeqnumSuppressed));
    }

    #[test]
    fn pidc_truth_table() {
        use AddrMode::*;
        let cases: &[(AddrMode, AddrMode, bool, bool, Option<bool>)] = &[
            (None, None, false, false, Some(false)),
            (None, None, true, false, Some(true)),
            (None, None, false, true, None),
            (Short, None, true, false, Some(false)),
            (Extended, None, true, false, Some(false)),
            (Short, None, false, false, Some(true)),
            (Extended, None, false, false, Some(true)),
            (Short, None, true, true, None),
            (None, Short, false, true, Some(false)),
            (None, Short, false, false, Some(true)),
            (None, Short, true, false, None),
            (Extended, Extended, true, false, Some(false)),
            (Extended, Extended, false, false, Some(true)),
            (Extended, Extended, true, true, None),
            (Short, Short, true, true, Some(false)),
            (Short, Extended, true, true, Some(false)),
            (Extended, Short, true, true, Some(false)),
            (Short, Short, true, false, Some(true)),
            (Short, Extended, true, false, Some(true)),
            (Extended, Short, true, false, Some(true)),
            (Short, Short, false, false, None),
        ];
        for (dm, sm, dp, sp, expect) in cases.iter().copied() {
            let got = Frame::pidc_for(dm, sm, dp, sp).ok();
            assert_eq!(got, expect, "dm={:?} sm={:?} dp={} sp={}", dm, sm, dp, sp);
        }
    }

    #[test]
    fn set_addr_rejects_invalid_combo_and_leaves_frame_unchanged() {
        let mut mem = [0u8; 32];
        let mut f = Frame::beacon_init(&mut mem).unwrap();
        let before = f.length();
        let err = f.set_addr(None, None, Some(0xBAAD), None).unwrap_err();
        assert_eq!(err, CodecError::AddressingInvalid);
        assert_eq!(f.length(), before);
    }

    #[test]
    fn set_addr_round_trips_through_parse() {
        let mut mem = [0u8; 32];
        let written;
        {
            let mut f = Frame::beacon_init(&mut mem).unwrap();
            f.set_seqnum(0xC1).unwrap();
            f.set_addr(
                Some(0xFACE),
                Some(&[0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
                None,
                Some(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]),
            )
            .unwrap();
            written = f.length();
        }
        let f2 = Frame::parse(&mut mem[..written]).unwrap();
        let len = f2.length();
        assert_eq!(f2.fctrl() & PIDC_BIT, PIDC_BIT);
        assert!(f2.has_dest_pan());
        assert!(!f2.has_src_pan());
        assert_eq!(f2.dest_pan(), Some(0xFACE));
        assert_eq!(f2.dest_addr(), Some(&[0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF][..]));
        assert_eq!(f2.src_addr(), Some(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77][..]));
        assert_eq!(f2.seqnum(), Some(0xC1));
        assert_eq!(len, f2.payload_start());
    }
}
