//! RFC 6282 LOWPAN_IPHC header compression and decompression.
//!
//! Scope: the base IPHC encoding (traffic class/flow label elision, hop
//! limit elision, stateless and context-based address compression,
//! multicast address compression) over a single, non-fragmented datagram.
//! LOWPAN_NHC compression of upper-layer headers (UDP, extension headers)
//! is out of scope; the Next Header field is always carried inline.

use crate::error::CodecError;
use crate::ieee802154::{extended_to_iid, iid_to_short, short_to_iid};
use crate::sixlo::context::ContextTable;
use crate::sixlo::ipv6::Ipv6Packet;
use log::{debug, warn};

const DISPATCH: u8 = 0b0110_0000;
const DISPATCH_MASK: u8 = 0b1110_0000;

bitflags::bitflags! {
    /// IPHC byte 0: dispatch | TF(2) | NH(1) | HLIM(2).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct IphcFlags0: u8 {
        const TCFL_FULL    = 0b0000_0000;
        const TCFL_NO_DSCP = 0b0000_1000;
        const TCFL_NO_FL   = 0b0001_0000;
        const TCFL_ELIDE   = 0b0001_1000;
        const TF_MASK      = 0b0001_1000;

        const NEXT_HDR_COMPRESS = 0b0000_0100;

        const HLIM_INLINE = 0b0000_0000;
        const HOP_LIMIT1  = 0b0000_0001;
        const HOP_LIMIT64 = 0b0000_0010;
        const HOP_LIMIT255 = 0b0000_0011;
        const HLIM_MASK   = 0b0000_0011;
    }
}

bitflags::bitflags! {
    /// IPHC byte 1: CID(1) | SAC(1) | SAM(2) | M(1) | DAC(1) | DAM(2).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct IphcFlags1: u8 {
        const CID_EXT = 0b1000_0000;

        const SAC_STATEFUL = 0b0100_0000;
        const SAM_128BIT_UNSPEC = 0b0000_0000;
        const SAM_64BIT = 0b0001_0000;
        const SAM_16BIT = 0b0010_0000;
        const SAM_0BIT  = 0b0011_0000;
        const SAM_MASK  = 0b0011_0000;

        const MCAST_COMPRESS = 0b0000_1000;
        const DAC_STATEFUL   = 0b0000_0100;

        const DAM_FULL  = 0b0000_0000;
        const DAM_64BIT = 0b0000_0001;
        const DAM_16BIT = 0b0000_0010;
        const DAM_0BIT  = 0b0000_0011;
        const DAM_MASK  = 0b0000_0011;
    }
}

/// The link-layer address a frame was carried with, used to derive (or
/// match, on the decompress side) elided interface identifiers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum L2Addr {
    None,
    Short(u16),
    Extended([u8; 8]),
}

impl L2Addr {
    fn iid(self) -> Option<[u8; 8]> {
        match self {
            L2Addr::None => None,
            L2Addr::Short(s) => Some(short_to_iid(s)),
            L2Addr::Extended(e) => Some(extended_to_iid(e)),
        }
    }
}

fn next<'i>(input: &'i [u8], cursor: &mut usize, len: usize) -> Result<&'i [u8], CodecError> {
    let end = cursor.checked_add(len).ok_or(CodecError::MalformedHeader)?;
    let s = input.get(*cursor..end).ok_or(CodecError::MalformedHeader)?;
    *cursor = end;
    Ok(s)
}

const LINK_LOCAL_PREFIX: [u8; 2] = [0xFE, 0x80];

fn is_link_local(addr: &[u8; 16]) -> bool {
    addr[0..2] == LINK_LOCAL_PREFIX && addr[2..8] == [0u8; 6]
}

/// sac/dac + sam/dam classification of a non-multicast address, shared by
/// the source and destination sides.
struct UnicastForm {
    stateful: bool,
    code: u8,
    cid: Option<u8>,
    inline_len: usize,
}

fn classify_unicast(addr: &[u8; 16], l2: L2Addr, ctx: &ContextTable) -> UnicastForm {
    if *addr == [0u8; 16] {
        return UnicastForm { stateful: true, code: 0b00, cid: None, inline_len: 0 };
    }

    let l2_iid = l2.iid();
    let matches_l2 = l2_iid.map(|iid| iid == addr[8..16]).unwrap_or(false);
    let as_short = iid_to_short(&{
        let mut iid = [0u8; 8];
        iid.copy_from_slice(&addr[8..16]);
        iid
    });

    if is_link_local(addr) {
        if matches_l2 {
            UnicastForm { stateful: false, code: 0b11, cid: None, inline_len: 0 }
        } else if as_short.is_some() {
            UnicastForm { stateful: false, code: 0b10, cid: None, inline_len: 2 }
        } else {
            UnicastForm { stateful: false, code: 0b01, cid: None, inline_len: 8 }
        }
    } else if let Some(cid) = ctx.find_by_window(addr, 0, 8).filter(|&id| id != 0) {
        if matches_l2 {
            UnicastForm { stateful: true, code: 0b11, cid: Some(cid), inline_len: 0 }
        } else if as_short.is_some() {
            UnicastForm { stateful: true, code: 0b10, cid: Some(cid), inline_len: 2 }
        } else {
            UnicastForm { stateful: true, code: 0b01, cid: Some(cid), inline_len: 8 }
        }
    } else {
        UnicastForm { stateful: false, code: 0b00, cid: None, inline_len: 16 }
    }
}

fn unicast_inline_bytes(addr: &[u8; 16], form: &UnicastForm) -> &[u8] {
    match form.inline_len {
        0 => &[],
        2 => &addr[14..16],
        8 => &addr[8..16],
        16 => &addr[0..16],
        _ => unreachable!(),
    }
}

struct MulticastForm {
    stateful: bool,
    code: u8,
    cid: Option<u8>,
}

fn classify_multicast(addr: &[u8; 16], ctx: &ContextTable) -> MulticastForm {
    if let Some(cid) = ctx.find_by_window(addr, 3, 9).filter(|&id| id != 0) {
        return MulticastForm { stateful: true, code: 0b00, cid: Some(cid) };
    }
    if addr[1] == 0x02 && addr[2..15] == [0u8; 13] {
        MulticastForm { stateful: false, code: 0b11, cid: None }
    } else if addr[2..13] == [0u8; 11] {
        MulticastForm { stateful: false, code: 0b10, cid: None }
    } else if addr[2..11] == [0u8; 9] {
        MulticastForm { stateful: false, code: 0b01, cid: None }
    } else {
        MulticastForm { stateful: false, code: 0b00, cid: None }
    }
}

fn multicast_inline(addr: &[u8; 16], form: &MulticastForm, out: &mut [u8; 16]) -> usize {
    if form.stateful {
        out[0] = addr[1];
        out[1] = addr[2];
        out[2..6].copy_from_slice(&addr[12..16]);
        6
    } else {
        match form.code {
            0b11 => {
                out[0] = addr[15];
                1
            }
            0b10 => {
                out[0] = addr[1];
                out[1..4].copy_from_slice(&addr[13..16]);
                4
            }
            0b01 => {
                out[0] = addr[1];
                out[1..6].copy_from_slice(&addr[11..16]);
                6
            }
            _ => {
                out[0..16].copy_from_slice(addr);
                16
            }
        }
    }
}

/// Compress `pkt`'s IPv6 header into `out`, given the link-layer addresses
/// the frame is (or will be) carried with. Returns the number of bytes
/// written. The IPv6 payload itself is not touched; callers append it to
/// the frame separately.
pub fn compress(
    pkt: &Ipv6Packet<'_>,
    src_l2: L2Addr,
    dest_l2: L2Addr,
    ctx: &ContextTable,
    out: &mut [u8],
) -> Result<usize, CodecError> {
    let mut n = 0usize;
    let put = |b: &[u8], out: &mut [u8], n: &mut usize| -> Result<(), CodecError> {
        let end = n.checked_add(b.len()).ok_or(CodecError::CapacityExceeded)?;
        if end > out.len() {
            return Err(CodecError::CapacityExceeded);
        }
        out[*n..end].copy_from_slice(b);
        *n = end;
        Ok(())
    };

    // Reserve byte0/byte1, filled in once the rest is known.
    put(&[0, 0], out, &mut n)?;

    let tc = pkt.traffic_class();
    let fl = pkt.flow_label();
    let dscp = tc & 0b0011_1111;
    let ecn = tc >> 6;

    let mut flags0 = IphcFlags0::empty();
    if fl == 0 && tc == 0 {
        flags0 |= IphcFlags0::TCFL_ELIDE;
    } else if fl == 0 {
        flags0 |= IphcFlags0::TCFL_NO_FL;
        put(&[tc], out, &mut n)?;
    } else if dscp == 0 {
        flags0 |= IphcFlags0::TCFL_NO_DSCP;
        let b0 = (ecn << 6) | ((fl >> 16) as u8 & 0x0F);
        put(&[b0, (fl >> 8) as u8, fl as u8], out, &mut n)?;
    } else {
        flags0 |= IphcFlags0::TCFL_FULL;
        let b1 = (fl >> 16) as u8 & 0x0F;
        put(&[tc, b1, (fl >> 8) as u8, fl as u8], out, &mut n)?;
    }

    // Next Header is always carried inline; LOWPAN_NHC is not implemented.
    put(&[pkt.next_header()], out, &mut n)?;

    let hl = pkt.hop_limit();
    if hl == 1 {
        flags0 |= IphcFlags0::HOP_LIMIT1;
    } else if hl == 64 {
        flags0 |= IphcFlags0::HOP_LIMIT64;
    } else if hl == 255 {
        flags0 |= IphcFlags0::HOP_LIMIT255;
    } else {
        put(&[hl], out, &mut n)?;
    }

    let src = pkt.src();
    let dest = pkt.dest();
    let src_form = classify_unicast(&src, src_l2, ctx);

    let mut flags1 = IphcFlags1::empty();
    if src_form.stateful {
        flags1 |= IphcFlags1::SAC_STATEFUL;
    }
    flags1.bits |= (src_form.code << 4) & IphcFlags1::SAM_MASK.bits;

    let (dest_stateful_multi, dest_code, dest_cid, dest_inline, dest_inline_len, is_multi) =
        if dest[0] == 0xFF {
            let form = classify_multicast(&dest, ctx);
            let mut buf = [0u8; 16];
            let len = multicast_inline(&dest, &form, &mut buf);
            (form.stateful, form.code, form.cid, buf, len, true)
        } else {
            let form = classify_unicast(&dest, dest_l2, ctx);
            let mut buf = [0u8; 16];
            let bytes = unicast_inline_bytes(&dest, &form);
            buf[..bytes.len()].copy_from_slice(bytes);
            (form.stateful, form.code, form.cid, buf, bytes.len(), false)
        };

    if is_multi {
        flags1 |= IphcFlags1::MCAST_COMPRESS;
    }
    if dest_stateful_multi {
        flags1 |= IphcFlags1::DAC_STATEFUL;
    }
    flags1.bits |= dest_code & IphcFlags1::DAM_MASK.bits;

    let src_cid = src_form.cid.unwrap_or(0);
    let dst_cid = dest_cid.unwrap_or(0);
    if src_cid != 0 || dst_cid != 0 {
        flags1 |= IphcFlags1::CID_EXT;
    }

    out[0] = DISPATCH | flags0.bits;
    out[1] = flags1.bits;

    // The CIE byte (if needed) and the two addresses are inserted after
    // byte0/byte1 but before the inline TC/FL/NH/HLIM bytes we already
    // appended; shift them down rather than re-deriving their content.
    let tail_start = 2;
    let tail_len = n - tail_start;
    let mut tail = [0u8; 8];
    tail[..tail_len].copy_from_slice(&out[tail_start..n]);
    n = tail_start;

    if flags1.contains(IphcFlags1::CID_EXT) {
        put(&[(src_cid << 4) | dst_cid], out, &mut n)?;
    }
    put(&tail[..tail_len], out, &mut n)?;

    let src_inline = unicast_inline_bytes(&src, &src_form);
    put(src_inline, out, &mut n)?;
    put(&dest_inline[..dest_inline_len], out, &mut n)?;

    Ok(n)
}

/// Decompress an IPHC header from `input`, writing the reconstructed IPv6
/// header (and trailing payload, copied verbatim) into `pkt`. Returns the
/// number of bytes of `input` consumed by the IPHC header itself.
pub fn decompress(
    input: &[u8],
    src_l2: L2Addr,
    dest_l2: L2Addr,
    ctx: &ContextTable,
    pkt: &mut Ipv6Packet<'_>,
) -> Result<usize, CodecError> {
    if input.is_empty() || input[0] & DISPATCH_MASK != DISPATCH {
        debug!("decompress: first byte {:#04x} is not an IPHC dispatch", input.first().copied().unwrap_or(0));
        return Err(CodecError::NotIphc);
    }
    if input.len() < 2 {
        return Err(CodecError::MalformedHeader);
    }
    let flags0 = IphcFlags0::from_bits_truncate(input[0]);
    let flags1 = IphcFlags1::from_bits_truncate(input[1]);
    let mut cursor = 2usize;

    let (src_cid, dst_cid) = if flags1.contains(IphcFlags1::CID_EXT) {
        let b = next(input, &mut cursor, 1)?[0];
        (b >> 4, b & 0x0F)
    } else {
        (0, 0)
    };

    let tf = flags0.bits & IphcFlags0::TF_MASK.bits;
    let (tc, fl) = if tf == IphcFlags0::TCFL_ELIDE.bits {
        (0u8, 0u32)
    } else if tf == IphcFlags0::TCFL_NO_FL.bits {
        (next(input, &mut cursor, 1)?[0], 0u32)
    } else if tf == IphcFlags0::TCFL_NO_DSCP.bits {
        let b = next(input, &mut cursor, 3)?;
        let ecn = b[0] >> 6;
        let fl = (u32::from(b[0] & 0x0F) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        (ecn << 6, fl)
    } else {
        let b = next(input, &mut cursor, 4)?;
        let fl = (u32::from(b[1] & 0x0F) << 16) | (u32::from(b[2]) << 8) | u32::from(b[3]);
        (b[0], fl)
    };

    let nh = if flags0.contains(IphcFlags0::NEXT_HDR_COMPRESS) {
        warn!("decompress: LOWPAN_NHC next-header compression is not supported");
        return Err(CodecError::MalformedHeader);
    } else {
        next(input, &mut cursor, 1)?[0]
    };

    let hlim_bits = flags0.bits & IphcFlags0::HLIM_MASK.bits;
    let hl = if hlim_bits == IphcFlags0::HOP_LIMIT1.bits {
        1
    } else if hlim_bits == IphcFlags0::HOP_LIMIT64.bits {
        64
    } else if hlim_bits == IphcFlags0::HOP_LIMIT255.bits {
        255
    } else {
        next(input, &mut cursor, 1)?[0]
    };

    let sac = flags1.contains(IphcFlags1::SAC_STATEFUL);
    let sam = flags1.bits & IphcFlags1::SAM_MASK.bits;
    let src = reconstruct_unicast(sac, sam >> 4, src_cid, src_l2, ctx, input, &mut cursor)?;

    let m = flags1.contains(IphcFlags1::MCAST_COMPRESS);
    let dac = flags1.contains(IphcFlags1::DAC_STATEFUL);
    let dam = flags1.bits & IphcFlags1::DAM_MASK.bits;
    let dest = if m {
        reconstruct_multicast(dac, dam, dst_cid, ctx, input, &mut cursor)?
    } else {
        reconstruct_unicast(dac, dam, dst_cid, dest_l2, ctx, input, &mut cursor)?
    };

    pkt.set_traffic_class(tc)?;
    pkt.set_flow_label(fl)?;
    pkt.set_next_header(nh)?;
    pkt.set_hop_limit(hl)?;
    pkt.set_src(&src)?;
    pkt.set_dest(&dest)?;

    Ok(cursor)
}

fn reconstruct_unicast(
    stateful: bool,
    code: u8,
    cid: u8,
    l2: L2Addr,
    ctx: &ContextTable,
    input: &[u8],
    cursor: &mut usize,
) -> Result<[u8; 16], CodecError> {
    let mut addr = [0u8; 16];

    if stateful {
        if code == 0b00 {
            // SAC=1, SAM=00 is reserved by RFC 6282 for the unspecified
            // address `::` regardless of any accompanying context id.
        } else {
            let c = ctx.get(cid).ok_or_else(|| {
                warn!("decompress: source context {} not installed", cid);
                CodecError::UnknownContext
            })?;
            addr[0..8].copy_from_slice(&c.prefix[0..8]);
            match code {
                0b10 => {
                    let b = next(input, cursor, 2)?;
                    addr[8..16].copy_from_slice(&short_to_iid(u16::from_be_bytes([b[0], b[1]])));
                }
                0b11 => {
                    let iid = l2.iid().ok_or(CodecError::MalformedHeader)?;
                    addr[8..16].copy_from_slice(&iid);
                }
                _ => {
                    let b = next(input, cursor, 8)?;
                    addr[8..16].copy_from_slice(b);
                }
            }
        }
    } else {
        match code {
            0b00 => {
                let b = next(input, cursor, 16)?;
                addr.copy_from_slice(b);
                return Ok(addr);
            }
            0b01 => {
                addr[0..2].copy_from_slice(&LINK_LOCAL_PREFIX);
                let b = next(input, cursor, 8)?;
                addr[8..16].copy_from_slice(b);
            }
            0b10 => {
                addr[0..2].copy_from_slice(&LINK_LOCAL_PREFIX);
                let b = next(input, cursor, 2)?;
                addr[8..16].copy_from_slice(&short_to_iid(u16::from_be_bytes([b[0], b[1]])));
            }
            0b11 => {
                addr[0..2].copy_from_slice(&LINK_LOCAL_PREFIX);
                let iid = l2.iid().ok_or(CodecError::MalformedHeader)?;
                addr[8..16].copy_from_slice(&iid);
            }
            _ => unreachable!(),
        }
    }
    Ok(addr)
}

fn reconstruct_multicast(
    stateful: bool,
    dam: u8,
    cid: u8,
    ctx: &ContextTable,
    input: &[u8],
    cursor: &mut usize,
) -> Result<[u8; 16], CodecError> {
    let mut addr = [0u8; 16];
    addr[0] = 0xFF;

    if stateful {
        let c = ctx.get(cid).ok_or_else(|| {
            warn!("decompress: destination context {} not installed", cid);
            CodecError::UnknownContext
        })?;
        let b = next(input, cursor, 6)?;
        addr[1] = b[0];
        addr[2] = b[1];
        addr[3..12].copy_from_slice(&c.prefix[3..12]);
        addr[12..16].copy_from_slice(&b[2..6]);
        return Ok(addr);
    }

    match dam {
        0b00 => {
            let b = next(input, cursor, 16)?;
            addr.copy_from_slice(b);
        }
        0b01 => {
            let b = next(input, cursor, 6)?;
            addr[1] = b[0];
            addr[11..16].copy_from_slice(&b[1..6]);
        }
        0b10 => {
            let b = next(input, cursor, 4)?;
            addr[1] = b[0];
            addr[13..16].copy_from_slice(&b[1..4]);
        }
        0b11 => {
            let b = next(input, cursor, 1)?;
            addr[1] = 0x02;
            addr[15] = b[0];
        }
        _ => unreachable!(),
    }
    Ok(addr)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sixlo::context::Context;

    fn packet(buf: &mut [u8], tc: u8, fl: u32, hl: u8, nh: u8, src: [u8; 16], dest: [u8; 16]) -> Ipv6Packet<'_> {
        let mut pkt = Ipv6Packet::init(buf).unwrap();
        pkt.set_traffic_class(tc).unwrap();
        pkt.set_flow_label(fl).unwrap();
        pkt.set_hop_limit(hl).unwrap();
        pkt.set_next_header(nh).unwrap();
        pkt.set_src(&src).unwrap();
        pkt.set_dest(&dest).unwrap();
        pkt
    }

    #[test]
    fn link_local_src_derived_from_l2_elides_entirely() {
        let ctx = ContextTable::new();
        let mut mem = [0u8; 40];
        let src_l2 = L2Addr::Extended([1, 2, 3, 4, 5, 6, 7, 8]);
        let mut src = [0u8; 16];
        src[0..2].copy_from_slice(&[0xFE, 0x80]);
        src[8..16].copy_from_slice(&extended_to_iid([1, 2, 3, 4, 5, 6, 7, 8]));
        let dest = src;
        let pkt = packet(&mut mem, 0, 0, 64, 17, src, dest);

        let mut out = [0u8; 48];
        let n = compress(&pkt, src_l2, src_l2, &ctx, &mut out).unwrap();
        // dispatch, TF elided, HLIM=64 compressed, NH inline => byte0 has no inline TC/FL.
        assert_eq!(out[0] & 0b1110_0000, DISPATCH);
        assert!(IphcFlags0::from_bits_truncate(out[0]).contains(IphcFlags0::TCFL_ELIDE));
        assert!(IphcFlags0::from_bits_truncate(out[0]).contains(IphcFlags0::HOP_LIMIT64));

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        let consumed = decompress(&out[..n], src_l2, src_l2, &ctx, &mut out_pkt).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(out_pkt.src(), src);
        assert_eq!(out_pkt.dest(), dest);
        assert_eq!(out_pkt.hop_limit(), 64);
        assert_eq!(out_pkt.next_header(), 17);
    }

    #[test]
    fn context_src_with_differing_iid_carries_64_bits_inline() {
        let mut ctx = ContextTable::new();
        let mut prefix = [0u8; 16];
        prefix[0..8].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0]);
        ctx.put(1, Context { prefix, prefix_len: 64, compress: true }).unwrap();

        let mut src = [0u8; 16];
        src[0..8].copy_from_slice(&prefix[0..8]);
        src[8..16].copy_from_slice(&[0xAA; 8]);
        let l2 = L2Addr::Extended([1; 8]);

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 255, 58, src, src);
        let mut out = [0u8; 48];
        let n = compress(&pkt, l2, l2, &ctx, &mut out).unwrap();

        let flags1 = IphcFlags1::from_bits_truncate(out[1]);
        assert!(flags1.contains(IphcFlags1::SAC_STATEFUL));
        assert_eq!(flags1.bits & IphcFlags1::SAM_MASK.bits, IphcFlags1::SAM_64BIT.bits);
        assert!(flags1.contains(IphcFlags1::CID_EXT));

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], l2, l2, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.src(), src);
    }

    #[test]
    fn context_src_matching_l2_iid_elides_entirely() {
        let mut ctx = ContextTable::new();
        let mut prefix = [0u8; 16];
        prefix[0..8].copy_from_slice(&[0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70]);
        ctx.put(1, Context { prefix, prefix_len: 64, compress: true }).unwrap();

        let mut src = [0u8; 16];
        src[0..8].copy_from_slice(&prefix[0..8]);
        src[8..16].copy_from_slice(&short_to_iid(0x1122));
        let l2 = L2Addr::Short(0x1122);

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 64, 58, src, src);
        let mut out = [0u8; 48];
        let n = compress(&pkt, l2, L2Addr::None, &ctx, &mut out).unwrap();

        let flags1 = IphcFlags1::from_bits_truncate(out[1]);
        assert!(flags1.contains(IphcFlags1::CID_EXT));
        assert!(flags1.contains(IphcFlags1::SAC_STATEFUL));
        assert_eq!(flags1.bits & IphcFlags1::SAM_MASK.bits, IphcFlags1::SAM_0BIT.bits);

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], l2, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.src(), src);
    }

    #[test]
    fn multicast_8bit_compresses_to_a_single_byte() {
        let ctx = ContextTable::new();
        let mut dest = [0u8; 16];
        dest[0] = 0xFF;
        dest[1] = 0x02;
        dest[15] = 0x11;
        let src_l2 = L2Addr::Extended([9; 8]);

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 255, 58, dest, dest);
        let mut out = [0u8; 48];
        let n = compress(&pkt, src_l2, L2Addr::None, &ctx, &mut out).unwrap();

        let flags1 = IphcFlags1::from_bits_truncate(out[1]);
        assert!(flags1.contains(IphcFlags1::MCAST_COMPRESS));
        assert_eq!(flags1.bits & IphcFlags1::DAM_MASK.bits, IphcFlags1::DAM_0BIT.bits);

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], src_l2, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.dest(), dest);
    }

    #[test]
    fn multicast_32bit_inline_is_flag_byte_plus_three_group_bytes() {
        let ctx = ContextTable::new();
        let mut dest = [0u8; 16];
        dest[0] = 0xFF;
        dest[1] = 0x04;
        dest[13] = 0x11;
        dest[14] = 0x22;
        dest[15] = 0x33;

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 255, 58, dest, dest);
        let mut out = [0u8; 48];
        let n = compress(&pkt, L2Addr::None, L2Addr::None, &ctx, &mut out).unwrap();

        let flags1 = IphcFlags1::from_bits_truncate(out[1]);
        assert_eq!(flags1.bits & IphcFlags1::DAM_MASK.bits, IphcFlags1::DAM_16BIT.bits);

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], L2Addr::None, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.dest(), dest);
    }

    #[test]
    fn multicast_48bit_inline_is_flag_byte_plus_five_group_bytes() {
        let ctx = ContextTable::new();
        let mut dest = [0u8; 16];
        dest[0] = 0xFF;
        dest[1] = 0x06;
        dest[11] = 0x11;
        dest[12] = 0x22;
        dest[13] = 0x33;
        dest[14] = 0x44;
        dest[15] = 0x55;

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 255, 58, dest, dest);
        let mut out = [0u8; 48];
        let n = compress(&pkt, L2Addr::None, L2Addr::None, &ctx, &mut out).unwrap();

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], L2Addr::None, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.dest(), dest);
    }

    #[test]
    fn context_multicast_reconstructs_prefix_window_from_context() {
        let mut ctx = ContextTable::new();
        let prefix = [0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0, 0, 0, 0, 0, 0, 0, 0];
        ctx.put(1, Context { prefix, prefix_len: 64, compress: true }).unwrap();

        let expected_dest: [u8; 16] = [
            0xFF, 0xD0, 0x0D, 0x30, 0x40, 0x50, 0x60, 0x70, 0, 0, 0, 0, 0x11, 0x22, 0x33, 0x44,
        ];

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0, 0, 255, 58, expected_dest, expected_dest);
        let mut out = [0u8; 48];
        let n = compress(&pkt, L2Addr::None, L2Addr::None, &ctx, &mut out).unwrap();

        let flags1 = IphcFlags1::from_bits_truncate(out[1]);
        assert!(flags1.contains(IphcFlags1::MCAST_COMPRESS));
        assert!(flags1.contains(IphcFlags1::DAC_STATEFUL));

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], L2Addr::None, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.dest(), expected_dest);
    }

    #[test]
    fn full_traffic_class_and_flow_label_round_trip_when_both_nonzero() {
        let ctx = ContextTable::new();
        let mut src = [0u8; 16];
        src[0] = 0x20;
        let mut dest = src;
        dest[15] = 1;

        let mut mem = [0u8; 40];
        let pkt = packet(&mut mem, 0xAB, 0x0ABCDE, 42, 6, src, dest);
        let mut out = [0u8; 48];
        let n = compress(&pkt, L2Addr::None, L2Addr::None, &ctx, &mut out).unwrap();
        assert_eq!(out[0] & IphcFlags0::TF_MASK.bits, IphcFlags0::TCFL_FULL.bits);

        let mut mem2 = [0u8; 40];
        let mut out_pkt = Ipv6Packet::init(&mut mem2).unwrap();
        decompress(&out[..n], L2Addr::None, L2Addr::None, &ctx, &mut out_pkt).unwrap();
        assert_eq!(out_pkt.traffic_class(), 0xAB);
        assert_eq!(out_pkt.flow_label(), 0x0ABCDE);
        assert_eq!(out_pkt.hop_limit(), 42);
        assert_eq!(out_pkt.next_header(), 6);
    }
}
