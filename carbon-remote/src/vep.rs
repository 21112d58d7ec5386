//! The VEP container wire format: the framing used on every local-event
//! socket connection. A container is a small fixed header (ident, version,
//! type, flags, length, CRC, optional addressing) followed by 1..16
//! length-prefixed packets.
//!
//! "CRC-16/IBM" in the design is the catalog's `CRC_16_ARC` — same
//! polynomial (0x8005), init, and reflection, just a different name in
//! different references; noted once here rather than at every call site.

use carbon_core::{CarbonError, CarbonErrorKind, CarbonResult};

const IDENT: [u8; 4] = *b"VEP\0";
const VERSION: u8 = 1;
const FIXED_HEADER_LEN: usize = 14;
const ADDR_LEN: usize = 8;
const FLAG_ADDR_PRESENT: u16 = 0x0001;
const RESERVED_COUNT_SHIFT: u16 = 2;
const RESERVED_COUNT_MASK: u16 = 0b0111_1100;
const RESERVED_COUNT_MAX: usize = (RESERVED_COUNT_MASK >> RESERVED_COUNT_SHIFT) as usize;

pub const MAX_CONTAINER_LEN: usize = 32 * 1024;
pub const MAX_PACKETS: usize = 16;

const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_ARC);

/// One length-prefixed packet inside a container's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub type_: u8,
    pub reserved: u8,
    pub bytes: Vec<u8>,
}

impl Packet {
    #[must_use]
    pub fn new(type_: u8, bytes: Vec<u8>) -> Self { Self { type_, reserved: 0, bytes } }

    fn encoded_len(&self) -> usize { 4 + self.bytes.len() }

    fn encode_into(&self, out: &mut Vec<u8>) -> CarbonResult<()> {
        let len: u16 = self
            .bytes
            .len()
            .try_into()
            .map_err(|_| CarbonError::new(CarbonErrorKind::Invalid, "packet body exceeds 64 KiB"))?;
        out.push(self.type_);
        out.push(self.reserved);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.bytes);
        Ok(())
    }
}

/// A framed VEP container: header fields plus 1..16 packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub container_type: u8,
    pub src_addr: Option<u32>,
    pub dst_addr: Option<u32>,
    pub reserved_dwords: Vec<u32>,
    pub packets: Vec<Packet>,
}

impl Container {
    #[must_use]
    pub fn new(container_type: u8, packets: Vec<Packet>) -> Self {
        Self { container_type, src_addr: None, dst_addr: None, reserved_dwords: Vec::new(), packets }
    }

    #[must_use]
    pub fn with_addresses(mut self, src: u32, dst: u32) -> Self {
        self.src_addr = Some(src);
        self.dst_addr = Some(dst);
        self
    }

    fn flags(&self) -> CarbonResult<u16> {
        if self.reserved_dwords.len() > RESERVED_COUNT_MAX {
            return Err(CarbonError::new(
                CarbonErrorKind::Invalid,
                format!("too many reserved dwords ({} > {RESERVED_COUNT_MAX})", self.reserved_dwords.len()),
            ));
        }
        let mut flags = (self.reserved_dwords.len() as u16) << RESERVED_COUNT_SHIFT;
        if self.src_addr.is_some() || self.dst_addr.is_some() {
            flags |= FLAG_ADDR_PRESENT;
        }
        Ok(flags)
    }

    /// Serializes this container to its wire form, computing the CRC over
    /// header-with-zeroed-CRC-field plus payload.
    pub fn encode(&self) -> CarbonResult<Vec<u8>> {
        if self.packets.is_empty() || self.packets.len() > MAX_PACKETS {
            return Err(CarbonError::new(
                CarbonErrorKind::Invalid,
                format!("container must carry 1..={MAX_PACKETS} packets, got {}", self.packets.len()),
            ));
        }

        let mut payload = Vec::new();
        for packet in &self.packets {
            packet.encode_into(&mut payload)?;
        }

        let flags = self.flags()?;
        let payload_len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| CarbonError::new(CarbonErrorKind::Invalid, "payload too large to frame"))?;

        let mut header = Vec::with_capacity(FIXED_HEADER_LEN + ADDR_LEN + self.reserved_dwords.len() * 4);
        header.extend_from_slice(&IDENT);
        header.push(VERSION);
        header.push(self.container_type);
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&payload_len.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // CRC placeholder, filled below
        if let (Some(src), Some(dst)) = (self.src_addr, self.dst_addr) {
            header.extend_from_slice(&src.to_le_bytes());
            header.extend_from_slice(&dst.to_le_bytes());
        }
        for dword in &self.reserved_dwords {
            header.extend_from_slice(&dword.to_le_bytes());
        }

        let mut digest = CRC.digest();
        digest.update(&header);
        digest.update(&payload);
        let crc = digest.finalize();
        header[12..14].copy_from_slice(&crc.to_le_bytes());

        header.extend_from_slice(&payload);
        if header.len() > MAX_CONTAINER_LEN {
            return Err(CarbonError::new(
                CarbonErrorKind::Invalid,
                format!("container of {} bytes exceeds {MAX_CONTAINER_LEN} byte cap", header.len()),
            ));
        }
        Ok(header)
    }

    /// Parses a container from its wire form. Never panics on malformed
    /// input — every rejection path returns `CarbonErrorKind::Invalid`.
    pub fn decode(bytes: &[u8]) -> CarbonResult<Self> {
        if bytes.len() > MAX_CONTAINER_LEN {
            return Err(invalid(format!("container of {} bytes exceeds {MAX_CONTAINER_LEN} byte cap", bytes.len())));
        }
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(invalid("container shorter than the fixed header"));
        }
        if bytes[0..4] != IDENT {
            return Err(invalid("bad ident"));
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(invalid(format!("unsupported version {version}")));
        }
        let container_type = bytes[5];
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        let payload_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let wire_crc = u16::from_le_bytes([bytes[12], bytes[13]]);

        let mut offset = FIXED_HEADER_LEN;
        let has_addr = flags & FLAG_ADDR_PRESENT != 0;
        let (src_addr, dst_addr) = if has_addr {
            if bytes.len() < offset + ADDR_LEN {
                return Err(invalid("truncated address fields"));
            }
            let src = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            let dst = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            offset += ADDR_LEN;
            (Some(src), Some(dst))
        } else {
            (None, None)
        };

        let reserved_count = ((flags & RESERVED_COUNT_MASK) >> RESERVED_COUNT_SHIFT) as usize;
        if bytes.len() < offset + reserved_count * 4 {
            return Err(invalid("truncated reserved dwords"));
        }
        let mut reserved_dwords = Vec::with_capacity(reserved_count);
        for _ in 0..reserved_count {
            reserved_dwords.push(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()));
            offset += 4;
        }

        if bytes.len() != offset + payload_len {
            return Err(invalid("payload length mismatch"));
        }
        let payload = &bytes[offset..offset + payload_len];

        let mut header_for_crc = bytes[..offset].to_vec();
        header_for_crc[12..14].copy_from_slice(&0u16.to_le_bytes());
        let mut digest = CRC.digest();
        digest.update(&header_for_crc);
        digest.update(payload);
        if digest.finalize() != wire_crc {
            return Err(invalid("bad CRC"));
        }

        let packets = decode_packets(payload)?;

        Ok(Self { container_type, src_addr, dst_addr, reserved_dwords, packets })
    }
}

fn decode_packets(mut payload: &[u8]) -> CarbonResult<Vec<Packet>> {
    let mut packets = Vec::new();
    while !payload.is_empty() {
        if payload.len() < 4 {
            return Err(invalid("truncated packet header"));
        }
        let type_ = payload[0];
        let reserved = payload[1];
        let len = u16::from_le_bytes([payload[2], payload[3]]) as usize;
        if payload.len() < 4 + len {
            return Err(invalid("truncated packet body"));
        }
        packets.push(Packet { type_, reserved, bytes: payload[4..4 + len].to_vec() });
        payload = &payload[4 + len..];
        if packets.len() > MAX_PACKETS {
            return Err(invalid(format!("container carries more than {MAX_PACKETS} packets")));
        }
    }
    if packets.is_empty() {
        return Err(invalid("container carries no packets"));
    }
    Ok(packets)
}

pub(crate) fn invalid(message: impl Into<String>) -> CarbonError {
    let err = CarbonError::new(CarbonErrorKind::Invalid, message);
    tracing::warn!(message = %err.message, "dropping malformed container");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_packet_container() {
        let container = Container::new(1, vec![Packet::new(1, b"hello".to_vec())]);
        let wire = container.encode().unwrap();
        let decoded = Container::decode(&wire).unwrap();
        assert_eq!(decoded, container);
    }

    #[test]
    fn round_trips_addresses_and_reserved_dwords() {
        let mut container = Container::new(2, vec![Packet::new(3, vec![1, 2, 3])]).with_addresses(0xAAAA, 0xBBBB);
        container.reserved_dwords = vec![7, 8, 9];
        let wire = container.encode().unwrap();
        let decoded = Container::decode(&wire).unwrap();
        assert_eq!(decoded, container);
    }

    #[test]
    fn rejects_bad_ident() {
        let mut wire = Container::new(1, vec![Packet::new(1, vec![])]).encode().unwrap();
        wire[0] = b'X';
        assert_eq!(Container::decode(&wire).unwrap_err().kind, CarbonErrorKind::Invalid);
    }

    #[test]
    fn rejects_flipped_crc() {
        let mut wire = Container::new(1, vec![Packet::new(1, b"payload".to_vec())]).encode().unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert_eq!(Container::decode(&wire).unwrap_err().kind, CarbonErrorKind::Invalid);
    }

    #[test]
    fn rejects_length_mismatch_without_panicking() {
        let mut wire = Container::new(1, vec![Packet::new(1, b"payload".to_vec())]).encode().unwrap();
        wire.truncate(wire.len() - 2);
        assert_eq!(Container::decode(&wire).unwrap_err().kind, CarbonErrorKind::Invalid);
    }

    #[test]
    fn rejects_more_than_sixteen_packets() {
        let packets = (0..17).map(|i| Packet::new(1, vec![i])).collect();
        let err = Container::new(1, packets).encode().unwrap_err();
        assert_eq!(err.kind, CarbonErrorKind::Invalid);
    }

    #[test]
    fn decode_never_panics_on_random_short_input() {
        for len in 0..64 {
            let garbage: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let _ = Container::decode(&garbage);
        }
    }
}
