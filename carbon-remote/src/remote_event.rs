//! The one payload shape carried over the VEP wire: a packet body of
//! `{event_type, pparam, nparam, session_id, reply_rid, payload_len,
//! payload}`, per the design's §6 framing.

use carbon_core::CarbonResult;

use crate::vep::{invalid, Container, Packet};

pub const CONTAINER_TYPE_REMOTE_EVENT: u8 = 1;
pub const PACKET_TYPE_REMOTE_EVENT: u8 = 1;

const HEADER_LEN: usize = 4 + 8 + 8 + 4; // event_type + pparam + nparam + session_id

/// An event that has crossed (or is about to cross) a process boundary.
/// `reply_rid` names the sender's own RID so the receiver knows where to
/// post a reply; `session_id == 0` means "no session" on the wire, mirroring
/// `carbon_core::SessionId`'s `Option` representation in-process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub event_type: u32,
    pub pparam: u64,
    pub nparam: u64,
    pub session_id: u32,
    pub reply_rid: String,
    pub payload: Vec<u8>,
}

impl RemoteEvent {
    pub fn encode_packet(&self) -> CarbonResult<Packet> {
        if self.reply_rid.as_bytes().contains(&0) {
            return Err(invalid("reply_rid must not contain a NUL byte"));
        }
        let payload_len: u32 = self
            .payload
            .len()
            .try_into()
            .map_err(|_| invalid("remote event payload too large to frame"))?;

        let mut body = Vec::with_capacity(HEADER_LEN + self.reply_rid.len() + 1 + 4 + self.payload.len());
        body.extend_from_slice(&self.event_type.to_le_bytes());
        body.extend_from_slice(&self.pparam.to_le_bytes());
        body.extend_from_slice(&self.nparam.to_le_bytes());
        body.extend_from_slice(&self.session_id.to_le_bytes());
        body.extend_from_slice(self.reply_rid.as_bytes());
        body.push(0);
        body.extend_from_slice(&payload_len.to_le_bytes());
        body.extend_from_slice(&self.payload);
        Ok(Packet::new(PACKET_TYPE_REMOTE_EVENT, body))
    }

    pub fn decode_packet(packet: &Packet) -> CarbonResult<Self> {
        if packet.type_ != PACKET_TYPE_REMOTE_EVENT {
            return Err(invalid(format!("expected remote-event packet type {PACKET_TYPE_REMOTE_EVENT}, got {}", packet.type_)));
        }
        let bytes = &packet.bytes;
        if bytes.len() < HEADER_LEN {
            return Err(invalid("remote event packet shorter than its fixed header"));
        }
        let event_type = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let pparam = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let nparam = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
        let session_id = u32::from_le_bytes(bytes[20..24].try_into().unwrap());

        let rest = &bytes[HEADER_LEN..];
        let nul_at = rest.iter().position(|&b| b == 0).ok_or_else(|| invalid("reply_rid is not NUL-terminated"))?;
        let reply_rid = std::str::from_utf8(&rest[..nul_at])
            .map_err(|_| invalid("reply_rid is not valid UTF-8"))?
            .to_string();

        let after_rid = &rest[nul_at + 1..];
        if after_rid.len() < 4 {
            return Err(invalid("remote event packet missing payload length"));
        }
        let payload_len = u32::from_le_bytes(after_rid[0..4].try_into().unwrap()) as usize;
        let payload = &after_rid[4..];
        if payload.len() != payload_len {
            return Err(invalid("remote event payload length mismatch"));
        }

        Ok(Self { event_type, pparam, nparam, session_id, reply_rid, payload: payload.to_vec() })
    }

    pub fn to_container(&self) -> CarbonResult<Container> {
        Ok(Container::new(CONTAINER_TYPE_REMOTE_EVENT, vec![self.encode_packet()?]))
    }

    pub fn from_container(container: &Container) -> CarbonResult<Self> {
        let packet = container
            .packets
            .first()
            .ok_or_else(|| invalid("remote event container carries no packets"))?;
        Self::decode_packet(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::CarbonErrorKind;

    fn sample() -> RemoteEvent {
        RemoteEvent {
            event_type: 42,
            pparam: 0,
            nparam: 7,
            session_id: 1,
            reply_rid: "carbon.demo".to_string(),
            payload: b"hi".to_vec(),
        }
    }

    #[test]
    fn round_trips_through_a_container() {
        let ev = sample();
        let container = ev.to_container().unwrap();
        let wire = container.encode().unwrap();
        let decoded_container = Container::decode(&wire).unwrap();
        let decoded = RemoteEvent::from_container(&decoded_container).unwrap();
        assert_eq!(decoded, ev);
    }

    #[test]
    fn rejects_embedded_nul_in_reply_rid() {
        let mut ev = sample();
        ev.reply_rid = "bad\0rid".to_string();
        assert_eq!(ev.encode_packet().unwrap_err().kind, CarbonErrorKind::Invalid);
    }

    #[test]
    fn decode_rejects_truncated_body_without_panicking() {
        let packet = Packet::new(PACKET_TYPE_REMOTE_EVENT, vec![1, 2, 3]);
        assert_eq!(RemoteEvent::decode_packet(&packet).unwrap_err().kind, CarbonErrorKind::Invalid);
    }
}
