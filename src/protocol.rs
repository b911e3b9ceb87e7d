//! Art-Net packet parsing
//!
//! Only the framing needed to locate a universe and its channel data is
//! validated: the 7-byte `Art-Net` signature and a minimum length. Anything
//! else sharing the UDP port is rejected without side effects.
//!
//! ```text
//! 0        7  8     10     12    13    14      16      18
//! ┌─────────┬──┬──────┬──────┬─────┬─────┬───────┬───────┬──────────────┐
//! │ Art-Net │\0│OpCode│ProtVer│ Seq │Phys │Univ LE│Len BE │ DMX data ... │
//! └─────────┴──┴──────┴──────┴─────┴─────┴───────┴───────┴──────────────┘
//! ```

use crate::constants::DMX_UNIVERSE_SIZE;

/// Packet signature compared against the first bytes of a datagram
pub const ARTNET_SIGNATURE: &[u8; 7] = b"Art-Net";

/// Offset of the little-endian universe id
pub const UNIVERSE_OFFSET: usize = 14;

/// Offset of the first DMX channel byte
pub const HEADER_SIZE: usize = 18;

/// A parsed DMX update borrowing its payload from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmxUpdate<'a> {
    pub universe: u16,
    pub payload: &'a [u8],
}

/// Why a datagram was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Datagram is not longer than the header
    TooShort(usize),
    /// First bytes are not the Art-Net signature
    BadSignature,
}

/// Parse a received datagram.
///
/// Accepts datagrams longer than [`HEADER_SIZE`] that start with
/// [`ARTNET_SIGNATURE`]. The payload is capped at 512 bytes.
pub fn parse(datagram: &[u8]) -> Result<DmxUpdate<'_>, Rejected> {
    if datagram.len() <= HEADER_SIZE {
        return Err(Rejected::TooShort(datagram.len()));
    }
    if &datagram[..ARTNET_SIGNATURE.len()] != ARTNET_SIGNATURE {
        return Err(Rejected::BadSignature);
    }

    let universe = u16::from_le_bytes([datagram[UNIVERSE_OFFSET], datagram[UNIVERSE_OFFSET + 1]]);
    let len = (datagram.len() - HEADER_SIZE).min(DMX_UNIVERSE_SIZE);

    Ok(DmxUpdate {
        universe,
        payload: &datagram[HEADER_SIZE..HEADER_SIZE + len],
    })
}

/// Build an ArtDmx (OpDmx) datagram. Used by tests, benchmarks and tools
/// that need to feed the receiver.
pub fn build_artdmx(universe: u16, sequence: u8, data: &[u8]) -> Vec<u8> {
    let data = &data[..data.len().min(DMX_UNIVERSE_SIZE)];
    let mut packet = Vec::with_capacity(HEADER_SIZE + data.len());

    packet.extend_from_slice(b"Art-Net\0");
    // OpCode: OpDmx (0x5000), little-endian
    packet.extend_from_slice(&0x5000u16.to_le_bytes());
    // Protocol version 14, big-endian
    packet.extend_from_slice(&14u16.to_be_bytes());
    packet.push(sequence);
    packet.push(0);
    packet.extend_from_slice(&universe.to_le_bytes());
    packet.extend_from_slice(&(data.len() as u16).to_be_bytes());
    packet.extend_from_slice(data);

    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_universe_and_payload() {
        let packet = build_artdmx(2, 0, &[10, 20, 30]);
        let update = parse(&packet).unwrap();

        assert_eq!(packet[14], 0x02);
        assert_eq!(packet[15], 0x00);
        assert_eq!(update.universe, 2);
        assert_eq!(update.payload, &[10, 20, 30]);
    }

    #[test]
    fn test_universe_is_little_endian() {
        let mut packet = build_artdmx(0, 0, &[0; 4]);
        packet[14] = 0x01;
        packet[15] = 0x02;
        assert_eq!(parse(&packet).unwrap().universe, 0x0201);
    }

    #[test]
    fn test_header_only_rejected() {
        let packet = build_artdmx(0, 0, &[]);
        assert_eq!(packet.len(), 18);
        assert_eq!(parse(&packet), Err(Rejected::TooShort(18)));
        assert_eq!(parse(&[]), Err(Rejected::TooShort(0)));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut packet = build_artdmx(0, 0, &[1; 16]);
        packet[0] = b'a';
        assert_eq!(parse(&packet), Err(Rejected::BadSignature));
    }

    #[test]
    fn test_payload_capped_at_universe_size() {
        let mut packet = build_artdmx(1, 0, &[7; 512]);
        packet.extend_from_slice(&[9; 100]);
        let update = parse(&packet).unwrap();
        assert_eq!(update.payload.len(), 512);
        assert!(update.payload.iter().all(|&b| b == 7));
    }

    proptest! {
        #[test]
        fn prop_valid_packets_parse(
            universe in any::<u16>(),
            data in proptest::collection::vec(any::<u8>(), 1..700),
        ) {
            let mut packet = build_artdmx(universe, 0, &[]);
            packet.extend_from_slice(&data);

            let update = parse(&packet).unwrap();
            let expected = data.len().min(512);
            prop_assert_eq!(update.universe, universe);
            prop_assert_eq!(update.payload, &data[..expected]);
        }

        #[test]
        fn prop_short_datagrams_rejected(data in proptest::collection::vec(any::<u8>(), 0..=18)) {
            prop_assert!(parse(&data).is_err());
        }

        #[test]
        fn prop_foreign_signature_rejected(
            head in proptest::collection::vec(any::<u8>(), 7),
            tail in proptest::collection::vec(any::<u8>(), 12..600),
        ) {
            prop_assume!(head.as_slice() != ARTNET_SIGNATURE);
            let mut packet = head.clone();
            packet.extend_from_slice(&tail);
            prop_assert_eq!(parse(&packet), Err(Rejected::BadSignature));
        }
    }
}
