use simple_dns::SimpleDnsError;

/// Size of the DNS header. Anything shorter can't be a DNS message.
pub const DNS_HEADER_LEN: usize = 12;

/// Copies the packet and replaces the transaction id of the copy.
/// The original buffer is never touched so it can stay shared.
pub fn replace_packet_id(packet: &[u8], new_id: u16) -> Result<Vec<u8>, SimpleDnsError> {
    if packet.len() < DNS_HEADER_LEN {
        return Err(SimpleDnsError::InsufficientData);
    }
    let mut cloned = packet.to_vec();
    cloned[..2].copy_from_slice(&new_id.to_be_bytes());
    Ok(cloned)
}

/// Reads the transaction id straight from the header.
#[cfg(test)]
pub fn read_packet_id(packet: &[u8]) -> Option<u16> {
    if packet.len() < DNS_HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([packet[0], packet[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_id_copies() {
        let original = vec![0x12, 0x34, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 9];
        let patched = replace_packet_id(&original, 0xBEEF).unwrap();
        assert_eq!(&patched[..2], &[0xBE, 0xEF]);
        assert_eq!(&patched[2..], &original[2..]);
        assert_eq!(read_packet_id(&original), Some(0x1234));
    }

    #[test]
    fn short_packets_are_rejected() {
        assert!(replace_packet_id(&[1, 2, 3], 1).is_err());
        assert_eq!(read_packet_id(&[1, 2]), None);
    }
}
