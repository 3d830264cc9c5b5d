use self_cell::self_cell;
use simple_dns::{Packet, PacketFlag, SimpleDnsError, RCODE};

// Struct to hold the bytes and the packet in one place
// to avoid lifetimes aka a self-referencing struct.
self_cell!(
    pub struct Inner {
        owner: Vec<u8>,

        #[covariant]
        dependent: Packet,
    }

    impl {Debug}
);

impl Inner {
    /// Try to parse the packet from bytes
    pub fn try_from_bytes(bytes: Vec<u8>) -> Result<Self, SimpleDnsError> {
        Self::try_new(bytes, |bytes| Packet::parse(bytes))
    }

    /// Parsed DNS packet
    pub fn packet(&self) -> &Packet {
        self.borrow_dependent()
    }

    /// Raw bytes the packet is build with
    pub fn raw_bytes(&self) -> &Vec<u8> {
        self.borrow_owner()
    }
}

impl Clone for Inner {
    fn clone(&self) -> Self {
        let bytes = self.raw_bytes().clone();
        Self::try_from_bytes(bytes).expect("Bytes were parsed successfully before.")
    }
}

/// Parses a dns packet without having to deal with life times
/// Both the raw bytes and the parsed struct is contained.
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    pub inner: Inner,
}

impl ParsedPacket {
    pub fn new(raw_bytes: Vec<u8>) -> Result<Self, SimpleDnsError> {
        let inner = Inner::try_from_bytes(raw_bytes)?;
        Ok(Self { inner })
    }

    /// Transaction id of the packet.
    pub fn id(&self) -> u16 {
        self.parsed().id()
    }

    /// Parsed DNS packet
    pub fn parsed(&self) -> &Packet {
        self.inner.packet()
    }

    /// Raw bytes the packet is build with
    pub fn raw_bytes(&self) -> &Vec<u8> {
        self.inner.raw_bytes()
    }

    /// Answer records of the packet
    #[cfg(test)]
    pub fn answers(&self) -> &[simple_dns::ResourceRecord] {
        &self.parsed().answers
    }

    /// If this packet is a reply
    pub fn is_reply(&self) -> bool {
        self.parsed().has_flags(PacketFlag::RESPONSE)
    }

    /// If this packet is a query
    pub fn is_query(&self) -> bool {
        !self.parsed().has_flags(PacketFlag::RESPONSE)
    }

    /// Create SRVFAIL reply
    pub fn create_server_fail_reply(&self) -> Vec<u8> {
        let mut reply = Packet::new_reply(self.id());
        *reply.rcode_mut() = RCODE::ServerFailure;
        reply
            .build_bytes_vec_compressed()
            .expect("An empty reply always serializes.")
    }
}
