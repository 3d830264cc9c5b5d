use std::fmt::Display;

use super::ParsedPacket;
use crate::resolution::resolution_key::ResolutionKey;
use simple_dns::{PacketFlag, Question, SimpleDnsError};

#[derive(thiserror::Error, Debug)]
pub enum ParseQueryError {
    #[error("Dns packet parse error: {0}")]
    Parse(#[from] SimpleDnsError),

    #[error("Query validation error: {0}.")]
    Validation(&'static str),
}

/// A packet that is verified to be a query with at least one question.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub packet: ParsedPacket,
}

impl ParsedQuery {
    /// Create a new parsed query.
    pub fn new(bytes: Vec<u8>) -> Result<Self, ParseQueryError> {
        let packet = ParsedPacket::new(bytes)?;
        Self::try_from(packet)
    }

    /// Checks if this packet is valid.
    fn validate(&self) -> Result<(), ParseQueryError> {
        if !self.packet.is_query() {
            return Err(ParseQueryError::Validation("Packet is not a query"));
        }
        let question = match self.packet.parsed().questions.first() {
            Some(question) => question,
            None => return Err(ParseQueryError::Validation("Packet without a question")),
        };
        if question.qname.get_labels().is_empty() {
            return Err(ParseQueryError::Validation("Question with an empty qname"));
        };

        Ok(())
    }

    pub fn question(&self) -> &Question {
        self.packet
            .parsed()
            .questions
            .first()
            .expect("Validated to have a question.")
    }

    /// Transaction id set by the client.
    pub fn id(&self) -> u16 {
        self.packet.id()
    }

    /// Cache key of the first question.
    pub fn resolution_key(&self, fold_case: bool) -> ResolutionKey {
        ResolutionKey::from_question(self.question(), fold_case)
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.packet.parsed().has_flags(PacketFlag::RECURSION_DESIRED)
    }
}

impl Display for ParsedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let question = self.question();
        write!(
            f,
            "{} {:?} {:?} id={} rd={}",
            question.qname,
            question.qtype,
            question.qclass,
            self.id(),
            self.is_recursion_desired()
        )
    }
}

impl TryFrom<ParsedPacket> for ParsedQuery {
    type Error = ParseQueryError;
    fn try_from(value: ParsedPacket) -> Result<Self, Self::Error> {
        let me = Self { packet: value };
        me.validate()?;
        Ok(me)
    }
}
