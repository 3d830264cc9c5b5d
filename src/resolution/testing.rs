//! Scripted upstreams and query builders shared by the resolution tests.

use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use simple_dns::{
    rdata::{RData, A},
    Name, Packet, PacketFlag, Question, ResourceRecord, CLASS, QCLASS, QTYPE, TYPE,
};
use tokio::sync::mpsc;

use super::{
    dns_packets::{ParsedPacket, ParsedQuery},
    exchange::{ExchangeError, UpstreamExchange},
    helpers::read_packet_id,
    transport::{Connector, Transport, TransportError},
};

pub fn example_query_bytes(name: &str, id: u16) -> Vec<u8> {
    let mut query = Packet::new_query(id);
    let qname = Name::new(name).unwrap();
    let question = Question::new(qname, QTYPE::TYPE(TYPE::A), QCLASS::CLASS(CLASS::IN), false);
    query.questions = vec![question];
    query.set_flags(PacketFlag::RECURSION_DESIRED);
    query.build_bytes_vec_compressed().unwrap()
}

pub fn example_query(name: &str, id: u16) -> ParsedQuery {
    ParsedQuery::new(example_query_bytes(name, id)).unwrap()
}

/// Reply to `query` with one A record.
pub fn answer_bytes(query: &[u8], id: u16, address: Ipv4Addr) -> Vec<u8> {
    let query = Packet::parse(query).unwrap();
    let question = query.questions[0].clone();
    let answer = ResourceRecord::new(
        question.qname.clone(),
        CLASS::IN,
        300,
        RData::A(A {
            address: u32::from(address),
        }),
    );
    let mut reply = Packet::new_reply(id);
    reply.questions.push(question);
    reply.answers.push(answer);
    reply.build_bytes_vec_compressed().unwrap()
}

pub fn first_a_record(packet: &ParsedPacket) -> Option<Ipv4Addr> {
    packet.answers().iter().find_map(|answer| match &answer.rdata {
        RData::A(A { address }) => Some(Ipv4Addr::from(*address)),
        _ => None,
    })
}

fn query_name(datagram: &[u8]) -> String {
    Packet::parse(datagram)
        .ok()
        .and_then(|packet| packet.questions.first().map(|question| question.qname.to_string()))
        .unwrap_or_default()
}

/// How a mock upstream reacts to queries.
#[derive(Debug, Clone, Default)]
pub struct UpstreamScript {
    answer: Option<Ipv4Addr>,
    stale_first: bool,
    fail_send: bool,
    first_reply_delay: Option<Duration>,
    slow: Option<(String, Duration)>,
}

impl UpstreamScript {
    pub fn answer(address: Ipv4Addr) -> Self {
        Self {
            answer: Some(address),
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn failing_send() -> Self {
        Self {
            fail_send: true,
            ..Default::default()
        }
    }

    /// Sends a reply with the id of the previous attempt before the real reply.
    pub fn stale_first(mut self) -> Self {
        self.stale_first = true;
        self
    }

    /// Delays the reply to the very first query.
    pub fn first_reply_delayed(mut self, delay: Duration) -> Self {
        self.first_reply_delay = Some(delay);
        self
    }

    /// Delays replies to names starting with `prefix`.
    pub fn slow_name(mut self, prefix: &str, delay: Duration) -> Self {
        self.slow = Some((prefix.to_string(), delay));
        self
    }

    fn delay_for(&self, datagram: &[u8], index: usize) -> Duration {
        if index == 0 {
            if let Some(delay) = self.first_reply_delay {
                return delay;
            }
        }
        match &self.slow {
            Some((prefix, delay)) if query_name(datagram).starts_with(prefix.as_str()) => *delay,
            _ => Duration::ZERO,
        }
    }
}

/// In-memory upstream server behind the `Transport` trait.
#[derive(Debug)]
pub struct MockUpstream {
    script: UpstreamScript,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    replies_tx: mpsc::UnboundedSender<Vec<u8>>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockUpstream {
    pub fn new(script: UpstreamScript) -> Self {
        Self::with_sent_log(script, Arc::default())
    }

    fn with_sent_log(script: UpstreamScript, sent: Arc<Mutex<Vec<Vec<u8>>>>) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            script,
            sent,
            replies_tx,
            replies_rx: tokio::sync::Mutex::new(replies_rx),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_ids(&self) -> Vec<u16> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|datagram| read_packet_id(datagram))
            .collect()
    }
}

#[async_trait]
impl Transport for MockUpstream {
    async fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        if self.script.fail_send {
            let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "mock upstream refused");
            return Err(err.into());
        }
        let index = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(datagram.to_vec());
            sent.len() - 1
        };
        let Some(address) = self.script.answer else {
            return Ok(());
        };

        let id = read_packet_id(datagram).unwrap();
        let mut replies = Vec::new();
        if self.script.stale_first {
            replies.push(answer_bytes(datagram, id.wrapping_sub(1), address));
        }
        replies.push(answer_bytes(datagram, id, address));

        let delay = self.script.delay_for(datagram, index);
        let tx = self.replies_tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for reply in replies {
                let _ = tx.send(reply);
            }
        });
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut rx = self.replies_rx.lock().await;
        match rx.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }
}

/// Hands out a new `MockUpstream` per connect. All of them share one sent log.
#[derive(Debug, Clone)]
pub struct MockConnector {
    script: UpstreamScript,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(script: UpstreamScript) -> Self {
        Self {
            script,
            sent: Arc::default(),
            connects: Arc::default(),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let upstream = MockUpstream::with_sent_log(self.script.clone(), self.sent.clone());
        Ok(Arc::new(upstream))
    }
}

/// Exchange that answers every query directly and counts how often it was called.
#[derive(Debug, Clone)]
pub struct MockExchange {
    answer: Option<Ipv4Addr>,
    delay: Duration,
    slow: Option<(String, Duration)>,
    calls: Arc<AtomicUsize>,
}

impl MockExchange {
    pub fn answering(address: Ipv4Addr) -> Self {
        Self {
            answer: Some(address),
            delay: Duration::ZERO,
            slow: None,
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            ..Self::answering(Ipv4Addr::UNSPECIFIED)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn slow_name(mut self, prefix: &str, delay: Duration) -> Self {
        self.slow = Some((prefix.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamExchange for MockExchange {
    async fn exchange(&self, query: &ParsedQuery) -> Result<ParsedPacket, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = match &self.slow {
            Some((prefix, delay)) if query.question().qname.to_string().starts_with(prefix.as_str()) => *delay,
            _ => self.delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.answer {
            Some(address) => {
                let reply = answer_bytes(query.packet.raw_bytes(), query.id(), address);
                Ok(ParsedPacket::new(reply)?)
            }
            None => Err(ExchangeError::Exhausted { attempts: 5 }),
        }
    }
}
