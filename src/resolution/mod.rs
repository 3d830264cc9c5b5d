/**
 * Resolves DNS queries from a response cache or by forwarding them
 * to the upstream resolver over UDP.
 */
mod dns_packets;
mod dns_socket;
mod exchange;
mod helpers;
mod inflight;
mod pending_request;
mod query_id_manager;
mod resolution_key;
mod resolver;
mod response_cache;
#[cfg(test)]
mod testing;
mod transport;

pub use dns_socket::DnsSocket;
