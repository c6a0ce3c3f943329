//! Connection bookkeeping and request queuing
//!
//! This module tracks every UDP peer that completed the connect handshake:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Buffering of player requests until the next tick drains them
//! - Capacity limits and address lookup for incoming datagrams
//!
//! A connection here is not yet a character. The world creates the player
//! entity once the network layer hands it the connection id.

use log::{info, warn};
use shared::PlayerInput;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Requests buffered per connection before new ones are dropped.
pub const MAX_PENDING_INPUTS: usize = 64;
/// Silence after which a connection is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected peer and the requests it sent since the last tick.
#[derive(Debug)]
pub struct Client {
    pub id: u32,
    /// Character name given in the connect packet.
    pub name: String,
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this peer.
    pub last_seen: Instant,
    /// Highest request sequence applied to the world.
    pub last_processed_input: u32,
    /// Unapplied requests, ordered by sequence.
    pub pending_inputs: Vec<PlayerInput>,
}

impl Client {
    pub fn new(id: u32, name: &str, addr: SocketAddr) -> Self {
        Self {
            id,
            name: name.to_string(),
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Buffers a request in sequence order.
    ///
    /// Duplicates and requests at or below the last processed sequence are
    /// ignored, which absorbs UDP retransmits. Returns false when the request
    /// was dropped.
    pub fn add_input(&mut self, input: PlayerInput) -> bool {
        self.last_seen = Instant::now();
        if input.sequence <= self.last_processed_input
            || self.pending_inputs.iter().any(|i| i.sequence == input.sequence)
        {
            return false;
        }
        if self.pending_inputs.len() >= MAX_PENDING_INPUTS {
            warn!(
                "Client {} has {} requests pending, dropping #{}",
                self.id,
                self.pending_inputs.len(),
                input.sequence
            );
            return false;
        }
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
        true
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All connected peers.
///
/// Connection ids start at 1 and are never reused while the server runs.
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection. Returns `None` when the server is full.
    pub fn add_client(&mut self, name: &str, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, name, addr);
        self.clients
            .insert(client_id, Client::new(client_id, name, addr));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} ({}) disconnected", client.id, client.name);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Returns false for unknown connections and dropped requests.
    pub fn add_input(&mut self, client_id: u32, input: PlayerInput) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.add_input(input),
            None => false,
        }
    }

    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Every unprocessed request across all connections.
    ///
    /// Ordered by client timestamp, then connection id, then sequence, so the
    /// world sees the same order for the same traffic.
    pub fn get_chronological_inputs(&self) -> Vec<(u32, PlayerInput)> {
        let mut all_inputs: Vec<(u32, PlayerInput)> = self
            .clients
            .values()
            .flat_map(|client| {
                client
                    .pending_inputs
                    .iter()
                    .filter(|input| input.sequence > client.last_processed_input)
                    .map(|input| (client.id, input.clone()))
            })
            .collect();

        all_inputs.sort_by_key(|(client_id, input)| (input.timestamp, *client_id, input.sequence));
        all_inputs
    }

    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let last = client.last_processed_input;
            client.pending_inputs.retain(|input| input.sequence > last);
        }
    }

    /// Removes connections silent for longer than `timeout` and returns
    /// their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }
        timed_out
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .values()
            .map(|client| (client.id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Coordinate, PlayerRequest, StatType};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn walk(sequence: u32, timestamp: u64) -> PlayerInput {
        PlayerInput {
            sequence,
            timestamp,
            request: PlayerRequest::Move {
                target: Coordinate::new(sequence as i32, 0),
            },
        }
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, "alice", test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.name, "alice");
        assert_eq!(client.last_processed_input, 0);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_orders_by_sequence() {
        let mut client = Client::new(1, "alice", test_addr());

        assert!(client.add_input(walk(2, 100)));
        assert!(client.add_input(walk(1, 50)));

        assert_eq!(client.pending_inputs.len(), 2);
        assert_eq!(client.pending_inputs[0].sequence, 1);
        assert_eq!(client.pending_inputs[1].sequence, 2);
    }

    #[test]
    fn test_client_drops_duplicates_and_stale() {
        let mut client = Client::new(1, "alice", test_addr());
        assert!(client.add_input(walk(3, 100)));
        assert!(!client.add_input(walk(3, 100)));

        client.last_processed_input = 5;
        assert!(!client.add_input(walk(4, 120)));
    }

    #[test]
    fn test_client_caps_pending_inputs() {
        let mut client = Client::new(1, "alice", test_addr());
        for sequence in 1..=MAX_PENDING_INPUTS as u32 {
            assert!(client.add_input(walk(sequence, sequence as u64)));
        }
        assert!(!client.add_input(walk(MAX_PENDING_INPUTS as u32 + 1, 999)));
        assert_eq!(client.pending_inputs.len(), MAX_PENDING_INPUTS);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, "alice", test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client("alice", test_addr()), Some(1));
        assert_eq!(manager.add_client("bob", test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client("alice", test_addr()).unwrap();
        manager.remove_client(first);
        let second = manager.add_client("alice", test_addr()).unwrap();

        assert!(second > first);
        assert!(manager.remove_client(999).is_none());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let alice = manager.add_client("alice", test_addr()).unwrap();
        manager.add_client("bob", test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(alice));
        assert_eq!(manager.addr_of(alice), Some(test_addr()));
        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_chronological_inputs_across_clients() {
        let mut manager = ClientManager::new(3);
        let alice = manager.add_client("alice", test_addr()).unwrap();
        let bob = manager.add_client("bob", test_addr2()).unwrap();

        manager.add_input(alice, walk(1, 100));
        manager.add_input(bob, walk(1, 50));
        manager.add_input(alice, walk(2, 200));
        manager.add_input(
            bob,
            PlayerInput {
                sequence: 2,
                timestamp: 100,
                request: PlayerRequest::RaiseStat { stat: StatType::Str },
            },
        );
        assert!(!manager.add_input(999, walk(1, 1)));

        let inputs = manager.get_chronological_inputs();
        let order: Vec<(u32, u64)> = inputs.iter().map(|(c, i)| (*c, i.timestamp)).collect();
        assert_eq!(order, vec![(bob, 50), (alice, 100), (bob, 100), (alice, 200)]);
    }

    #[test]
    fn test_processed_inputs_are_cleaned_up() {
        let mut manager = ClientManager::new(1);
        let alice = manager.add_client("alice", test_addr()).unwrap();
        manager.add_input(alice, walk(1, 10));
        manager.add_input(alice, walk(2, 20));

        manager.mark_input_processed(alice, 1);
        manager.cleanup_processed_inputs();

        let inputs = manager.get_chronological_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].1.sequence, 2);
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2);
        let alice = manager.add_client("alice", test_addr()).unwrap();
        let bob = manager.add_client("bob", test_addr2()).unwrap();
        if let Some(client) = manager.clients.get_mut(&alice) {
            client.last_seen = Instant::now() - Duration::from_secs(10);
        }

        assert_eq!(manager.check_timeouts(CLIENT_TIMEOUT), vec![alice]);
        assert!(manager.get(bob).is_some());
        assert_eq!(manager.len(), 1);
    }
}
