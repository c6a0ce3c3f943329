//! Server network layer: UDP traffic, request dispatch and the tick loop

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::config::ServerConfig;
use crate::persistence::LogPersistence;
use crate::world::World;
use bincode::deserialize;
use log::{debug, error, info, warn};
use shared::{
    encode_datagrams, Packet, PlayerInput, PlayerRequest, WorldError, MAX_DATAGRAM_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    /// Packets for one peer, in the order they must be applied.
    SendPackets { packets: Vec<Packet>, addr: SocketAddr },
}

/// Applies one player request to the world.
pub fn apply_request(
    world: &mut World,
    client_id: u32,
    request: &PlayerRequest,
) -> Result<(), WorldError> {
    match request {
        PlayerRequest::Move { target } => world.request_move(client_id, *target).map(|_| ()),
        PlayerRequest::UseSkill {
            skill,
            level,
            target,
        } => world
            .request_skill(client_id, *skill, *level, *target)
            .map(|_| ()),
        PlayerRequest::RaiseStat { stat } => world.raise_stat(client_id, *stat).map(|_| ()),
        PlayerRequest::PickUp { pickup } => world.pick_up(client_id, *pickup).map(|_| ()),
    }
}

/// Owns the world and the socket; everything that touches the world runs
/// on the task calling [`Server::run`].
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    persistence: LogPersistence,
    tick_duration: Duration,
    persist_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let addr = config.address();
        let socket = Arc::new(UdpSocket::bind(&addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let world = World::new(config.world.clone())?;
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            world,
            persistence: LogPersistence::new(),
            tick_duration: config.tick_duration(),
            persist_interval: config.persist_interval.max(Duration::from_secs(1)),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that batches and sends outgoing packets
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendPackets { packets, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packets_impl(&socket, &packets, addr).await {
                    error!("Failed to send {} packets to {}: {}", packets.len(), addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packets_impl(
        socket: &UdpSocket,
        packets: &[Packet],
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for datagram in encode_datagrams(packets, MAX_DATAGRAM_SIZE)? {
            if datagram.len() > MAX_DATAGRAM_SIZE {
                warn!("Datagram of {} bytes to {} exceeds limit", datagram.len(), addr);
            }
            socket.send_to(&datagram, addr).await?;
        }
        Ok(())
    }

    fn send_packets(&self, packets: Vec<Packet>, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPackets { packets, addr }) {
            error!("Failed to queue packets for sending: {}", e);
        }
    }

    fn leave_world(&mut self, client_id: u32) {
        if let Err(e) = self.world.logout(client_id) {
            warn!("Client {} left without a character: {}", client_id, e);
        }
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                name,
            } => {
                info!(
                    "{} connecting from {} (version: {})",
                    name, addr, client_version
                );
                if client_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch: server {}, client {}",
                        PROTOCOL_VERSION, client_version
                    );
                    self.send_packets(vec![Packet::Disconnected { reason }], addr);
                    return;
                }

                // A reconnect from the same address replaces the old session
                let existing = self.clients.read().await.find_client_by_addr(addr);
                if let Some(existing_id) = existing {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(existing_id);
                    self.leave_world(existing_id);
                }

                let client_id = self.clients.write().await.add_client(&name, addr);
                let Some(client_id) = client_id else {
                    let reason = "Server full".to_string();
                    self.send_packets(vec![Packet::Disconnected { reason }], addr);
                    return;
                };

                match self.world.login(client_id, &name) {
                    Ok(entity_id) => self.send_packets(
                        vec![Packet::Connected {
                            client_id,
                            entity_id,
                        }],
                        addr,
                    ),
                    Err(e) => {
                        error!("Login of client {} failed: {}", client_id, e);
                        self.clients.write().await.remove_client(client_id);
                        self.send_packets(
                            vec![Packet::Disconnected {
                                reason: e.to_string(),
                            }],
                            addr,
                        );
                    }
                }
            }

            Packet::Request {
                sequence,
                timestamp,
                request,
            } => {
                let mut clients = self.clients.write().await;
                match clients.find_client_by_addr(addr) {
                    Some(client_id) => {
                        clients.add_input(
                            client_id,
                            PlayerInput {
                                sequence,
                                timestamp,
                                request,
                            },
                        );
                    }
                    None => debug!("Request #{} from unknown peer {}", sequence, addr),
                }
            }

            Packet::Heartbeat => {
                let mut clients = self.clients.write().await;
                match clients.find_client_by_addr(addr) {
                    Some(client_id) => clients.touch(client_id),
                    None => debug!("Heartbeat from unknown peer {}", addr),
                }
            }

            Packet::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(client_id) = client_id {
                    self.clients.write().await.remove_client(client_id);
                    self.leave_world(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies every buffered request in chronological order
    async fn process_inputs(&mut self) {
        let all_inputs = self.clients.read().await.get_chronological_inputs();
        if all_inputs.is_empty() {
            return;
        }

        for (client_id, input) in &all_inputs {
            if let Err(e) = apply_request(&mut self.world, *client_id, &input.request) {
                debug!(
                    "Request #{} from client {} rejected: {}",
                    input.sequence, client_id, e
                );
            }
        }

        let mut clients = self.clients.write().await;
        for (client_id, input) in &all_inputs {
            clients.mark_input_processed(*client_id, input.sequence);
        }
        clients.cleanup_processed_inputs();
    }

    /// Sends every connection the packets its replication queue produced
    async fn flush_world(&mut self) {
        let batches = self.world.flush();
        if batches.is_empty() {
            return;
        }

        let clients = self.clients.read().await;
        for (client_id, packets) in batches {
            match clients.addr_of(client_id) {
                Some(addr) => self.send_packets(packets, addr),
                None => debug!(
                    "Dropping {} packets for departed client {}",
                    packets.len(),
                    client_id
                ),
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut persist_interval = interval(self.persist_interval);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.leave_world(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.process_inputs().await;
                    self.world.tick(dt);
                    self.flush_world().await;

                    let tick = self.world.tick_count();
                    if tick % 100 == 0 && self.world.observer_count() > 0 {
                        debug!(
                            "Tick {}: {} players, {} entities, {:.1}Hz",
                            tick,
                            self.world.observer_count(),
                            self.world.entities().count(),
                            1.0 / dt.max(f32::EPSILON)
                        );
                    }
                },

                _ = persist_interval.tick() => {
                    let saved = self.world.persist_all(&mut self.persistence);
                    if saved > 0 {
                        info!("Persisted {} characters ({} total)", saved, self.persistence.saved());
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use shared::{Coordinate, SkillId, SkillTarget, StatType};
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            world: WorldConfig {
                monster_count: 0,
                ..WorldConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    fn connect(name: &str) -> Packet {
        Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_apply_request_dispatches() {
        let mut world = World::new(WorldConfig {
            monster_count: 0,
            ..WorldConfig::default()
        })
        .unwrap();
        world.login(1, "alice").unwrap();
        let spawn = world.config().spawn_point;

        assert!(apply_request(
            &mut world,
            1,
            &PlayerRequest::Move {
                target: Coordinate::new(spawn.x + 2, spawn.y)
            }
        )
        .is_ok());
        assert!(apply_request(&mut world, 1, &PlayerRequest::RaiseStat { stat: StatType::Dex }).is_ok());
        assert_eq!(
            apply_request(&mut world, 2, &PlayerRequest::RaiseStat { stat: StatType::Dex }),
            Err(WorldError::UnknownConnection(2))
        );
        assert!(apply_request(
            &mut world,
            1,
            &PlayerRequest::UseSkill {
                skill: SkillId::FIRST_AID,
                level: 1,
                target: SkillTarget::Entity(0),
            }
        )
        .is_ok());
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let addr = test_addr(8080);

        assert!(tx
            .send(ServerMessage::PacketReceived {
                packet: connect("alice"),
                addr,
            })
            .is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::PacketReceived { packet, addr: a }) => {
                assert_eq!(a, addr);
                assert_eq!(packet, connect("alice"));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_logs_in() {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = test_addr(40001);

        server.handle_packet(connect("alice"), addr).await;

        assert_eq!(server.world().observer_count(), 1);
        match server.game_rx.try_recv() {
            Ok(GameMessage::SendPackets { packets, addr: a }) => {
                assert_eq!(a, addr);
                assert!(matches!(packets[0], Packet::Connected { client_id: 1, .. }));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let mut server = Server::new(test_config()).await.unwrap();
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            name: "alice".to_string(),
        };

        server.handle_packet(packet, test_addr(40002)).await;

        assert_eq!(server.world().observer_count(), 0);
        assert!(matches!(
            server.game_rx.try_recv(),
            Ok(GameMessage::SendPackets { ref packets, .. })
                if matches!(packets[0], Packet::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut config = test_config();
        config.max_clients = 1;
        let mut server = Server::new(config).await.unwrap();

        server.handle_packet(connect("alice"), test_addr(40003)).await;
        server.handle_packet(connect("bob"), test_addr(40004)).await;

        assert_eq!(server.world().observer_count(), 1);
        server.game_rx.try_recv().unwrap();
        match server.game_rx.try_recv() {
            Ok(GameMessage::SendPackets { packets, .. }) => assert_eq!(
                packets,
                vec![Packet::Disconnected {
                    reason: "Server full".to_string()
                }]
            ),
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_reach_the_world_on_tick() {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = test_addr(40005);
        server.handle_packet(connect("alice"), addr).await;

        let spawn = server.world().config().spawn_point;
        let target = Coordinate::new(spawn.x + 1, spawn.y);
        server
            .handle_packet(
                Packet::Request {
                    sequence: 1,
                    timestamp: 10,
                    request: PlayerRequest::Move { target },
                },
                addr,
            )
            .await;
        server.process_inputs().await;

        let entity = server.world().player_entity(1).unwrap();
        let path = &server.world().entity(entity).unwrap().path;
        assert_eq!(path.destination(), Some(target));
        assert!(server
            .clients
            .read()
            .await
            .get_chronological_inputs()
            .is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_connection() {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = test_addr(40007);
        server.handle_packet(connect("alice"), addr).await;
        server.handle_packet(Packet::Heartbeat, addr).await;

        let timed_out = server
            .clients
            .write()
            .await
            .check_timeouts(CLIENT_TIMEOUT);
        assert!(timed_out.is_empty());
        assert_eq!(server.world().observer_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_logs_out() {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = test_addr(40006);
        server.handle_packet(connect("alice"), addr).await;
        server.handle_packet(Packet::Disconnect, addr).await;

        assert_eq!(server.world().observer_count(), 0);
        assert!(server.clients.read().await.is_empty());
    }
}
