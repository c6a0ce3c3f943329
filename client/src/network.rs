use crate::config::ClientConfig;
use crate::game::ClientGameState;
use crate::input::{Bot, InputManager};
use crate::visibility::LogSink;
use bincode::serialize;
use log::{debug, error, info, warn};
use shared::{decode_datagram, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

/// Ticks between status lines in the log.
const STATUS_INTERVAL_TICKS: u64 = 150;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: ClientConfig,
    connected: bool,

    game_state: ClientGameState,
    input_manager: InputManager,
    bot: Bot,
    sink: LogSink,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = config.server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            game_state: ClientGameState::new(config.view_range),
            input_manager: InputManager::new(),
            bot: Bot::new(config.seed),
            sink: LogSink::default(),
            config,
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {} as {}...", self.server_addr, self.config.name);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: self.config.name.clone(),
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match &packet {
            Packet::Connected { .. } => self.connected = true,
            Packet::Disconnected { .. } => {
                self.connected = false;
                self.game_state.reset(&mut self.sink);
                return;
            }
            _ => {}
        }
        self.game_state.apply_packet(packet);
    }

    async fn send_request(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }
        let Some(request) = self.bot.decide(&self.game_state) else {
            return self.send_packet(&Packet::Heartbeat).await;
        };

        let input = self.input_manager.next_input(request);
        debug!("Request #{}: {:?}", input.sequence, input.request);
        let packet = Packet::Request {
            sequence: input.sequence,
            timestamp: input.timestamp,
            request: input.request,
        };
        self.send_packet(&packet).await
    }

    fn log_status(&self) {
        let Some(player) = self.game_state.local_player() else {
            return;
        };
        info!(
            "Lv {} at ({}, {}) HP {}/{} SP {}/{} exp {}/{}, {} mirrors, cast {:?}",
            player.level,
            player.position.x,
            player.position.y,
            player.hp,
            player.max_hp,
            player.sp,
            player.max_sp,
            self.game_state.personal.base_exp,
            self.game_state.personal.base_exp_next,
            self.game_state.mirrors().len(),
            self.game_state.cast_bar(player.id)
        );
    }

    /// Runs until the server disconnects us or Ctrl+C is pressed.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut tick_interval = interval(self.config.tick_duration());
        let mut request_interval = interval(self.config.request_interval);
        let mut last_tick = Instant::now();

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.config.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
                            }

                            match decode_datagram(&buffer[..len]) {
                                Ok(packets) => {
                                    let was_connected = self.connected;
                                    for packet in packets {
                                        self.handle_packet(packet);
                                    }
                                    if was_connected && !self.connected {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Dropping malformed datagram: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = (now - last_tick).as_secs_f32();
                    last_tick = now;
                    self.game_state.tick(dt, &mut self.sink);

                    if self.game_state.tick % STATUS_INTERVAL_TICKS == 0 {
                        self.log_status();
                    }
                },

                _ = request_interval.tick() => {
                    if let Err(e) = self.send_request().await {
                        error!("Error sending request: {}", e);
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, leaving...");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }
        info!(
            "Session over: {} mirrors created, {} removed",
            self.sink.spawned, self.sink.despawned
        );

        Ok(())
    }
}
