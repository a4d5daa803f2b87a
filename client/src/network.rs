use crate::builtins::OverrideTable;
use crate::host::HostEnvironment;
use crate::response::Outgoing;
use crate::scheduler::FrameScheduler;
use crate::service::SnippetService;
use crate::world::{standard_registry, LocalWorld, DEFAULT_TIMESCALE};
use bincode::{deserialize, serialize};
use log::{debug, error, info, trace, warn};
use shared::{Packet, CLIENT_VERSION};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    /// Simulated one-way latency is half of this, applied on send and receive.
    pub fake_ping_ms: u64,
    pub frame_interval: Duration,
    /// Game seconds per real second.
    pub timescale: f32,
    pub client_version: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7777".to_string(),
            fake_ping_ms: 0,
            frame_interval: Duration::from_millis(16),
            timescale: DEFAULT_TIMESCALE,
            client_version: CLIENT_VERSION,
        }
    }
}

/// Connection to the game server. Must be driven from inside a `LocalSet`.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,
    shutdown: bool,
    config: ClientConfig,

    world: Rc<LocalWorld>,
    scheduler: Rc<FrameScheduler>,
    service: SnippetService,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,

    snippets_received: u64,
    packets_sent: u64,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = config.server_addr.parse()?;

        let world = Rc::new(LocalWorld::new(config.timescale));
        let scheduler = Rc::new(FrameScheduler::new());
        let host = HostEnvironment {
            identity: world.clone(),
            objects: world.clone(),
            presentation: world.clone(),
            scheduler: scheduler.clone(),
            feedback: world.clone(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let service = SnippetService::new(
            Rc::new(standard_registry(&world)),
            OverrideTable::standard(),
            host,
            tx,
        );

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            shutdown: false,
            config,
            world,
            scheduler,
            service,
            outgoing: rx,
            snippets_received: 0,
            packets_sent: 0,
        })
    }

    pub fn world(&self) -> &Rc<LocalWorld> {
        &self.world
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: self.config.client_version,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        self.packets_sent += 1;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;
            }

            Packet::SpSnippet(snippet) => {
                self.snippets_received += 1;
                self.service.on_sp_snippet(snippet);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.shutdown = true;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Runs until the server disconnects us or the process is interrupted.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut frame_interval = interval(self.config.frame_interval);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buffer = [0u8; 8192];

        while !self.shutdown {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.config.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => error!("Error decoding packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = frame_interval.tick() => {
                    // handles are dropped; the spawned tasks keep running on the LocalSet
                    self.scheduler.tick();
                },

                Some(message) = self.outgoing.recv() => {
                    trace!("Sending {:?} ({:?})", message.packet, message.reliability);
                    if let Err(e) = self.send_packet(&message.packet).await {
                        error!("Error sending packet: {}", e);
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        debug!(
            "Client stopped after {} ticks, {} snippets received, {} packets sent",
            self.scheduler.ticks(),
            self.snippets_received,
            self.packets_sent
        );

        Ok(())
    }
}
