//! listener.rs
//! TCP accept loop. Every accepted connection gets its own thread, its own
//! controller state and loop scheduler, and runs a blocking command session.

use std::{
    io::{self, BufReader, BufWriter},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
};

use log::{error, info};
use socket2::{Domain, SockAddr, Socket, Type};

use crate::config::{Config, IoBackend};
use crate::error::ConfigError;
use crate::hardware::{RandomIo, SensorActuator, SimulatedPlant};
use crate::scheduler::{ControllerState, LoopScheduler, echo::ConsoleEcho};
use crate::server::dispatcher::Session;

pub struct Listener {
    inner: TcpListener,
    config: Arc<Config>,
}

impl Listener {
    /// Bind the configured host and port (port 0 picks an ephemeral port).
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr = config
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, config.address()))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(128)?;

        let inner: TcpListener = socket.into();
        info!("[Server] listening on {}", inner.local_addr()?);
        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept connections forever.
    pub fn serve(&self) {
        for stream in self.inner.incoming() {
            match stream {
                Ok(stream) => {
                    let config = self.config.clone();
                    let peer = stream
                        .peer_addr()
                        .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
                    let spawned = thread::Builder::new()
                        .name(format!("session-{peer}"))
                        .spawn(move || handle_connection(stream, peer, &config));
                    if let Err(e) = spawned {
                        error!("[Server] failed to spawn session thread: {}", e);
                    }
                }
                Err(e) => error!("[Server] accept error: {}", e),
            }
        }
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new().name("listener".into()).spawn(move || self.serve())
    }
}

fn build_io(backend: IoBackend) -> Arc<dyn SensorActuator> {
    match backend {
        IoBackend::Random => Arc::new(RandomIo::new()),
        IoBackend::Plant => Arc::new(SimulatedPlant::motors()),
    }
}

/// Fresh controller for one session.
pub fn build_session(config: &Config, label: &str) -> Result<Session, ConfigError> {
    let state = ControllerState::new(config.period(), config.echo_divisor, config.log_duration_secs)?;
    let scheduler = LoopScheduler::new(state, build_io(config.io), Arc::new(ConsoleEcho))
        .with_realtime(config.realtime_priority);
    Ok(Session::new(scheduler, label).with_export_dir(config.export_dir.clone()))
}

fn handle_connection(stream: TcpStream, peer: String, config: &Config) {
    info!("[Server] connection from {}", peer);
    if let Err(e) = stream.set_nodelay(true) {
        error!("[Server] {}: set_nodelay failed: {}", peer, e);
    }
    let read_half = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            error!("[Server] {}: could not clone stream: {}", peer, e);
            return;
        }
    };
    let mut session = match build_session(config, &peer) {
        Ok(session) => session,
        Err(e) => {
            error!("[Server] {}: invalid controller configuration: {}", peer, e);
            return;
        }
    };

    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(stream);
    session.serve(&mut reader, &mut writer);
    info!("[Server] connection from {} closed", peer);
}
