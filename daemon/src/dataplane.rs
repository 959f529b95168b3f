//! Dataplane consumer transport.
//!
//! A dataplane announces itself on the control socket with
//! `CONNECT <version> <uuid>`; we spawn a data session for it and answer
//! `ACCEPT <uuid> <data-addr> <format>`, where the data address is an
//! ephemeral listener owned by that session. `KEEPALIVE <version> <uuid>`
//! from a dataplane we know goes unanswered; from one we do not (say, after
//! a broker restart) it draws `RECONNECT <uuid>`, telling the peer to start
//! over. Each data session drains its own broker client, so a slow
//! dataplane never holds anyone else back.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};
use route_broker::RouteBroker;

use crate::netlink::NlRouteMessage;

/// Control protocol version spoken on the control socket.
pub const DATAPLANE_PROTO_VERSION: u32 = 0;

/// How long a data session waits for broker data before re-checking its
/// shutdown flag.
const DRAIN_WAIT: Duration = Duration::from_secs(1);
/// Pause before retrying a payload the dataplane could not take.
const RETRY_DELAY: Duration = Duration::from_millis(10);
/// Poll interval while a data session waits for its dataplane to connect.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct DataplaneConfig {
    /// Where dataplanes send CONNECT/KEEPALIVE.
    pub ctrl_addr: SocketAddr,
    /// Base address for per-session data listeners; port 0 picks an
    /// ephemeral port per session.
    pub data_addr: SocketAddr,
    /// Opaque payload format tag echoed to the dataplane in ACCEPT.
    pub data_format: u32,
}

struct Session {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    data_addr: SocketAddr,
}

impl Session {
    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            error!("dataplane data session panicked");
        }
    }
}

/// The control thread plus its session registry. Dropping (or calling
/// `shutdown`) stops every data session.
pub struct DataplaneCtrl {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl DataplaneCtrl {
    /// Bind the control socket and start accepting dataplanes.
    pub fn spawn(
        config: DataplaneConfig,
        broker: RouteBroker<NlRouteMessage>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.ctrl_addr)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name("rbroker/dp_ctrl".to_owned())
            .spawn(move || ctrl_loop(listener, config, broker, thread_shutdown))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("dataplane control thread panicked");
            }
        }
    }
}

impl Drop for DataplaneCtrl {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ctrl_loop(
    listener: TcpListener,
    config: DataplaneConfig,
    broker: RouteBroker<NlRouteMessage>,
    shutdown: Arc<AtomicBool>,
) {
    let mut sessions: HashMap<String, Session> = HashMap::new();

    while !shutdown.load(Ordering::Relaxed) {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => {
                error!("dataplane control accept failed: {err}");
                break;
            }
        };
        if let Err(err) = handle_ctrl_conn(stream, &config, &broker, &mut sessions) {
            warn!("dataplane control exchange failed: {err}");
        }
    }

    for (uuid, session) in sessions.drain() {
        debug!("stopping dataplane session {uuid}");
        session.stop();
    }
}

fn handle_ctrl_conn(
    stream: TcpStream,
    config: &DataplaneConfig,
    broker: &RouteBroker<NlRouteMessage>,
    sessions: &mut HashMap<String, Session>,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(());
    }

    match parse_ctrl_line(line.trim_end()) {
        Some(CtrlRequest::Connect { uuid }) => {
            if let Some(old) = sessions.remove(&uuid) {
                debug!("restarting dataplane client {uuid}");
                old.stop();
            } else {
                debug!("new dataplane client {uuid}");
            }

            let session = spawn_data_session(config, broker.clone())?;
            writeln!(
                writer,
                "ACCEPT {uuid} {} {}",
                session.data_addr, config.data_format
            )?;
            sessions.insert(uuid, session);
        }
        Some(CtrlRequest::Keepalive { uuid }) => {
            if !sessions.contains_key(&uuid) {
                // unknown dataplane, tell it to start over
                writeln!(writer, "RECONNECT {uuid}")?;
            }
        }
        None => {
            warn!("could not parse message on dataplane control socket: {line:?}");
        }
    }
    Ok(())
}

enum CtrlRequest {
    Connect { uuid: String },
    Keepalive { uuid: String },
}

fn parse_ctrl_line(line: &str) -> Option<CtrlRequest> {
    let mut words = line.split_ascii_whitespace();
    let verb = words.next()?;
    let version: u32 = words.next()?.parse().ok()?;
    let uuid = words.next()?.to_owned();
    if words.next().is_some() || version != DATAPLANE_PROTO_VERSION {
        return None;
    }
    match verb {
        "CONNECT" => Some(CtrlRequest::Connect { uuid }),
        "KEEPALIVE" => Some(CtrlRequest::Keepalive { uuid }),
        _ => None,
    }
}

fn spawn_data_session(
    config: &DataplaneConfig,
    broker: RouteBroker<NlRouteMessage>,
) -> std::io::Result<Session> {
    let mut addr = config.data_addr;
    addr.set_port(0);
    let listener = TcpListener::bind(addr)?;
    let data_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let thread_shutdown = shutdown.clone();
    let handle = thread::Builder::new()
        .name("rbroker/dp_data".to_owned())
        .spawn(move || data_loop(listener, broker, thread_shutdown))?;

    Ok(Session {
        shutdown,
        handle,
        data_addr,
    })
}

fn data_loop(
    listener: TcpListener,
    broker: RouteBroker<NlRouteMessage>,
    shutdown: Arc<AtomicBool>,
) {
    // wait for the dataplane to dial the address it was handed in ACCEPT
    let stream = loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("dataplane data connection from {peer}");
                if let Err(err) = stream.set_nonblocking(false) {
                    error!("could not configure dataplane data socket: {err}");
                    return;
                }
                break stream;
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                error!("dataplane data accept failed: {err}");
                return;
            }
        }
    };

    let mut client = match broker.client_create("dp") {
        Ok(client) => client,
        Err(err) => {
            error!("could not register dataplane client: {err}");
            return;
        }
    };
    let mut stream = stream;

    while !shutdown.load(Ordering::Relaxed) {
        let Some(notice) = client.get_next_data(DRAIN_WAIT) else {
            continue;
        };
        let payload = notice.payload().as_bytes();
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);

        // Retry until the dataplane takes the frame; the broker coalesces
        // further updates for the same topics behind us meanwhile.
        loop {
            match stream.write_all(&frame) {
                Ok(()) => break,
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                            | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(RETRY_DELAY);
                }
                Err(err) => {
                    let stats = client.stats();
                    client.record_error();
                    error!(
                        "dataplane publish error: consumed {} behind {:?}: {err}",
                        stats.consumed, stats.behind
                    );
                    return;
                }
            }
        }
    }
}
