//! A SeedLink 4 subscription client.
//!
//! The client negotiates protocol 4.0, requests each configured station with its
//! selectors, and then yields packets as they arrive. Broken or idle connections are
//! reopened after a delay, resuming each station after the last sequence number seen.

pub mod packet;
pub mod selection;
pub mod state;

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::link_error::LinkError;
use crate::pipeline::PacketSource;

use self::packet::{Packet, PacketKind};
use self::selection::StationSelection;
use self::state::StreamState;

pub const DEFAULT_PORT: u16 = 18000;
/// How long a socket read waits before the collection loop checks for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SeedLinkConfig {
    /// `host:port`, `host` or `:port`.
    pub address: String,
    pub user_agent: String,
    /// Wait before reconnecting.
    pub delay: Duration,
    /// Reconnect after this long without data, zero disables.
    pub timeout: Duration,
    /// Interval between keepalive requests, zero disables.
    pub heartbeat: Duration,
    pub stations: Vec<StationSelection>,
}

impl SeedLinkConfig {
    pub fn new(address: &str, stations: Vec<StationSelection>) -> SeedLinkConfig {
        SeedLinkConfig {
            address: address.to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            delay: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            heartbeat: Duration::ZERO,
            stations,
        }
    }
}

/// Fills in the default host and port.
pub fn normalize_address(address: &str, default_port: u16) -> String {
    if address.starts_with(':') {
        format!("localhost{}", address)
    } else if !address.contains(':') {
        format!("{}:{}", address, default_port)
    } else {
        address.to_string()
    }
}

/// A line oriented command channel that switches to packets after `END`.
struct Connection {
    stream: TcpStream,
    buf: Vec<u8>,
    last_received: Instant,
    last_heartbeat: Instant,
}

impl Connection {
    fn open(address: &str, timeout: Duration) -> Result<Connection, LinkError> {
        let addr = address
            .to_socket_addrs()
            .map_err(|_| LinkError::Address(address.to_string()))?
            .next()
            .ok_or_else(|| LinkError::Address(address.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let now = Instant::now();
        Ok(Connection {
            stream,
            buf: Vec::new(),
            last_received: now,
            last_heartbeat: now,
        })
    }

    fn set_read_timeout(&self, timeout: Duration) -> Result<(), LinkError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), LinkError> {
        trace!("> {}", command);
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads once from the socket. `Ok(false)` when the read timed out.
    fn poll(&mut self) -> Result<bool, LinkError> {
        let mut chunk = [0u8; 8192];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(LinkError::Closed(self.peer())),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                self.last_received = Instant::now();
                Ok(true)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Next reply line, without its line ending.
    fn read_line(&mut self) -> Result<String, LinkError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim_end().to_string();
                trace!("< {}", line);
                return Ok(line);
            }
            if !self.poll()? {
                return Err(LinkError::Protocol(String::from("timed out waiting for reply")));
            }
        }
    }

    /// Sends a command that the server answers with `OK` or `ERROR ...`.
    fn command(&mut self, command: &str) -> Result<(), LinkError> {
        self.send(command)?;
        let reply = self.read_line()?;
        if reply == "OK" {
            Ok(())
        } else if reply.starts_with("ERROR") {
            Err(LinkError::Refused(format!("{}: {}", command, reply)))
        } else {
            Err(LinkError::Protocol(format!("{}: unexpected reply `{}`", command, reply)))
        }
    }

    fn peer(&self) -> String {
        self.stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| String::from("server"))
    }
}

/// Subscribes to a SeedLink server and yields its packets.
pub struct SeedLinkClient {
    config: SeedLinkConfig,
    address: String,
    conn: Option<Connection>,
    resume: StreamState,
    next_attempt: Option<Instant>,
}

impl SeedLinkClient {
    /// `resume` holds the last sequence number already handled per station.
    pub fn new(config: SeedLinkConfig, resume: StreamState) -> SeedLinkClient {
        let address = normalize_address(&config.address, DEFAULT_PORT);
        SeedLinkClient {
            config,
            address,
            conn: None,
            resume,
            next_attempt: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn handshake(&self, conn: &mut Connection) -> Result<(), LinkError> {
        conn.send("HELLO")?;
        let software = conn.read_line()?;
        let organization = conn.read_line()?;
        info!("connected to {}: {} ({})", self.address, software, organization);
        if !software.contains("SLPROTO:4") {
            return Err(LinkError::Protocol(format!(
                "server does not offer SeedLink 4: `{}`",
                software
            )));
        }
        conn.command("SLPROTO 4.0")?;
        if let Err(e) = conn.command(&format!("USERAGENT {}", self.config.user_agent)) {
            debug!("user agent not accepted: {}", e);
        }

        for sel in &self.config.stations {
            conn.command(&format!("STATION {}", sel.station))?;
            for selector in &sel.selectors {
                if let Err(e) = conn.command(&format!("SELECT {}", selector)) {
                    warn!("{}: {}", sel.station, e);
                }
            }
            let data = match self.resume.sequence(&sel.station) {
                Some(seq) if !sel.has_wildcard() => format!("DATA {}", seq + 1),
                _ => String::from("DATA"),
            };
            conn.command(&data)?;
        }
        conn.send("END")?;
        conn.set_read_timeout(POLL_INTERVAL)
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        let mut conn = Connection::open(&self.address, HANDSHAKE_TIMEOUT)?;
        self.handshake(&mut conn)?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Closes the connection, telling the server if still possible.
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.send("BYE");
            debug!("disconnected from {}", self.address);
        }
    }

    fn drop_connection(&mut self, reason: &LinkError) {
        warn!(
            "connection to {} lost ({}), reconnecting in {} seconds",
            self.address,
            reason,
            self.config.delay.as_secs()
        );
        self.conn = None;
        self.next_attempt = Some(Instant::now() + self.config.delay);
    }

    /// Progress within the live connection: a parsed packet, or `None` after a read.
    fn step(&mut self) -> Result<Option<Packet>, LinkError> {
        let heartbeat = self.config.heartbeat;
        let timeout = self.config.timeout;
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Ok(None),
        };

        if let Some((packet, used)) = Packet::parse(&conn.buf)? {
            conn.buf.drain(..used);
            return Ok(Some(packet));
        }
        if !heartbeat.is_zero() && conn.last_heartbeat.elapsed() >= heartbeat {
            conn.send("INFO ID")?;
            conn.last_heartbeat = Instant::now();
        }
        if !timeout.is_zero() && conn.last_received.elapsed() >= timeout {
            return Err(LinkError::Protocol(format!(
                "no data for {} seconds",
                timeout.as_secs()
            )));
        }
        conn.poll()?;
        Ok(None)
    }
}

impl PacketSource for SeedLinkClient {
    fn next_packet(&mut self, cancel: &CancelToken) -> Option<Packet> {
        loop {
            if cancel.is_cancelled() {
                self.disconnect();
                return None;
            }
            if self.conn.is_none() {
                if let Some(at) = self.next_attempt {
                    let now = Instant::now();
                    if at > now && !cancel.sleep(at - now) {
                        continue;
                    }
                }
                if let Err(e) = self.connect() {
                    warn!(
                        "unable to connect to {}: {}, retrying in {} seconds",
                        self.address,
                        e,
                        self.config.delay.as_secs()
                    );
                    self.next_attempt = Some(Instant::now() + self.config.delay);
                }
                continue;
            }
            match self.step() {
                Ok(Some(packet)) => {
                    if let (PacketKind::Data, Some(seq)) = (packet.kind, packet.sequence) {
                        self.resume.advance(&packet.station, seq);
                    }
                    return Some(packet);
                }
                Ok(None) => {}
                Err(e) => self.drop_connection(&e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Answers a handshake, sends `packets`, then waits for the client to hang up.
    fn fake_server(packets: Vec<Packet>) -> Result<(String, mpsc::Receiver<String>), LinkError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = match listener.accept() {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut writer = match stream.try_clone() {
                Ok(w) => w,
                Err(_) => return,
            };
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 {
                let command = line.trim_end().to_string();
                line.clear();
                let _ = tx.send(command.clone());
                let reply: &[u8] = match command.as_str() {
                    "HELLO" => b"SeedLink v4.0 (test) :: SLPROTO:4.0 SLPROTO:3.1\r\ntest server\r\n",
                    "END" => {
                        for p in &packets {
                            let _ = writer.write_all(&p.to_bytes());
                        }
                        continue;
                    }
                    "BYE" => break,
                    _ => b"OK\r\n",
                };
                let _ = writer.write_all(reply);
            }
        });
        Ok((address, rx))
    }

    #[test]
    fn address_defaults() {
        assert_eq!(normalize_address(":18000", DEFAULT_PORT), "localhost:18000");
        assert_eq!(normalize_address("geofon", DEFAULT_PORT), "geofon:18000");
        assert_eq!(normalize_address("host:18010", DEFAULT_PORT), "host:18010");
    }

    #[test]
    fn handshake_then_packets() -> Result<(), LinkError> {
        let packets = vec![
            Packet::data("NZ_WEL", 42, vec![1, 2, 3]),
            Packet::data("NZ_WEL", 43, vec![4, 5]),
        ];
        let (address, commands) = fake_server(packets.clone())?;
        let stations = vec![StationSelection::new("NZ_WEL", vec![String::from("HH?")])?];
        let mut resume = StreamState::new();
        resume.advance("NZ_WEL", 41);
        let mut config = SeedLinkConfig::new(&address, stations);
        config.user_agent = String::from("slscale/test");
        let mut client = SeedLinkClient::new(config, resume);

        let cancel = CancelToken::new();
        assert_eq!(client.next_packet(&cancel), Some(packets[0].clone()));
        assert_eq!(client.next_packet(&cancel), Some(packets[1].clone()));
        assert!(client.is_connected());
        cancel.cancel();
        assert_eq!(client.next_packet(&cancel), None);
        assert!(!client.is_connected());

        let sent: Vec<String> = commands.iter().take(8).collect();
        assert_eq!(
            sent,
            vec![
                "HELLO",
                "SLPROTO 4.0",
                "USERAGENT slscale/test",
                "STATION NZ_WEL",
                "SELECT HH?",
                "DATA 42",
                "END",
                "BYE"
            ]
        );
        Ok(())
    }

    #[test]
    fn refuses_old_servers() -> Result<(), LinkError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut line = [0u8; 7];
                let _ = stream.read_exact(&mut line);
                let _ = stream.write_all(b"SeedLink v3.1 (old)\r\nold server\r\n");
            }
        });
        let mut client = SeedLinkClient::new(SeedLinkConfig::new(&address, Vec::new()), StreamState::new());
        assert!(matches!(client.connect(), Err(LinkError::Protocol(_))));
        Ok(())
    }
}
