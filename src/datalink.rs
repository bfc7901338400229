//! A minimal DataLink client for pushing records to a collector.
//!
//! Every DataLink packet is `DL`, a one byte header length, the ASCII header and then any
//! data the header announces.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, trace};

use crate::link_error::LinkError;
use crate::seedlink::normalize_address;
use crate::sink::PushClient;

pub const DEFAULT_PORT: u16 = 16000;
const IO_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest reply message accepted from a server.
const MAX_REPLY_SIZE: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct DataLinkConfig {
    /// `host:port`, `host` or `:port`.
    pub address: String,
    /// Sent in the `ID` handshake, usually `program:id`.
    pub client_id: String,
    /// Ask the server to acknowledge each write.
    pub ack: bool,
}

pub struct DataLinkClient {
    config: DataLinkConfig,
    address: String,
    stream: Option<TcpStream>,
    server_id: String,
    write_permission: bool,
}

fn protocol_error(msg: String) -> LinkError {
    LinkError::Protocol(msg)
}

impl DataLinkClient {
    pub fn new(config: DataLinkConfig) -> DataLinkClient {
        let address = normalize_address(&config.address, DEFAULT_PORT);
        DataLinkClient {
            config,
            address,
            stream: None,
            server_id: String::new(),
            write_permission: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the server granted write permission in the last handshake.
    pub fn is_writable(&self) -> bool {
        self.write_permission
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn stream(&mut self) -> Result<&mut TcpStream, LinkError> {
        let address = &self.address;
        self.stream
            .as_mut()
            .ok_or_else(|| LinkError::NotConnected(address.clone()))
    }

    fn send_packet(&mut self, header: &str, data: &[u8]) -> Result<(), LinkError> {
        if header.len() > u8::MAX as usize {
            return Err(protocol_error(format!("header too long: {}", header)));
        }
        trace!("> {}", header);
        let mut packet = Vec::with_capacity(3 + header.len() + data.len());
        packet.extend_from_slice(b"DL");
        packet.push(header.len() as u8);
        packet.extend_from_slice(header.as_bytes());
        packet.extend_from_slice(data);
        let stream = self.stream()?;
        stream.write_all(&packet)?;
        stream.flush()?;
        Ok(())
    }

    /// Reads one packet. `OK` and `ERROR` replies carry a message whose size is the third
    /// header field.
    fn read_packet(&mut self) -> Result<(String, Vec<u8>), LinkError> {
        let stream = self.stream()?;
        let mut pre = [0u8; 3];
        stream.read_exact(&mut pre)?;
        if &pre[..2] != b"DL" {
            return Err(protocol_error(format!(
                "bad packet signature {:02x}{:02x}",
                pre[0], pre[1]
            )));
        }
        let mut header = vec![0u8; pre[2] as usize];
        stream.read_exact(&mut header)?;
        let header = String::from_utf8_lossy(&header).into_owned();
        trace!("< {}", header);

        let mut fields = header.split_whitespace();
        let data = match (fields.next(), fields.nth(1)) {
            (Some("OK") | Some("ERROR"), Some(size)) => {
                let size: usize = size
                    .parse()
                    .map_err(|_| protocol_error(format!("bad reply size in `{}`", header)))?;
                if size > MAX_REPLY_SIZE {
                    return Err(protocol_error(format!("reply size too large in `{}`", header)));
                }
                let mut data = vec![0u8; size];
                stream.read_exact(&mut data)?;
                data
            }
            _ => Vec::new(),
        };
        Ok((header, data))
    }

    fn identify(&mut self) -> Result<(), LinkError> {
        let id = format!("ID {}", self.config.client_id);
        self.send_packet(&id, &[])?;
        let (reply, _) = self.read_packet()?;
        let server = reply
            .strip_prefix("ID ")
            .ok_or_else(|| protocol_error(format!("unexpected reply to ID: `{}`", reply)))?;
        let (name, capabilities) = server.split_once("::").unwrap_or((server, ""));
        self.server_id = name.trim().to_string();
        self.write_permission = capabilities.split_whitespace().any(|c| c == "WRITE");
        info!(
            "connected to datalink server {} ({}), write permission {}",
            self.address,
            self.server_id,
            if self.write_permission { "granted" } else { "denied" }
        );
        Ok(())
    }
}

impl PushClient for DataLinkClient {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|_| LinkError::Address(self.address.clone()))?
            .next()
            .ok_or_else(|| LinkError::Address(self.address.clone()))?;
        let stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        self.stream = Some(stream);
        if let Err(e) = self.identify() {
            self.stream = None;
            return Err(e);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("disconnected from datalink server {}", self.address);
        }
    }

    fn write(
        &mut self,
        stream_id: &str,
        start_us: i64,
        end_us: i64,
        record: &[u8],
    ) -> Result<(), LinkError> {
        let header = format!(
            "WRITE {} {} {} {} {}",
            stream_id,
            start_us,
            end_us,
            if self.config.ack { "A" } else { "N" },
            record.len()
        );
        self.send_packet(&header, record)?;
        if !self.config.ack {
            return Ok(());
        }
        let (reply, message) = self.read_packet()?;
        let message = String::from_utf8_lossy(&message);
        if reply.starts_with("OK") {
            Ok(())
        } else if reply.starts_with("ERROR") {
            Err(LinkError::Refused(format!("{}: {}", stream_id, message)))
        } else {
            Err(protocol_error(format!("unexpected reply to WRITE: `{}`", reply)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn reply(stream: &mut TcpStream, header: &str, data: &[u8]) {
        let mut packet = b"DL".to_vec();
        packet.push(header.len() as u8);
        packet.extend_from_slice(header.as_bytes());
        packet.extend_from_slice(data);
        let _ = stream.write_all(&packet);
    }

    /// Grants `capabilities`, acknowledges the first write and rejects the rest.
    fn fake_server(capabilities: &'static str) -> Result<(String, mpsc::Receiver<String>), LinkError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stream = match listener.accept() {
                Ok((s, _)) => s,
                Err(_) => return,
            };
            let mut writes = 0;
            loop {
                let mut pre = [0u8; 3];
                if stream.read_exact(&mut pre).is_err() {
                    return;
                }
                let mut header = vec![0u8; pre[2] as usize];
                if stream.read_exact(&mut header).is_err() {
                    return;
                }
                let header = String::from_utf8_lossy(&header).into_owned();
                if header.starts_with("ID ") {
                    reply(&mut stream, &format!("ID DataLink test :: DLPROTO:1.0 {}", capabilities), &[]);
                } else if header.starts_with("WRITE ") {
                    let size: usize = header.rsplit(' ').next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    let mut data = vec![0u8; size];
                    if stream.read_exact(&mut data).is_err() {
                        return;
                    }
                    writes += 1;
                    if header.contains(" A ") {
                        if writes == 1 {
                            reply(&mut stream, "OK 1 0", &[]);
                        } else {
                            reply(&mut stream, "ERROR 0 4", b"full");
                        }
                    }
                }
                let _ = tx.send(header);
            }
        });
        Ok((address, rx))
    }

    fn client(address: &str, ack: bool) -> DataLinkClient {
        DataLinkClient::new(DataLinkConfig {
            address: address.to_string(),
            client_id: String::from("slscale:test"),
            ack,
        })
    }

    #[test]
    fn handshake_grants_write() -> Result<(), LinkError> {
        let (address, headers) = fake_server("PACKETSIZE:512 WRITE")?;
        let mut dl = client(&address, true);
        dl.connect()?;
        assert!(dl.is_connected());
        assert!(dl.is_writable());
        assert_eq!(dl.server_id(), "DataLink test");
        assert_eq!(headers.recv().ok().as_deref(), Some("ID slscale:test"));

        dl.write("FDSN:NZ_WEL_10_H_H_T/MSEED3", 1_000_000, 2_000_000, &[7; 64])?;
        assert_eq!(
            headers.recv().ok().as_deref(),
            Some("WRITE FDSN:NZ_WEL_10_H_H_T/MSEED3 1000000 2000000 A 64")
        );
        assert!(matches!(
            dl.write("FDSN:NZ_WEL_10_H_H_T/MSEED3", 0, 0, &[7; 8]),
            Err(LinkError::Refused(msg)) if msg.ends_with("full")
        ));
        dl.disconnect();
        assert!(!dl.is_connected());
        Ok(())
    }

    #[test]
    fn read_only_server() -> Result<(), LinkError> {
        let (address, _headers) = fake_server("PACKETSIZE:512")?;
        let mut dl = client(&address, false);
        dl.connect()?;
        assert!(!dl.is_writable());
        Ok(())
    }

    #[test]
    fn oversized_reply_rejected() -> Result<(), LinkError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                reply(&mut stream, "ERROR 0 4000000000", &[]);
                thread::sleep(Duration::from_millis(200));
            }
        });
        let mut dl = client(&address, false);
        assert!(matches!(
            dl.connect(),
            Err(LinkError::Protocol(msg)) if msg.contains("too large")
        ));
        assert!(!dl.is_connected());
        Ok(())
    }

    #[test]
    fn write_needs_connection() {
        let mut dl = client("localhost:1", false);
        assert!(matches!(
            dl.write("X/MSEED3", 0, 0, &[]),
            Err(LinkError::NotConnected(_))
        ));
    }
}
