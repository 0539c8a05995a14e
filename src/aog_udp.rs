//! AOG UDP Codec (§4.2): the two non-blocking UDP/v4 sockets, their receive
//! pumps, and the dispatch of known PGNs. One `FrameReader` per socket, one
//! dispatcher per socket purpose — the codec itself is shared (§9).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::aog_codec::{encode, Frame, FrameReader};
use crate::subnet::Subnet;

pub const MAIN_PORT: u16 = 8888;
pub const BROADCAST_PORT: u16 = 9999;

const STEER_SRC: u8 = 0x7F;
const PGN_STEER_DATA: u8 = 0xFE;
const PGN_SECTION_CONTROL: u8 = 0xF1;
const PGN_SUBNET_ANNOUNCE: u8 = 0xC9;
pub const PGN_HEARTBEAT: u8 = 0xF0;
pub const HEARTBEAT_SRC: u8 = 0x80;

const RECV_SCRATCH: usize = 512;

/// The result of dispatching one inbound frame: what the event loop must
/// feed to the TC server / CAN stack / subnet store. Kept as plain data so
/// the socket layer never directly depends on `tc_server`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    SteerData {
        speed_mm_s: i32,
        desired_sections: u16,
        /// Byte 2 of the Steer Data payload. Stored for parity with the
        /// field's presence in the wire format; no output in this system
        /// consumes it (no NMEA2000 XTE emission exists here).
        #[allow(dead_code)]
        status: u8,
    },
    SectionControl { enabled: bool },
    SubnetAnnounce { subnet: Subnet },
}

fn dispatch_main(frame: &Frame) -> Option<Inbound> {
    match (frame.src, frame.pgn) {
        (STEER_SRC, PGN_STEER_DATA) if frame.payload.len() >= 8 => {
            let speed_kmh_tenths = i16::from_le_bytes([frame.payload[0], frame.payload[1]]) as i64;
            let speed_mm_s = (speed_kmh_tenths * 100_000 / 3600) as i32;
            let status = frame.payload[2];
            let desired_sections = u16::from_le_bytes([frame.payload[6], frame.payload[7]]);
            Some(Inbound::SteerData { speed_mm_s, desired_sections, status })
        }
        (STEER_SRC, PGN_SECTION_CONTROL) if !frame.payload.is_empty() => {
            Some(Inbound::SectionControl { enabled: frame.payload[0] != 0 })
        }
        _ => {
            debug!(src = frame.src, pgn = frame.pgn, "unrecognised frame on main socket");
            None
        }
    }
}

fn dispatch_discovery(frame: &Frame) -> Option<Inbound> {
    match (frame.src, frame.pgn) {
        (STEER_SRC, PGN_SUBNET_ANNOUNCE) if frame.payload.len() >= 5 && frame.payload[0] == 0xC9 && frame.payload[1] == 0xC9 => {
            let subnet = Subnet { a: frame.payload[2], b: frame.payload[3], c: frame.payload[4] };
            Some(Inbound::SubnetAnnounce { subnet })
        }
        _ => {
            debug!(src = frame.src, pgn = frame.pgn, "unrecognised frame on discovery socket");
            None
        }
    }
}

/// The two sockets and their reassembly buffers.
pub struct AogUdp {
    main_socket: UdpSocket,
    discovery_socket: UdpSocket,
    main_reader: FrameReader,
    discovery_reader: FrameReader,
    local_ip: Ipv4Addr,
}

impl AogUdp {
    pub async fn bind(subnet: Subnet, verify_checksum: bool) -> std::io::Result<Self> {
        let local_ip = local_ip_in_subnet(subnet).unwrap_or(Ipv4Addr::LOCALHOST);
        let main_socket = bind_broadcast_socket(SocketAddr::new(IpAddr::V4(local_ip), MAIN_PORT)).await?;
        let discovery_socket =
            bind_broadcast_socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MAIN_PORT)).await?;
        info!(%local_ip, "AOG UDP codec bound");
        Ok(Self {
            main_socket,
            discovery_socket,
            main_reader: FrameReader::new(verify_checksum),
            discovery_reader: FrameReader::new(verify_checksum),
            local_ip,
        })
    }

    /// Closes and rebinds the main socket to the local IP matching the new
    /// subnet (§4.2 "Subnet Announcement": "close and rebind the main
    /// socket to the new local IP").
    pub async fn rebind_main(&mut self, subnet: Subnet) -> std::io::Result<()> {
        let local_ip = local_ip_in_subnet(subnet).unwrap_or(Ipv4Addr::LOCALHOST);
        self.main_socket = bind_broadcast_socket(SocketAddr::new(IpAddr::V4(local_ip), MAIN_PORT)).await?;
        self.local_ip = local_ip;
        info!(%local_ip, "main socket rebound after subnet announcement");
        Ok(())
    }

    /// `udp.handle_address_detection()`: discovery socket pump (§4.4 step 1).
    pub fn handle_address_detection(&mut self) -> Vec<Inbound> {
        pump(&self.discovery_socket, &mut self.discovery_reader, dispatch_discovery)
    }

    /// `udp.handle_incoming_packets()`: main socket pump (§4.4 step 2).
    pub fn handle_incoming_packets(&mut self) -> Vec<Inbound> {
        pump(&self.main_socket, &mut self.main_reader, dispatch_main)
    }

    /// `send(src, pgn, data)`: broadcasts one frame to `{A}.{B}.{C}.255:9999`.
    /// Errors are swallowed and reported as `false` (§4.2).
    pub fn send(&self, subnet: Subnet, src: u8, pgn: u8, data: Vec<u8>) -> bool {
        let bytes = encode(&Frame::new(src, pgn, data));
        let target = SocketAddr::new(IpAddr::V4(subnet.broadcast_addr()), BROADCAST_PORT);
        match self.main_socket.try_send_to(&bytes, target) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, %target, "failed to send AOG frame");
                false
            }
        }
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// Test-only constructor: binds both sockets to OS-assigned loopback
    /// ports instead of the fixed `8888`, so concurrently-running tests
    /// never fight over the real port.
    #[cfg(test)]
    pub async fn bind_for_test() -> std::io::Result<Self> {
        let main_socket = bind_broadcast_socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        let discovery_socket = bind_broadcast_socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        Ok(Self {
            main_socket,
            discovery_socket,
            main_reader: FrameReader::new(true),
            discovery_reader: FrameReader::new(true),
            local_ip: Ipv4Addr::LOCALHOST,
        })
    }
}

fn pump(
    socket: &UdpSocket,
    reader: &mut FrameReader,
    dispatcher: impl Fn(&Frame) -> Option<Inbound>,
) -> Vec<Inbound> {
    let mut scratch = [0u8; RECV_SCRATCH];
    match socket.try_recv_from(&mut scratch) {
        Ok((n, _addr)) => reader.feed(&scratch[..n]),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) => warn!(error = %e, "AOG socket recv error"),
    }
    reader.drain().iter().filter_map(dispatcher).collect()
}

/// Binds with `SO_REUSEADDR`/`SO_REUSEPORT` set before `bind`, so the main
/// socket's specific-address bind and the discovery socket's wildcard bind
/// can coexist on the same port 8888 in one process — without these, the
/// second bind fails with `EADDRINUSE`.
fn bind_broadcast_socket_std(addr: SocketAddr) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

async fn bind_broadcast_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let std_socket = bind_broadcast_socket_std(addr)?;
    let socket = UdpSocket::from_std(std_socket)?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Finds the first local IPv4 interface address whose first three octets
/// match `subnet`; falls back to loopback (§2: "otherwise loopback").
fn local_ip_in_subnet(subnet: Subnet) -> Option<Ipv4Addr> {
    if_addrs::get_if_addrs()
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|iface| match iface.addr.ip() {
            IpAddr::V4(ip) if subnet.contains(ip) => Some(ip),
            _ => None,
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steer_data_converts_tenths_kmh_to_mm_s() {
        // 10.0 km/h -> 100 tenths -> 100 * 100000 / 3600 mm/s
        let payload = vec![100, 0, 7, 0, 0, 0, 0b11, 0];
        let frame = Frame::new(STEER_SRC, PGN_STEER_DATA, payload);
        let inbound = dispatch_main(&frame).unwrap();
        assert_eq!(
            inbound,
            Inbound::SteerData { speed_mm_s: 100 * 100_000 / 3600, desired_sections: 0b11, status: 7 }
        );
    }

    #[test]
    fn section_control_reads_enable_byte() {
        let frame = Frame::new(STEER_SRC, PGN_SECTION_CONTROL, vec![1]);
        assert_eq!(dispatch_main(&frame), Some(Inbound::SectionControl { enabled: true }));
    }

    #[test]
    fn subnet_announce_requires_the_magic_bytes() {
        let frame = Frame::new(STEER_SRC, PGN_SUBNET_ANNOUNCE, vec![0xC9, 0xC9, 16, 32, 48]);
        assert_eq!(
            dispatch_discovery(&frame),
            Some(Inbound::SubnetAnnounce { subnet: Subnet { a: 16, b: 32, c: 48 } })
        );
    }

    #[test]
    fn malformed_subnet_announce_is_ignored() {
        let frame = Frame::new(STEER_SRC, PGN_SUBNET_ANNOUNCE, vec![0xC9, 0x00, 16, 32, 48]);
        assert_eq!(dispatch_discovery(&frame), None);
    }

    #[test]
    fn unrecognised_frame_on_main_socket_is_ignored() {
        let frame = Frame::new(STEER_SRC, 0x55, vec![1, 2, 3]);
        assert_eq!(dispatch_main(&frame), None);
    }
}
