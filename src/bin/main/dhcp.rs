use embassy_net::{
    IpAddress, IpEndpoint, Ipv4Address, Stack,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_time::Timer;
use log::{debug, info, warn};

use super::AP_ADDRESS;

const SERVER_PORT: u16 = 67;
const CLIENT_PORT: u16 = 68;
const LEASE_ADDRESS: Ipv4Address = Ipv4Address::new(192, 168, 4, 2);
const LEASE_SECS: u32 = 3600;
const SUBNET_MASK: [u8; 4] = [255, 255, 255, 0];

// BOOTP fixed-field offsets (RFC 2131).
const OP: usize = 0;
const XID: usize = 4;
const FLAGS: usize = 10;
const YIADDR: usize = 16;
const SIADDR: usize = 20;
const CHADDR: usize = 28;
const MAGIC: usize = 236;
const OPTIONS: usize = 240;

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const DISCOVER: u8 = 1;
const OFFER: u8 = 2;
const REQUEST: u8 = 3;
const ACK: u8 = 5;

// Clients ignore replies shorter than the BOOTP minimum.
const MIN_REPLY_BYTES: usize = 300;

// Single-lease responder for the setup network: every client is handed the
// same address. A setup session is one phone talking to the portal.
pub(super) async fn serve(stack: Stack<'_>) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 1536];
    let mut tx_buffer = [0u8; 1536];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(err) = socket.bind(SERVER_PORT) {
        warn!("dhcp: bind failed: {:?}", err);
        loop {
            Timer::after_secs(60).await;
        }
    }

    let broadcast = IpEndpoint::new(
        IpAddress::Ipv4(Ipv4Address::new(255, 255, 255, 255)),
        CLIENT_PORT,
    );
    let mut frame = [0u8; 576];
    let mut reply = [0u8; MIN_REPLY_BYTES];
    loop {
        let len = match socket.recv_from(&mut frame).await {
            Ok((len, _)) => len,
            Err(err) => {
                debug!("dhcp: receive failed: {:?}", err);
                continue;
            }
        };
        let reply_kind = match request_kind(&frame[..len]) {
            Some(DISCOVER) => OFFER,
            Some(REQUEST) => ACK,
            other => {
                debug!("dhcp: ignoring message type {:?}", other);
                continue;
            }
        };
        let reply_len = build_reply(&frame[..len], reply_kind, &mut reply);
        if let Err(err) = socket.send_to(&reply[..reply_len], broadcast).await {
            warn!("dhcp: send failed: {:?}", err);
            continue;
        }
        info!(
            "dhcp: {} {}",
            if reply_kind == OFFER { "offered" } else { "acked" },
            LEASE_ADDRESS
        );
    }
}

// Walks the options field for the DHCP message type (option 53).
fn request_kind(frame: &[u8]) -> Option<u8> {
    if frame.len() < OPTIONS || frame[OP] != BOOTREQUEST || frame[MAGIC..MAGIC + 4] != MAGIC_COOKIE
    {
        return None;
    }
    let mut rest = &frame[OPTIONS..];
    loop {
        match rest {
            [] | [255, ..] => return None,
            [0, tail @ ..] => rest = tail,
            [53, _, kind, ..] => return Some(*kind),
            [_, len, tail @ ..] => {
                let skip = *len as usize;
                if skip > tail.len() {
                    return None;
                }
                rest = &tail[skip..];
            }
            [_] => return None,
        }
    }
}

fn build_reply(request: &[u8], kind: u8, reply: &mut [u8; MIN_REPLY_BYTES]) -> usize {
    reply.fill(0);
    reply[OP] = BOOTREPLY;
    reply[1] = 1; // htype: ethernet
    reply[2] = 6; // hlen
    reply[XID..XID + 4].copy_from_slice(&request[XID..XID + 4]);
    reply[FLAGS..FLAGS + 2].copy_from_slice(&request[FLAGS..FLAGS + 2]);
    reply[YIADDR..YIADDR + 4].copy_from_slice(&LEASE_ADDRESS.octets());
    reply[SIADDR..SIADDR + 4].copy_from_slice(&AP_ADDRESS.octets());
    reply[CHADDR..CHADDR + 16].copy_from_slice(&request[CHADDR..CHADDR + 16]);
    reply[MAGIC..MAGIC + 4].copy_from_slice(&MAGIC_COOKIE);

    let mut at = OPTIONS;
    at = put_option(reply, at, 53, &[kind]);
    at = put_option(reply, at, 54, &AP_ADDRESS.octets());
    at = put_option(reply, at, 51, &LEASE_SECS.to_be_bytes());
    at = put_option(reply, at, 1, &SUBNET_MASK);
    at = put_option(reply, at, 3, &AP_ADDRESS.octets());
    reply[at] = 255;
    (at + 1).max(MIN_REPLY_BYTES)
}

fn put_option(reply: &mut [u8], at: usize, code: u8, value: &[u8]) -> usize {
    reply[at] = code;
    reply[at + 1] = value.len() as u8;
    reply[at + 2..at + 2 + value.len()].copy_from_slice(value);
    at + 2 + value.len()
}
