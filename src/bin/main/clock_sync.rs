use core::sync::atomic::{AtomicU64, Ordering};

use embassy_net::{
    IpAddress, IpEndpoint, Stack,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_time::{Duration, Instant, WithTimeout};
use lapsecam_core::clock::{NTP_UNIX_OFFSET, UtcTime, WallClock};
use log::{info, warn};

use super::{SNTP_SERVER, SNTP_TIMEOUT_MS, TZ_OFFSET_SECS};

const SNTP_PORT: u16 = 123;
const LOCAL_PORT: u16 = 50_123;
const PACKET_BYTES: usize = 48;

// Wall clock anchored to the monotonic timer. `anchor` stores the offset
// between real time and uptime; `now` re-adds the current uptime so the
// clock keeps ticking between syncs. Offset zero means never synced.
pub(super) struct SystemClock {
    offset_ms: AtomicU64,
}

impl SystemClock {
    pub(super) const fn new() -> Self {
        Self {
            offset_ms: AtomicU64::new(0),
        }
    }

    fn anchor(&self, unix_secs: u64) {
        let uptime_ms = Instant::now().as_millis();
        let offset = (unix_secs * 1_000).saturating_sub(uptime_ms).max(1);
        self.offset_ms.store(offset, Ordering::Release);
    }
}

impl WallClock for &SystemClock {
    fn now(&self) -> Option<UtcTime> {
        let offset = self.offset_ms.load(Ordering::Acquire);
        if offset == 0 {
            return None;
        }
        Some(UtcTime::from_unix(
            (offset + Instant::now().as_millis()) / 1_000,
        ))
    }
}

pub(super) async fn sync(stack: Stack<'_>, clock: &SystemClock) -> bool {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(err) = socket.bind(LOCAL_PORT) {
        warn!("sntp: bind failed: {:?}", err);
        return false;
    }

    let mut request = [0u8; PACKET_BYTES];
    // LI 0, version 4, client mode.
    request[0] = 0x23;
    let server = IpEndpoint::new(IpAddress::Ipv4(SNTP_SERVER), SNTP_PORT);
    if let Err(err) = socket.send_to(&request, server).await {
        warn!("sntp: send failed: {:?}", err);
        return false;
    }

    let mut reply = [0u8; PACKET_BYTES];
    let received = match socket
        .recv_from(&mut reply)
        .with_timeout(Duration::from_millis(SNTP_TIMEOUT_MS))
        .await
    {
        Ok(Ok((len, _))) => len,
        Ok(Err(err)) => {
            warn!("sntp: receive failed: {:?}", err);
            return false;
        }
        Err(_) => {
            warn!("sntp: no reply within {}ms", SNTP_TIMEOUT_MS);
            return false;
        }
    };

    let Some(secs) = transmit_seconds(&reply[..received]) else {
        warn!("sntp: malformed reply ({} bytes)", received);
        return false;
    };
    let unix = ntp_to_unix(secs);
    clock.anchor(unix + TZ_OFFSET_SECS);
    info!("sntp: synced, unix={}", unix);
    true
}

fn transmit_seconds(reply: &[u8]) -> Option<u32> {
    if reply.len() < PACKET_BYTES {
        return None;
    }
    // Require server mode and a synced stratum.
    if reply[0] & 0x07 != 4 || reply[1] == 0 {
        return None;
    }
    let secs = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]);
    (secs != 0).then_some(secs)
}

// NTP counts from 1900 and wraps in 2036; treat pre-offset values as era 1.
fn ntp_to_unix(secs: u32) -> u64 {
    let secs = u64::from(secs);
    if secs >= NTP_UNIX_OFFSET {
        secs - NTP_UNIX_OFFSET
    } else {
        secs + (1 << 32) - NTP_UNIX_OFFSET
    }
}
