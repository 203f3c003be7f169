use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::{Duration, WithTimeout};
use embedded_io_async::Write;
use lapsecam_core::{
    camera::CameraDevice,
    clock::WallClock,
    config::ConfigStore,
    context::{DeviceContext, StatusLed},
    http::parse_request,
    service::{AfterResponse, Connection, handle_request},
    store::PhotoStore,
};
use log::debug;

const LISTEN_PORT: u16 = 80;
pub(super) const TCP_RX_BYTES: usize = 1024;
pub(super) const TCP_TX_BYTES: usize = 8192;
pub(super) const SCRATCH_BYTES: usize = lapsecam_core::pipeline::CHUNK_BYTES;

const ACCEPT_WINDOW_MS: u64 = 250;
const SOCKET_TIMEOUT_MS: u64 = 2_000;
const REQUEST_BYTES: usize = 768;

pub(super) struct SocketConnection<'a, 'b> {
    socket: &'b mut TcpSocket<'a>,
}

impl Connection for SocketConnection<'_, '_> {
    type Error = embassy_net::tcp::Error;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.socket.write_all(bytes).await
    }
}

// One accept window: wait briefly for a client, serve a single request,
// close. The caller loops, so the wake cycle can re-check its deadline
// between requests.
pub(super) async fn poll_once<C, S, F, K, L>(
    stack: Stack<'_>,
    ctx: &mut DeviceContext<C, S, F, K, L>,
    rx_buffer: &mut [u8],
    tx_buffer: &mut [u8],
    scratch: &mut [u8],
) -> AfterResponse
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
{
    let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(Duration::from_millis(SOCKET_TIMEOUT_MS)));

    match socket
        .accept(LISTEN_PORT)
        .with_timeout(Duration::from_millis(ACCEPT_WINDOW_MS))
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            debug!("http: accept failed: {:?}", err);
            return AfterResponse::Continue;
        }
        Err(_) => return AfterResponse::Continue,
    }

    let mut request = [0u8; REQUEST_BYTES];
    let Some((head_len, body_end)) = read_request(&mut socket, &mut request).await else {
        socket.abort();
        return AfterResponse::Continue;
    };
    let (head, rest) = request.split_at(head_len);
    let body = &rest[4..body_end - head_len];

    let after = {
        let mut conn = SocketConnection {
            socket: &mut socket,
        };
        handle_request(ctx, head, body, &mut conn, scratch).await
    };

    let _ = socket.flush().await;
    socket.close();
    let _ = socket.flush().await;
    after
}

// Reads the request head plus exactly Content-Length body bytes; pipelined
// extra input past the body is left unread. Returns the head length and the
// body end offset into `buf`.
async fn read_request(socket: &mut TcpSocket<'_>, buf: &mut [u8]) -> Option<(usize, usize)> {
    let mut filled = 0;
    let head_len = loop {
        if filled == buf.len() {
            debug!("http: request head too large");
            return None;
        }
        match socket.read(&mut buf[filled..]).await {
            Ok(0) => {
                debug!("http: client closed before end of head");
                return None;
            }
            Ok(got) => filled += got,
            Err(err) => {
                debug!("http: read failed: {:?}", err);
                return None;
            }
        }
        if let Some(at) = buf[..filled].windows(4).position(|w| w == b"\r\n\r\n") {
            break at;
        }
    };

    let content_length = parse_request(&buf[..head_len])?.content_length;
    let body_end = head_len + 4 + content_length;
    if body_end > buf.len() {
        debug!("http: request body too large ({} bytes)", content_length);
        return None;
    }
    while filled < body_end {
        match socket.read(&mut buf[filled..body_end]).await {
            Ok(0) => {
                debug!("http: client closed before end of body");
                return None;
            }
            Ok(got) => filled += got,
            Err(err) => {
                debug!("http: read failed: {:?}", err);
                return None;
            }
        }
    }
    Some((head_len, body_end))
}
