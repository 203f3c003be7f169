//! The device's HTTP surface.
//!
//! One request-handling function dispatches through an explicit route table
//! and talks to the rest of the device only through [`DeviceContext`], so the
//! whole surface runs in host tests against mock hardware and a recording
//! connection. The firmware's serve loop owns the socket; this module owns
//! everything between parsed bytes and response bytes.

pub mod pages;

use core::fmt::Write;

use heapless::String;
use log::{debug, info, warn};

use crate::camera::CameraDevice;
use crate::clock::WallClock;
use crate::config::{ConfigStore, DeviceConfig, PASSWORD_BYTES, SSID_BYTES};
use crate::context::{DeviceContext, NetMode, StatusLed};
use crate::http::{self, Method};
use crate::naming::{PhotoPath, PATH_BYTES};
use crate::store::{FrameReader, PhotoStore, StoreError};

/// Where a successful delete sends the browser back to.
const LIST_LOCATION: &str = "/photos";

/// Byte stream back to one client.
///
/// The firmware implements this over an embassy-net TCP socket; tests record
/// into a buffer. An error means the client is gone and the response is
/// abandoned.
pub trait Connection {
    type Error: core::fmt::Debug;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// What the caller must do once the response has been sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AfterResponse {
    Continue,
    /// Persisted credentials changed; reboot into the new configuration.
    Restart,
}

/// One handler per row of [`ROUTES`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Route {
    Status,
    ConfigForm,
    SaveConfig,
    ResetConfig,
    PhotoList,
    PhotoFetch,
    PhotoDelete,
}

/// The complete served surface. Dispatch is a scan of this table; anything
/// not listed is a 404.
pub const ROUTES: &[(Method, &str, Route)] = &[
    (Method::Get, "/", Route::Status),
    (Method::Get, "/config", Route::ConfigForm),
    (Method::Post, "/save", Route::SaveConfig),
    (Method::Get, "/reset", Route::ResetConfig),
    (Method::Get, "/photos", Route::PhotoList),
    (Method::Get, "/photo", Route::PhotoFetch),
    (Method::Get, "/delete", Route::PhotoDelete),
];

pub fn route(method: Method, path: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(m, p, _)| *m == method && *p == path)
        .map(|(_, _, r)| *r)
}

/// Why a photo operation was refused, mapped onto a status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FetchError<E> {
    /// Absent, undecodable, or invalid `file` identifier. Raised before any
    /// storage call.
    BadPath,
    NotFound,
    /// No scratch buffer to stream through.
    NoBuffer,
    Backend(E),
}

impl<E> FetchError<E> {
    fn from_store(err: StoreError<E>) -> Self {
        match err {
            StoreError::NotFound | StoreError::NotAFile => Self::NotFound,
            StoreError::Backend(inner) => Self::Backend(inner),
        }
    }

    fn status(&self) -> (u16, &'static str) {
        match self {
            Self::BadPath => (400, "bad file parameter"),
            Self::NotFound => (404, "no such photo"),
            Self::NoBuffer => (500, "no buffer available"),
            Self::Backend(_) => (500, "storage failure"),
        }
    }
}

/// Serve one parsed request and return the caller's follow-up action.
///
/// `head` is everything up to the blank line, `body` the `Content-Length`
/// bytes after it, `scratch` the buffer photo streaming chunks through.
/// Connection errors are absorbed here; the caller only learns whether to
/// keep serving or restart.
pub async fn handle_request<C, S, F, K, L, T>(
    ctx: &mut DeviceContext<C, S, F, K, L>,
    head: &[u8],
    body: &[u8],
    conn: &mut T,
    scratch: &mut [u8],
) -> AfterResponse
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
    T: Connection,
{
    let Some(parsed) = http::parse_request(head) else {
        warn!("serve: unparseable request head");
        let _ = send_error(conn, 400, "bad request").await;
        return AfterResponse::Continue;
    };
    let Some(route) = route(parsed.method, parsed.path) else {
        debug!("serve: no route for {}", parsed.path);
        let _ = send_error(conn, 404, "no such page").await;
        return AfterResponse::Continue;
    };
    debug!("serve: {:?} {}", route, parsed.path);

    let outcome = match route {
        Route::Status => status_page(ctx, conn).await,
        Route::ConfigForm => config_page(ctx, conn).await,
        Route::SaveConfig => save_config(&mut ctx.config, body, conn).await,
        Route::ResetConfig => reset_config(&mut ctx.config, conn).await,
        // The setup portal serves only the credential surface.
        Route::PhotoList | Route::PhotoFetch | Route::PhotoDelete
            if ctx.net.mode == NetMode::AccessPoint =>
        {
            send_error(conn, 404, "not available in setup mode")
                .await
                .map(|()| AfterResponse::Continue)
        }
        Route::PhotoList => photo_list(&mut ctx.store, conn).await,
        Route::PhotoFetch => photo_fetch(&mut ctx.store, parsed.query, conn, scratch).await,
        Route::PhotoDelete => photo_delete(&mut ctx.store, parsed.query, conn).await,
    };
    match outcome {
        Ok(after) => after,
        Err(err) => {
            warn!("serve: connection dropped mid-response: {:?}", err);
            AfterResponse::Continue
        }
    }
}

async fn status_page<C, S, F, K, L, T>(
    ctx: &mut DeviceContext<C, S, F, K, L>,
    conn: &mut T,
) -> Result<AfterResponse, T::Error>
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
    T: Connection,
{
    // In config mode the root page goes straight to the credential form.
    if ctx.net.mode == NetMode::AccessPoint {
        return config_page(ctx, conn).await;
    }
    let config = ctx.config.load().ok().flatten().unwrap_or_default();
    let page = pages::status(&ctx.net, &config.ssid, ctx.clock.now().is_some());
    send_page(conn, &page).await?;
    Ok(AfterResponse::Continue)
}

async fn config_page<C, S, F, K, L, T>(
    ctx: &mut DeviceContext<C, S, F, K, L>,
    conn: &mut T,
) -> Result<AfterResponse, T::Error>
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
    T: Connection,
{
    let config = ctx.config.load().ok().flatten().unwrap_or_default();
    let page = pages::config_form(&config.ssid);
    send_page(conn, &page).await?;
    Ok(AfterResponse::Continue)
}

async fn save_config<F, T>(
    config: &mut F,
    body: &[u8],
    conn: &mut T,
) -> Result<AfterResponse, T::Error>
where
    F: ConfigStore,
    T: Connection,
{
    let Ok(form) = core::str::from_utf8(body) else {
        send_error(conn, 400, "unreadable form body").await?;
        return Ok(AfterResponse::Continue);
    };
    let ssid = http::query_param(form, "ssid").and_then(http::percent_decode::<SSID_BYTES>);
    let password =
        http::query_param(form, "password").and_then(http::percent_decode::<PASSWORD_BYTES>);
    let (Some(ssid), Some(password)) = (ssid, password) else {
        send_error(conn, 400, "missing ssid or password").await?;
        return Ok(AfterResponse::Continue);
    };
    if ssid.is_empty() {
        send_error(conn, 400, "ssid must not be empty").await?;
        return Ok(AfterResponse::Continue);
    }

    let record = DeviceConfig { ssid, password };
    match config.save(&record) {
        Ok(()) => {
            info!("serve: credentials saved for \"{}\"", record.ssid);
            send_page(conn, pages::SAVED).await?;
            Ok(AfterResponse::Restart)
        }
        Err(err) => {
            warn!("serve: credential save failed: {:?}", err);
            send_error(conn, 500, "could not persist settings").await?;
            Ok(AfterResponse::Continue)
        }
    }
}

async fn reset_config<F, T>(config: &mut F, conn: &mut T) -> Result<AfterResponse, T::Error>
where
    F: ConfigStore,
    T: Connection,
{
    match config.clear() {
        Ok(()) => {
            info!("serve: credentials cleared");
            send_page(conn, pages::RESET_DONE).await?;
            Ok(AfterResponse::Restart)
        }
        Err(err) => {
            warn!("serve: credential clear failed: {:?}", err);
            send_error(conn, 500, "could not clear settings").await?;
            Ok(AfterResponse::Continue)
        }
    }
}

async fn photo_list<S, T>(store: &mut S, conn: &mut T) -> Result<AfterResponse, T::Error>
where
    S: PhotoStore,
    T: Connection,
{
    let list = match store.list_photos() {
        Ok(list) => list,
        Err(err) => {
            warn!("serve: listing failed: {:?}", err);
            send_error(conn, 500, "storage listing failed").await?;
            return Ok(AfterResponse::Continue);
        }
    };

    // Length unknown up front; the close-delimited body keeps the page
    // streamable at any photo count.
    send_head(conn, 200, "text/html", None).await?;
    conn.send(pages::LIST_HEADER.as_bytes()).await?;
    for entry in &list.entries {
        let row = pages::list_entry(entry);
        conn.send(row.as_bytes()).await?;
    }
    let footer = pages::list_footer(list.entries.len(), list.truncated);
    conn.send(footer.as_bytes()).await?;
    Ok(AfterResponse::Continue)
}

async fn photo_fetch<S, T>(
    store: &mut S,
    query: &str,
    conn: &mut T,
    scratch: &mut [u8],
) -> Result<AfterResponse, T::Error>
where
    S: PhotoStore,
    T: Connection,
{
    let path = match resolve_photo::<S::Error>(query) {
        Ok(path) => path,
        Err(err) => return refuse(conn, err).await,
    };
    if scratch.is_empty() {
        return refuse(conn, FetchError::<S::Error>::NoBuffer).await;
    }
    let wants_download = http::query_param(query, "download").is_some();
    let wants_thumb = http::query_param(query, "thumb").is_some();

    let (mut reader, length) = match store.open_reader(&path) {
        Ok(pair) => pair,
        Err(err) => return refuse(conn, FetchError::from_store(err)).await,
    };

    let mut response: String<256> = String::new();
    let _ = write!(
        response,
        "HTTP/1.0 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n",
        length
    );
    // A thumbnail is the same image; only the caching policy differs.
    let cache = if wants_thumb { "max-age=86400" } else { "no-store" };
    let _ = write!(response, "Cache-Control: {}\r\n", cache);
    if wants_download {
        let (_, file) = path.split();
        let _ = write!(
            response,
            "Content-Disposition: attachment; filename=\"{}\"\r\n",
            file
        );
    }
    let _ = response.push_str("Connection: close\r\n\r\n");
    conn.send(response.as_bytes()).await?;

    let mut streamed: u32 = 0;
    loop {
        match reader.read(scratch) {
            Ok(0) => break,
            Ok(take) => {
                conn.send(&scratch[..take]).await?;
                streamed += take as u32;
            }
            Err(err) => {
                // Headers are already out; all we can do is cut the stream.
                warn!(
                    "serve: read failed {} bytes into {}: {:?}",
                    streamed, path, err
                );
                break;
            }
        }
    }
    if let Err(err) = reader.close() {
        warn!("serve: reader close failed: {:?}", err);
    }
    if streamed != length {
        warn!("serve: streamed {} of {} bytes for {}", streamed, length, path);
    }
    Ok(AfterResponse::Continue)
}

async fn photo_delete<S, T>(
    store: &mut S,
    query: &str,
    conn: &mut T,
) -> Result<AfterResponse, T::Error>
where
    S: PhotoStore,
    T: Connection,
{
    let path = match resolve_photo::<S::Error>(query) {
        Ok(path) => path,
        Err(err) => return refuse(conn, err).await,
    };
    match store.remove(&path) {
        Ok(()) => {
            info!("serve: removed {}", path);
            send_redirect(conn, LIST_LOCATION).await?;
            Ok(AfterResponse::Continue)
        }
        Err(err) => refuse(conn, FetchError::from_store(err)).await,
    }
}

/// Decode and validate the `file` query parameter. Nothing reaches storage
/// until this has passed.
fn resolve_photo<E>(query: &str) -> Result<PhotoPath, FetchError<E>> {
    let raw = http::query_param(query, "file").ok_or(FetchError::BadPath)?;
    let decoded = http::percent_decode::<PATH_BYTES>(raw).ok_or(FetchError::BadPath)?;
    PhotoPath::parse(&decoded).map_err(|err| {
        debug!("serve: rejected photo path: {:?}", err);
        FetchError::BadPath
    })
}

async fn refuse<T, E>(conn: &mut T, err: FetchError<E>) -> Result<AfterResponse, T::Error>
where
    T: Connection,
    E: core::fmt::Debug,
{
    if let FetchError::Backend(inner) = &err {
        warn!("serve: storage failure: {:?}", inner);
    }
    let (code, message) = err.status();
    send_error(conn, code, message).await?;
    Ok(AfterResponse::Continue)
}

async fn send_page<T: Connection>(conn: &mut T, body: &str) -> Result<(), T::Error> {
    send_head(conn, 200, "text/html", Some(body.len())).await?;
    conn.send(body.as_bytes()).await
}

async fn send_error<T: Connection>(
    conn: &mut T,
    code: u16,
    message: &str,
) -> Result<(), T::Error> {
    let mut body: String<96> = String::new();
    let _ = write!(body, "{}\n", message);
    send_head(conn, code, "text/plain", Some(body.len())).await?;
    conn.send(body.as_bytes()).await
}

async fn send_redirect<T: Connection>(conn: &mut T, location: &str) -> Result<(), T::Error> {
    let mut head: String<128> = String::new();
    let _ = write!(
        head,
        "HTTP/1.0 303 See Other\r\nLocation: {}\r\nConnection: close\r\n\r\n",
        location
    );
    conn.send(head.as_bytes()).await
}

async fn send_head<T: Connection>(
    conn: &mut T,
    code: u16,
    content_type: &str,
    length: Option<usize>,
) -> Result<(), T::Error> {
    let mut head: String<192> = String::new();
    let _ = write!(
        head,
        "HTTP/1.0 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n",
        code,
        status_phrase(code),
        content_type
    );
    if let Some(length) = length {
        let _ = write!(head, "Content-Length: {}\r\n", length);
    }
    let _ = head.push_str("\r\n");
    conn.send(head.as_bytes()).await
}

fn status_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        303 => "See Other",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests;
