use embassy_futures::block_on;

use super::*;
use crate::camera::mock::MockCamera;
use crate::clock::UtcTime;
use crate::context::{NetStatus, NoopLed};
use crate::store::mock::MemoryStore;

// 2025-08-23 14:30:05 UTC; week bucket 2025_W34.
const CAPTURE_UNIX: u64 = 1_755_959_405;
const BUCKETED: &str = "/2025_W34/2025_08_23_14_30.jpg";
const BUCKETED_ENCODED: &str = "%2F2025_W34%2F2025_08_23_14_30.jpg";

#[derive(Default)]
struct FakeConfig {
    saved: Option<DeviceConfig>,
    saves: usize,
    clears: usize,
    fail_saves: bool,
}

impl ConfigStore for FakeConfig {
    type Error = &'static str;

    fn load(&mut self) -> Result<Option<DeviceConfig>, Self::Error> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), Self::Error> {
        if self.fail_saves {
            return Err("flash refused the write");
        }
        self.saves += 1;
        self.saved = Some(config.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.clears += 1;
        self.saved = None;
        Ok(())
    }
}

struct FixedClock(Option<UtcTime>);

impl WallClock for FixedClock {
    fn now(&self) -> Option<UtcTime> {
        self.0
    }
}

#[derive(Default)]
struct RecordingConnection {
    sent: std::vec::Vec<u8>,
}

impl Connection for RecordingConnection {
    type Error = core::convert::Infallible;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }
}

type TestContext = DeviceContext<MockCamera, MemoryStore, FakeConfig, FixedClock, NoopLed>;

fn station() -> TestContext {
    DeviceContext::new(
        MockCamera::new(),
        MemoryStore::new(),
        FakeConfig::default(),
        FixedClock(Some(UtcTime::from_unix(CAPTURE_UNIX))),
        NoopLed,
        NetStatus {
            mode: NetMode::Station,
            ip: [192, 168, 1, 77],
        },
    )
}

fn portal() -> TestContext {
    let mut ctx = station();
    ctx.net = NetStatus {
        mode: NetMode::AccessPoint,
        ip: [192, 168, 4, 1],
    };
    ctx
}

fn exchange(
    ctx: &mut TestContext,
    head: &[u8],
    body: &[u8],
    scratch: &mut [u8],
) -> (RecordingConnection, AfterResponse) {
    let mut conn = RecordingConnection::default();
    let after = block_on(handle_request(ctx, head, body, &mut conn, scratch));
    (conn, after)
}

fn get(ctx: &mut TestContext, target: &str) -> (RecordingConnection, AfterResponse) {
    let head = format!("GET {} HTTP/1.1\r\nHost: cam\r\n", target);
    exchange(ctx, head.as_bytes(), b"", &mut [0u8; 512])
}

fn post(ctx: &mut TestContext, target: &str, body: &str) -> (RecordingConnection, AfterResponse) {
    let head = format!(
        "POST {} HTTP/1.1\r\nContent-Length: {}\r\n",
        target,
        body.len()
    );
    exchange(ctx, head.as_bytes(), body.as_bytes(), &mut [0u8; 512])
}

/// Split a recorded response at the blank line.
fn split_head(sent: &[u8]) -> (&str, &[u8]) {
    let pos = sent
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .unwrap();
    (core::str::from_utf8(&sent[..pos]).unwrap(), &sent[pos + 4..])
}

fn page_text(conn: &RecordingConnection) -> &str {
    let (_, body) = split_head(&conn.sent);
    core::str::from_utf8(body).unwrap()
}

fn status_line(conn: &RecordingConnection) -> &str {
    let (head, _) = split_head(&conn.sent);
    head.split("\r\n").next().unwrap()
}

#[test]
fn routing_table_is_explicit() {
    assert_eq!(route(Method::Get, "/"), Some(Route::Status));
    assert_eq!(route(Method::Get, "/photos"), Some(Route::PhotoList));
    assert_eq!(route(Method::Post, "/save"), Some(Route::SaveConfig));
    // Wrong method is as unroutable as a wrong path.
    assert_eq!(route(Method::Get, "/save"), None);
    assert_eq!(route(Method::Post, "/photos"), None);
    assert_eq!(route(Method::Get, "/missing"), None);
}

#[test]
fn unknown_path_gets_a_404() {
    let mut ctx = station();
    let (conn, after) = get(&mut ctx, "/missing");
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");
    assert_eq!(after, AfterResponse::Continue);
}

#[test]
fn garbled_head_gets_a_400() {
    let mut ctx = station();
    let (conn, _) = exchange(&mut ctx, b"\xff\xfe nonsense", b"", &mut [0u8; 64]);
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
}

#[test]
fn status_page_shows_network_and_links() {
    let mut ctx = station();
    ctx.config.saved = DeviceConfig::new("shed-cam", "pw");
    let (conn, after) = get(&mut ctx, "/");
    assert_eq!(status_line(&conn), "HTTP/1.0 200 OK");
    let page = page_text(&conn);
    assert!(page.contains("shed-cam"));
    assert!(page.contains("192.168.1.77"));
    assert!(page.contains("href=\"/photos\""));
    assert!(page.contains("href=\"/config\""));
    assert_eq!(after, AfterResponse::Continue);
}

#[test]
fn portal_root_serves_the_credential_form() {
    let mut ctx = portal();
    let (conn, _) = get(&mut ctx, "/");
    let page = page_text(&conn);
    assert!(page.contains("action=\"/save\""));
    assert!(page.contains("name=\"ssid\""));
    assert!(page.contains("name=\"password\""));
}

#[test]
fn portal_refuses_the_photo_surface() {
    let mut ctx = portal();
    ctx.store.seed_photo(BUCKETED, 512);
    let calls_after_seed = ctx.store.storage_calls;

    let (conn, _) = get(&mut ctx, "/photos");
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");
    let (conn, _) = get(&mut ctx, &format!("/photo?file={}", BUCKETED_ENCODED));
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");
    let (conn, _) = get(&mut ctx, &format!("/delete?file={}", BUCKETED_ENCODED));
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");

    // The credential surface stays reachable.
    let (conn, _) = get(&mut ctx, "/config");
    assert_eq!(status_line(&conn), "HTTP/1.0 200 OK");
    assert_eq!(ctx.store.storage_calls, calls_after_seed);
    assert_eq!(ctx.store.file_count(), 1);
}

#[test]
fn config_page_prefills_the_saved_ssid() {
    let mut ctx = station();
    ctx.config.saved = DeviceConfig::new("shed-cam", "pw");
    let (conn, _) = get(&mut ctx, "/config");
    assert!(page_text(&conn).contains("value=\"shed-cam\""));
}

#[test]
fn save_persists_and_schedules_restart() {
    let mut ctx = station();
    let (conn, after) = post(&mut ctx, "/save", "ssid=shed%2Dcam&password=pass+word%21");
    assert_eq!(status_line(&conn), "HTTP/1.0 200 OK");
    assert_eq!(after, AfterResponse::Restart);
    let saved = ctx.config.saved.unwrap();
    assert_eq!(saved.ssid.as_str(), "shed-cam");
    assert_eq!(saved.password.as_str(), "pass word!");
}

#[test]
fn save_with_a_missing_field_touches_nothing() {
    let mut ctx = station();
    let (conn, after) = post(&mut ctx, "/save", "ssid=shed-cam");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
    assert_eq!(after, AfterResponse::Continue);
    assert_eq!(ctx.config.saves, 0);
    assert!(ctx.config.saved.is_none());
}

#[test]
fn save_rejects_an_empty_ssid() {
    let mut ctx = station();
    let (conn, _) = post(&mut ctx, "/save", "ssid=&password=pw");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
    assert_eq!(ctx.config.saves, 0);
}

#[test]
fn save_reports_a_failing_config_store() {
    let mut ctx = station();
    ctx.config.fail_saves = true;
    let (conn, after) = post(&mut ctx, "/save", "ssid=shed-cam&password=pw");
    assert_eq!(status_line(&conn), "HTTP/1.0 500 Internal Server Error");
    assert_eq!(after, AfterResponse::Continue);
}

#[test]
fn reset_clears_and_restarts() {
    let mut ctx = station();
    ctx.config.saved = DeviceConfig::new("shed-cam", "pw");
    let (_, after) = get(&mut ctx, "/reset");
    assert_eq!(after, AfterResponse::Restart);
    assert_eq!(ctx.config.clears, 1);
    assert!(ctx.config.saved.is_none());
}

#[test]
fn photo_list_links_every_stored_photo() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 9_000);
    ctx.store.seed_photo("/2025_08_22_09_15.jpg", 4_500);
    let (conn, _) = get(&mut ctx, "/photos");
    assert_eq!(status_line(&conn), "HTTP/1.0 200 OK");
    let page = page_text(&conn);
    assert!(page.contains(BUCKETED_ENCODED));
    assert!(page.contains("%2F2025_08_22_09_15.jpg"));
    assert!(page.contains("(9000 bytes)"));
    assert!(page.contains("2 photos"));
}

#[test]
fn fetch_streams_the_exact_declared_length() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 13_000);
    let (conn, _) = get(&mut ctx, &format!("/photo?file={}", BUCKETED_ENCODED));
    let (head, body) = split_head(&conn.sent);
    assert!(head.starts_with("HTTP/1.0 200 OK"));
    assert!(head.contains("Content-Type: image/jpeg"));
    assert!(head.contains("Content-Length: 13000"));
    assert_eq!(body.len(), 13_000);
    assert_eq!(body, ctx.store.bytes_of(BUCKETED).unwrap());
}

#[test]
fn download_and_thumb_share_bytes_with_view() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 2_048);

    let (view, _) = get(&mut ctx, &format!("/photo?file={}", BUCKETED_ENCODED));
    let (view_head, view_body) = split_head(&view.sent);
    assert!(view_head.contains("Cache-Control: no-store"));
    assert!(!view_head.contains("Content-Disposition"));

    let (download, _) = get(
        &mut ctx,
        &format!("/photo?file={}&download=1", BUCKETED_ENCODED),
    );
    let (download_head, download_body) = split_head(&download.sent);
    assert!(download_head
        .contains("Content-Disposition: attachment; filename=\"2025_08_23_14_30.jpg\""));
    assert_eq!(download_body, view_body);

    let (thumb, _) = get(&mut ctx, &format!("/photo?file={}&thumb=1", BUCKETED_ENCODED));
    let (thumb_head, thumb_body) = split_head(&thumb.sent);
    assert!(thumb_head.contains("Cache-Control: max-age=86400"));
    assert!(!thumb_head.contains("Content-Disposition"));
    assert_eq!(thumb_body, view_body);
}

#[test]
fn traversal_never_reaches_storage() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 512);
    let calls_after_seed = ctx.store.storage_calls;

    let (conn, _) = get(&mut ctx, "/photo?file=%2F..%2Fsecret.jpg");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
    let (conn, _) = get(&mut ctx, "/delete?file=..%2F2025_W34%2F2025_08_23_14_30.jpg");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");

    assert_eq!(ctx.store.storage_calls, calls_after_seed);
    assert_eq!(ctx.store.remove_calls, 0);
    assert_eq!(ctx.store.file_count(), 1);
}

#[test]
fn non_photo_suffix_never_reaches_storage() {
    let mut ctx = station();
    let (conn, _) = get(&mut ctx, "/photo?file=%2Fnotes.txt");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
    assert_eq!(ctx.store.storage_calls, 0);
}

#[test]
fn missing_file_parameter_is_refused() {
    let mut ctx = station();
    let (conn, _) = get(&mut ctx, "/photo");
    assert_eq!(status_line(&conn), "HTTP/1.0 400 Bad Request");
    assert_eq!(ctx.store.storage_calls, 0);
}

#[test]
fn fetch_of_an_absent_photo_is_a_404() {
    let mut ctx = station();
    let (conn, _) = get(&mut ctx, "/photo?file=%2F2024_W01%2F2024_01_01_00_00.jpg");
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");
}

#[test]
fn delete_removes_and_redirects() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 512);
    let (conn, after) = get(&mut ctx, &format!("/delete?file={}", BUCKETED_ENCODED));
    let (head, _) = split_head(&conn.sent);
    assert!(head.starts_with("HTTP/1.0 303 See Other"));
    assert!(head.contains("Location: /photos"));
    assert_eq!(after, AfterResponse::Continue);
    assert_eq!(ctx.store.remove_calls, 1);
    assert_eq!(ctx.store.file_count(), 0);
}

#[test]
fn delete_of_an_absent_photo_is_a_404() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 512);
    let (conn, _) = get(&mut ctx, "/delete?file=%2F2024_W01%2F2024_01_01_00_00.jpg");
    assert_eq!(status_line(&conn), "HTTP/1.0 404 Not Found");
    assert_eq!(ctx.store.file_count(), 1);
}

#[test]
fn empty_scratch_aborts_the_fetch_cleanly() {
    let mut ctx = station();
    ctx.store.seed_photo(BUCKETED, 512);
    let calls_after_seed = ctx.store.storage_calls;
    let head = format!("GET /photo?file={} HTTP/1.1\r\n", BUCKETED_ENCODED);
    let (conn, _) = exchange(&mut ctx, head.as_bytes(), b"", &mut []);
    assert_eq!(status_line(&conn), "HTTP/1.0 500 Internal Server Error");
    assert_eq!(ctx.store.storage_calls, calls_after_seed);
}
