//! HTML fragments for the served pages.
//!
//! Small enough to build in fixed buffers; only the photo list is streamed
//! row by row.

use core::fmt::Write;

use heapless::String;

use crate::context::{NetMode, NetStatus};
use crate::http;
use crate::naming::PATH_BYTES;
use crate::store::PhotoEntry;

pub const PAGE_BYTES: usize = 1024;
pub const ROW_BYTES: usize = 1024;

pub const SAVED: &str = "<!DOCTYPE html><html><head><title>lapsecam setup</title></head>\
<body><h1>Saved</h1><p>Settings stored. The device restarts now and joins the \
new network; reconnect to it there.</p></body></html>";

pub const RESET_DONE: &str = "<!DOCTYPE html><html><head><title>lapsecam setup</title></head>\
<body><h1>Reset</h1><p>Saved network forgotten. The device restarts into \
setup mode.</p></body></html>";

pub const LIST_HEADER: &str = "<!DOCTYPE html><html><head><title>lapsecam photos</title></head>\
<body><h1>Photos</h1><p><a href=\"/\">Status</a></p><ul>";

/// Device status page for normal (station) operation.
pub fn status(net: &NetStatus, ssid: &str, clock_synced: bool) -> String<PAGE_BYTES> {
    let mut page = String::new();
    let _ = page.push_str(
        "<!DOCTYPE html><html><head><title>lapsecam</title></head><body><h1>lapsecam</h1>",
    );
    let _ = page.push_str("<p>Network: ");
    if ssid.is_empty() {
        let _ = page.push_str("(not configured)");
    } else {
        write_escaped(&mut page, ssid);
    }
    let mode = match net.mode {
        NetMode::Station => "station",
        NetMode::AccessPoint => "setup AP",
    };
    let _ = write!(
        page,
        " ({} at {}.{}.{}.{})</p>",
        mode, net.ip[0], net.ip[1], net.ip[2], net.ip[3]
    );
    let _ = write!(
        page,
        "<p>Clock: {}</p>",
        if clock_synced { "synced" } else { "not synced" }
    );
    let _ = page.push_str(
        "<p><a href=\"/photos\">Photos</a> | <a href=\"/config\">WiFi setup</a></p></body></html>",
    );
    page
}

/// Credential entry form; also the root page in config mode.
pub fn config_form(current_ssid: &str) -> String<PAGE_BYTES> {
    let mut page = String::new();
    let _ = page.push_str(
        "<!DOCTYPE html><html><head><title>lapsecam setup</title></head>\
         <body><h1>WiFi setup</h1><form method=\"POST\" action=\"/save\">\
         <p><label>Network <input name=\"ssid\" value=\"",
    );
    write_escaped(&mut page, current_ssid);
    let _ = page.push_str(
        "\"></label></p>\
         <p><label>Password <input name=\"password\" type=\"password\"></label></p>\
         <p><button type=\"submit\">Save and restart</button></p></form>\
         <p><a href=\"/reset\">Forget saved network</a></p></body></html>",
    );
    page
}

/// One photo row: thumbnail link, name, size, download and delete actions.
pub fn list_entry(entry: &PhotoEntry) -> String<ROW_BYTES> {
    let mut row = String::new();
    let encoded: String<{ PATH_BYTES * 3 }> =
        match http::percent_encode(entry.path.as_str()) {
            Some(encoded) => encoded,
            None => return row,
        };
    let _ = write!(
        row,
        "<li><a href=\"/photo?file={0}\">\
         <img src=\"/photo?file={0}&amp;thumb=1\" width=\"160\" loading=\"lazy\"></a> \
         {1} ({2} bytes) \
         <a href=\"/photo?file={0}&amp;download=1\">download</a> \
         <a href=\"/delete?file={0}\">delete</a></li>",
        encoded,
        &entry.path.as_str()[1..],
        entry.size
    );
    row
}

pub fn list_footer(count: usize, truncated: bool) -> String<192> {
    let mut footer = String::new();
    let _ = write!(footer, "</ul><p>{} photos</p>", count);
    if truncated {
        let _ = footer.push_str("<p>Older photos were omitted from this page.</p>");
    }
    let _ = footer.push_str("</body></html>");
    footer
}

fn write_escaped<const N: usize>(out: &mut String<N>, raw: &str) {
    for ch in raw.chars() {
        let _ = match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::PhotoPath;

    #[test]
    fn ssid_markup_is_escaped() {
        let page = config_form("a<b>&\"c");
        assert!(page.contains("value=\"a&lt;b&gt;&amp;&quot;c\""));
    }

    #[test]
    fn list_entry_links_the_encoded_path() {
        let entry = PhotoEntry {
            path: PhotoPath::parse("/2025_W34/2025_08_23_14_30.jpg").unwrap(),
            size: 48_213,
        };
        let row = list_entry(&entry);
        assert!(row.contains("/photo?file=%2F2025_W34%2F2025_08_23_14_30.jpg"));
        assert!(row.contains("2025_W34/2025_08_23_14_30.jpg (48213 bytes)"));
        assert!(row.contains("&amp;thumb=1"));
        assert!(row.contains("&amp;download=1"));
        assert!(row.contains("/delete?file="));
    }

    #[test]
    fn footer_notes_truncation() {
        assert!(!list_footer(3, false).contains("omitted"));
        assert!(list_footer(96, true).contains("omitted"));
    }
}
