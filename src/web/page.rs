//! HTML page rendering.
//!
//! Rendering is a pure function of the log lines, the sensor report and the
//! display options: identical inputs always give identical bytes.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::log::LogLines;
use crate::sensors::SensorReport;
use std::borrow::Cow;

/// Message shown in place of the log when the file cannot be read.
pub const LOG_UNAVAILABLE: &str = "Error: Unable to read log file.";

const STYLE: &str = "body { background-color: black; color: white; font-family: monospace; font-size: 16px; margin: 0; padding: 0; }\
.widget { border: 1px solid white; margin: 10px; padding: 10px; border-radius: 8px; background-color: rgba(255, 255, 255, 0.1); }\
.widget-header { font-weight: bold; margin-bottom: 10px; font-size: 18px; }\
.widget-content { max-height: 300px; overflow-y: auto; }\
.error { color: #ff6b6b; }";

/// HTTP status of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    InternalServerError,
}

impl Status {
    /// Numeric status code for the status line.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::InternalServerError => 500,
        }
    }

    /// Reason phrase for the status line.
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Display options for the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    /// Seconds between client-side reloads
    pub refresh_interval_secs: u32,
    /// Show the last log line first
    pub newest_first: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            refresh_interval_secs: crate::DEFAULT_REFRESH_SECS,
            newest_first: true,
        }
    }
}

impl From<&ServerConfig> for PageOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            refresh_interval_secs: config.refresh_interval_secs,
            newest_first: config.newest_first,
        }
    }
}

/// A complete HTTP response: status line, headers, blank line and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    status: Status,
    bytes: Vec<u8>,
    body_offset: usize,
}

impl RenderedPage {
    pub fn status(&self) -> Status {
        self.status
    }

    /// The full response as written to the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The status line and headers, including the terminating blank line.
    pub fn head(&self) -> &[u8] {
        &self.bytes[..self.body_offset]
    }

    /// The HTML document.
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.body_offset..]
    }
}

/// Escape text for inclusion in HTML element content.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Render the page for one request.
///
/// A failed log read produces a 500 response that still carries the styling,
/// the refresh directive and the sensor report.
pub fn render_page(
    log: &Result<LogLines>,
    report: &SensorReport,
    options: &PageOptions,
) -> RenderedPage {
    let (status, body) = match log {
        Ok(lines) => (Status::Ok, render_body(Some(lines), report, options)),
        Err(_) => (
            Status::InternalServerError,
            render_body(None, report, options),
        ),
    };

    let mut bytes = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Cache-Control: no-store, no-cache, must-revalidate, max-age=0\r\n\
         Pragma: no-cache\r\n\
         Expires: -1\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        status.code(),
        status.reason(),
        body.len()
    )
    .into_bytes();
    let body_offset = bytes.len();
    bytes.extend_from_slice(body.as_bytes());

    RenderedPage {
        status,
        bytes,
        body_offset,
    }
}

fn render_body(lines: Option<&LogLines>, report: &SensorReport, options: &PageOptions) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Log Viewer</title><style>");
    html.push_str(STYLE);
    html.push_str("</style>");
    html.push_str(&format!(
        "<meta http-equiv=\"refresh\" content=\"{}\">",
        options.refresh_interval_secs
    ));
    html.push_str("</head><body>");

    html.push_str("<div class=\"widget\"><div class=\"widget-header\">System Temperatures</div>");
    html.push_str("<div class=\"widget-content\" id=\"sensors\">");
    for line in report.lines() {
        html.push_str(&escape_html(line));
        html.push_str("<br>");
    }
    html.push_str("</div></div>");

    html.push_str("<div class=\"widget\"><div class=\"widget-header\">Log File</div>");
    html.push_str("<div class=\"widget-content\" id=\"log\">");
    match lines {
        Some(lines) => {
            for line in lines.display_order(options.newest_first) {
                html.push_str(&escape_html(line));
                html.push_str("<br>");
            }
        }
        None => {
            html.push_str("<span class=\"error\">");
            html.push_str(LOG_UNAVAILABLE);
            html.push_str("</span>");
        }
    }
    html.push_str("</div></div>");

    html.push_str("</body></html>");
    html
}
