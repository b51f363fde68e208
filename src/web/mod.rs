//! The log page server.
//!
//! Requests are never parsed: any connection receives the same freshly
//! rendered page, built from the current log file and sensor reading.

pub mod page;
pub mod server;

// Re-export commonly used items
pub use page::{escape_html, render_page, PageOptions, RenderedPage, Status};
pub use server::{bind_listener, ConnectionServer, PageService};
