//! Log file access: reading it for display and appending new lines.
//!
//! The log file is a plain, append-only sequence of newline-terminated
//! UTF-8 lines. Readers re-read it on every request and writers open it in
//! append mode per message, so there is no lock between the two sides.

pub mod remote;
pub mod store;
pub mod writer;

pub use remote::RemoteLogger;
pub use store::{LineStore, LogLines};
pub use writer::LogWriter;
