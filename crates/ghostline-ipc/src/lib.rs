//! # Ghostline IPC
//!
//! Request/response multiplexing and event dispatch over the single duplex
//! stream that connects the bridge to the native agent process.
//!
//! ## Purpose
//!
//! - Frame outbound commands as newline-delimited JSON
//! - Correlate replies with the request that caused them
//! - Dispatch unsolicited inbound commands to registered handlers
//! - Keep decoding alive through malformed input and slow consumers
//!
//! ## What Does NOT Belong Here
//!
//! - Payload types for individual commands (see `ghostline-remote`)
//! - Reconnection or resume after the agent restarts; the stream owner
//!   replaces the processor instead
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (reader, writer) = tokio::io::split(stream);
//! let processor = Processor::new(writer, IpcConfig::default());
//! processor.set_handler(Command::IncomingTyping, |data| {
//!     tracing::debug!(?data, "typing");
//!     None
//! });
//! let read_loop = processor.spawn(reader);
//! let chats: Vec<String> = processor.request(Command::GetChats, &json!({"min_timestamp": 0.0})).await?;
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod processor;
mod stats;

pub use command::{Command, UnknownCommand};
pub use config::IpcConfig;
pub use error::{IpcError, IpcResult};
pub use frame::{ErrorPayload, Frame, NO_REPLY};
pub use processor::{Handler, Processor};
pub use stats::ProcessorStats;
