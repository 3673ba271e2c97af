//! # medialoop-core
//!
//! Platform-agnostic core of the medialoop reactor: the message model,
//! the reactor-thread message ring, the cross-stage frame queue,
//! configuration, error taxonomy and logging macros.
//!
//! OS-facing pieces (readiness multiplexing, timers, the pipe-backed
//! thread channel, the loop itself) live in `medialoop-runtime`.
//!
//! ## Modules
//!
//! - `config` - reactor configuration (fixed capacities)
//! - `error` - error types
//! - `frame` - bounded blocking queue between pipeline stages
//! - `geom` - redraw rectangles
//! - `message` - application event messages
//! - `mlog` - leveled stderr logging macros
//! - `ring` - fixed-capacity message queue (reactor thread only)

pub mod config;
pub mod error;
pub mod frame;
pub mod geom;
pub mod message;
pub mod mlog;
pub mod ring;

// Re-exports for convenience
pub use config::ReactorConfig;
pub use error::{ChannelError, RegistryError, WaitError};
pub use frame::{FrameQueue, FrameQueueStats};
pub use geom::Rect;
pub use message::{clock_ms, KeySource, Message, MessageBody, MessageKind};
pub use mlog::{set_log_level, LogLevel};
pub use ring::MessageRing;
