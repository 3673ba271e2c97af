//! # medialoop
//!
//! The concurrency/event backbone of an embedded media-player runtime:
//! a single-threaded cooperative reactor that multiplexes descriptor
//! readiness, fires software timers, drains an application message queue
//! and safely receives notifications posted by worker threads.
//!
//! Codec wrappers, compositing, subtitle rendering and hardware drivers
//! are collaborators that register callbacks with, or post messages and
//! timers into, this core; none of their logic lives here.
//!
//! ## Quick tour
//!
//! ```no_run
//! use std::time::Duration;
//! use medialoop::{MainLoop, Message, MessageKind, OwnerTag, ReactorConfig, TimerMode};
//!
//! let lp = MainLoop::new(ReactorConfig::default()).unwrap();
//!
//! // A repeating UI tick.
//! lp.timers().add(
//!     Duration::from_millis(40),
//!     Duration::from_millis(40),
//!     TimerMode::Repeated,
//!     OwnerTag::next(),
//!     "ui-tick",
//!     |ml| {
//!         ml.post_message(Message::index(MessageKind(1), 0));
//!     },
//! );
//!
//! // Run until some handler calls lp.exit().
//! lp.enter(&|msg: &Message| {
//!     // application dispatch table
//!     let _ = msg;
//! });
//! ```
//!
//! Worker threads never touch the loop directly: they post bytes through
//! a [`ThreadChannel`] (which wakes the reactor) or hand frames to the
//! next pipeline stage through a [`FrameQueue`].

pub use medialoop_core::config::{self, ReactorConfig};
pub use medialoop_core::error::{ChannelError, RegistryError, WaitError};
pub use medialoop_core::frame::{FrameQueue, FrameQueueStats};
pub use medialoop_core::geom::Rect;
pub use medialoop_core::message::{clock_ms, KeySource, Message, MessageBody, MessageKind};
pub use medialoop_core::mlog::{self, set_log_level, LogLevel};
pub use medialoop_core::ring::MessageRing;
pub use medialoop_core::{mdebug, merror, minfo, mtrace, mwarn};

pub use medialoop_runtime::channel::{
    ChannelPost, ChannelReceiver, ThreadChannel, FRAME_HEADER, SAFE_PAYLOAD,
};
pub use medialoop_runtime::mainloop::{MainLoop, MessageSink};
pub use medialoop_runtime::registry::{
    EventRegistry, Interest, PollSet, ReadHandler, SourceHandler, SourceId,
};
pub use medialoop_runtime::timer::{OwnerTag, TimerId, TimerMode, TimerSchedule};
