//! # medialoop-runtime
//!
//! OS-facing half of the medialoop reactor:
//! - `registry` - readiness-watched event sources and dispatch
//! - `timer` - mutex-guarded fixed-capacity timer schedule
//! - `channel` - pipe-backed cross-thread notification channel
//! - `mainloop` - the loop tying registry, timers and messages together
//!
//! Built on `pipe(2)` and `poll(2)`; unix only.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub mod channel;
        pub mod mainloop;
        pub mod registry;
        pub mod timer;

        pub use channel::{ChannelPost, ChannelReceiver, ThreadChannel, FRAME_HEADER, SAFE_PAYLOAD};
        pub use mainloop::{MainLoop, MessageSink};
        pub use registry::{EventRegistry, Interest, PollSet, ReadHandler, SourceHandler, SourceId};
        pub use timer::{OwnerTag, TimerId, TimerMode, TimerSchedule};
    } else {
        compile_error!("medialoop-runtime requires a unix platform (pipe/poll)");
    }
}
