//! Error types for the medialoop reactor.
//!
//! Queue overflow is deliberately not represented here: a full
//! `MessageRing` or `FrameQueue` reports a boolean failure and drops the
//! entry, it is not an error condition the caller unwinds on.

use core::fmt;

/// Failures registering or unregistering an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Descriptor was negative.
    InvalidDescriptor(i32),

    /// Source declared no readiness interest at all.
    NoCallback,

    /// The source id does not name a live registration (already
    /// unregistered, or its slot was reused by a later registration).
    StaleSource,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidDescriptor(fd) => write!(f, "invalid descriptor {}", fd),
            RegistryError::NoCallback => write!(f, "source declares no readiness interest"),
            RegistryError::StaleSource => write!(f, "stale source id"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Failures on the cross-thread notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Underlying pipe read/write failed (raw errno).
    Io(i32),

    /// Registering the read end as an event source failed.
    Register(RegistryError),

    /// A frame arrived whose length exceeds the receiver's buffer. The
    /// payload was drained and discarded to keep the stream framed.
    /// Repeated occurrences mean poster and receiver disagree on the
    /// payload size contract - a programming error, not transient I/O.
    Desync { frame_len: usize, capacity: usize },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Io(errno) => write!(f, "channel i/o error (errno {})", errno),
            ChannelError::Register(e) => write!(f, "channel wakeup registration failed: {}", e),
            ChannelError::Desync { frame_len, capacity } => write!(
                f,
                "channel frame of {} bytes exceeds receive buffer of {} bytes (frame dropped)",
                frame_len, capacity
            ),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<RegistryError> for ChannelError {
    fn from(e: RegistryError) -> Self {
        ChannelError::Register(e)
    }
}

/// Outcome of the OS readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Interrupted by a signal: nothing is ready, try again.
    Interrupted,

    /// The wait itself failed (raw errno). Unrecoverable - descriptor
    /// state can no longer be trusted and the loop must not continue.
    Failed(i32),
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Interrupted => write!(f, "wait interrupted by signal"),
            WaitError::Failed(errno) => write!(f, "readiness wait failed (errno {})", errno),
        }
    }
}

impl std::error::Error for WaitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", RegistryError::InvalidDescriptor(-1)),
            "invalid descriptor -1"
        );
        assert_eq!(
            format!("{}", WaitError::Failed(9)),
            "readiness wait failed (errno 9)"
        );
        let e = ChannelError::Desync { frame_len: 512, capacity: 64 };
        assert!(format!("{}", e).contains("512"));
    }
}
