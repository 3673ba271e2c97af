//! Application event messages.
//!
//! Messages are small value types copied into and out of the ring; the
//! queue never stores pointers into collaborator memory. The `kind` tag
//! routes a message to its handler in the application's dispatch table;
//! the body is a closed set of payload variants.

use std::sync::OnceLock;
use std::time::Instant;

use crate::geom::Rect;

/// Application-defined routing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKind(pub u32);

/// Where a key event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keyboard,
    Remote,
    FrontPanel,
}

/// Message payload variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody {
    /// Pointer event; `buttons` is the pressed-button mask, zero on release.
    Pointer { x: i32, y: i32, buttons: u32 },

    /// Key press or repeat.
    Key { code: u32, repeat: bool, source: KeySource },

    /// Region needing repaint.
    Redraw(Rect),

    /// Generic integer payload (track number, menu index, ...).
    Index(i32),
}

impl MessageBody {
    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, MessageBody::Pointer { .. })
    }

    #[inline]
    pub fn is_redraw(&self) -> bool {
        matches!(self, MessageBody::Redraw(_))
    }
}

/// One queued application event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub body: MessageBody,

    /// Milliseconds since reactor start, stamped at creation.
    pub when_ms: u64,
}

impl Message {
    /// Build a message stamped with the current clock.
    pub fn new(kind: MessageKind, body: MessageBody) -> Self {
        Self { kind, body, when_ms: clock_ms() }
    }

    pub fn pointer(kind: MessageKind, x: i32, y: i32, buttons: u32) -> Self {
        Self::new(kind, MessageBody::Pointer { x, y, buttons })
    }

    pub fn key(kind: MessageKind, code: u32, repeat: bool, source: KeySource) -> Self {
        Self::new(kind, MessageBody::Key { code, repeat, source })
    }

    pub fn redraw(kind: MessageKind, rect: Rect) -> Self {
        Self::new(kind, MessageBody::Redraw(rect))
    }

    pub fn index(kind: MessageKind, index: i32) -> Self {
        Self::new(kind, MessageBody::Index(index))
    }
}

/// Milliseconds since the process first asked for the time.
///
/// Monotonic; used only for message timestamps and diagnostics.
pub fn clock_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
