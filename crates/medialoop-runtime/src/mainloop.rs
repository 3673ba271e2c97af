//! The reactor loop.
//!
//! One `MainLoop` is created at startup and owns the event registry, the
//! timer schedule, the message ring and an internal wakeup channel. It is
//! passed by reference to everything that needs it - there is no ambient
//! global reactor.
//!
//! Each iteration services work in a fixed order: I/O dispatch, then a
//! bounded batch of messages, then due timers. The readiness wait is
//! bounded by the earliest timer deadline; pending messages shrink the
//! wait budget to zero so the loop polls instead of blocking.
//!
//! # Nested invocation
//!
//! `enter` may be called again from inside a callback, creating a nested
//! loop one level deeper that keeps servicing I/O, messages and timers
//! until its matching `exit`. Control then returns to the statement after
//! the nested `enter` and the outer loop continues. This is how a
//! synchronous "run until the background job finishes" call is built
//! without stalling the player.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use medialoop_core::error::{ChannelError, WaitError};
use medialoop_core::{mdebug, merror, mwarn};
use medialoop_core::{Message, MessageRing, ReactorConfig, Rect};

use crate::channel::{ChannelPost, ThreadChannel};
use crate::registry::EventRegistry;
use crate::timer::TimerSchedule;

/// Application-side message dispatch table.
///
/// The loop hands each drained message to this trait; mapping kinds to
/// handlers is the application's concern, not the reactor's.
pub trait MessageSink {
    fn dispatch(&self, msg: &Message);
}

impl<F: Fn(&Message)> MessageSink for F {
    fn dispatch(&self, msg: &Message) {
        self(msg)
    }
}

/// The reactor context: registry, timers, message ring, wakeup channel.
pub struct MainLoop {
    registry: Rc<EventRegistry>,
    timers: Arc<TimerSchedule<MainLoop>>,
    messages: RefCell<MessageRing>,
    drain_batch: usize,
    /// Nesting depth; zero when idle.
    level: Cell<u32>,
    wake_post: ChannelPost,
    /// Keeps the wakeup pipe registered for the loop's lifetime.
    _wake: ThreadChannel,
}

impl MainLoop {
    /// Build the reactor from a validated configuration. Created once at
    /// process startup; capacities are fixed from here on.
    pub fn new(config: ReactorConfig) -> Result<Rc<MainLoop>, ChannelError> {
        if let Err(e) = config.validate() {
            panic!("invalid reactor config: {}", e);
        }
        let registry = Rc::new(EventRegistry::new());
        let (wake, wake_post) = ThreadChannel::create(Rc::clone(&registry), "loop-wake", |rx| {
            // One get per wakeup, payload discarded; the wakeup's only job
            // is to make the poll return.
            let mut buf = [0u8; 8];
            let _ = rx.get(&mut buf);
        })?;

        Ok(Rc::new(MainLoop {
            registry,
            timers: Arc::new(TimerSchedule::new(config.max_timers)),
            messages: RefCell::new(MessageRing::new(config.msg_capacity)),
            drain_batch: config.drain_batch,
            level: Cell::new(0),
            wake_post,
            _wake: wake,
        }))
    }

    /// The event source registry (reactor thread only).
    pub fn registry(&self) -> &Rc<EventRegistry> {
        &self.registry
    }

    /// The timer schedule; clone the `Arc` to add/cancel from any thread.
    pub fn timers(&self) -> &Arc<TimerSchedule<MainLoop>> {
        &self.timers
    }

    /// A posting handle that forces a loop iteration when written to.
    /// Cheap to clone and hand to worker threads.
    pub fn waker(&self) -> ChannelPost {
        self.wake_post.clone()
    }

    /// Current nesting depth (zero = not running).
    pub fn level(&self) -> u32 {
        self.level.get()
    }

    /// Enqueue an application message. Reactor thread only; workers post
    /// through a `ThreadChannel` and enqueue from its wakeup callback.
    /// Returns false when the ring is full (the message is dropped).
    pub fn post_message(&self, msg: Message) -> bool {
        self.messages.borrow_mut().put(msg)
    }

    /// Queued message count.
    pub fn pending_messages(&self) -> usize {
        self.messages.borrow().len()
    }

    /// Drop pending redraw messages fully inside `bound`; see
    /// [`MessageRing::purge_region`].
    pub fn purge_region(&self, bound: &Rect) -> Option<Rect> {
        self.messages.borrow_mut().purge_region(bound)
    }

    /// Drop queued pointer press/release messages.
    pub fn discard_pending_taps(&self) -> usize {
        self.messages.borrow_mut().discard_pending_taps()
    }

    /// Remove queued messages matching `pred`. The predicate must not
    /// call back into the loop.
    pub fn clear_matching<F: FnMut(&Message) -> bool>(&self, pred: F) -> usize {
        self.messages.borrow_mut().clear_matching(pred)
    }

    /// Run the loop until a matching `exit`.
    pub fn enter(&self, sink: &dyn MessageSink) {
        let level = self.level.get() + 1;
        self.level.set(level);
        mdebug!("loop enter (level {})", level);
        while self.level.get() == level {
            self.iterate(sink, level);
        }
        mdebug!("loop leave (level {})", level);
    }

    /// Leave the innermost running loop. The current dispatch pass is
    /// aborted and a wakeup is posted so a loop blocked in the readiness
    /// wait with nothing else pending returns promptly.
    pub fn exit(&self) {
        let level = self.level.get();
        if level == 0 {
            mwarn!("exit() with no loop running");
            return;
        }
        self.level.set(level - 1);
        self.registry.request_abort();
        if let Err(e) = self.wake_post.post(&[]) {
            mwarn!("loop wakeup post failed: {}", e);
        }
        mdebug!("loop exit (level {})", level);
    }

    fn iterate(&self, sink: &dyn MessageSink, level: u32) {
        // 1. Wait budget: poll when messages are already pending,
        //    otherwise sleep until the earliest timer deadline (without
        //    bound when no timer is armed).
        let budget = if self.messages.borrow().is_empty() {
            self.timers.next_timeout(Instant::now())
        } else {
            Some(Duration::ZERO)
        };

        // 2. Readiness wait + dispatch.
        let mut set = self.registry.prepare();
        match set.wait(budget) {
            Ok(0) => {}
            Ok(_) => {
                self.registry.dispatch(&mut set);
            }
            Err(WaitError::Interrupted) => {} // nothing ready, try again
            Err(WaitError::Failed(errno)) => {
                // Descriptor state can no longer be trusted; continuing
                // would dispatch on garbage.
                merror!("readiness wait failed (errno {}), terminating", errno);
                panic!("medialoop: readiness wait failed (errno {})", errno);
            }
        }

        // 3. Drain a bounded batch of messages.
        for _ in 0..self.drain_batch {
            if self.level.get() != level {
                return; // exit requested from a handler
            }
            let msg = self.messages.borrow_mut().get();
            match msg {
                Some(m) => sink.dispatch(&m),
                None => break,
            }
        }
        if self.level.get() != level {
            return;
        }

        // 4. Fire due timers.
        self.timers.trigger(Instant::now(), self);
    }
}

impl std::fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop")
            .field("level", &self.level.get())
            .field("sources", &self.registry.len())
            .field("timers", &self.timers.len())
            .field("messages", &self.messages.borrow().len())
            .finish()
    }
}
