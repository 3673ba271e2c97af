//! Event source registry and readiness dispatch.
//!
//! Registered sources live in an index-stable slot arena: unregistering
//! clears the slot and bumps its generation counter, so a `SourceId` held
//! across a mutation simply stops resolving instead of pointing at reused
//! memory. Dispatch revalidates the id before every single callback
//! invocation, which makes arbitrary register/unregister calls from inside
//! a handler safe - including a handler unregistering itself, unregistering
//! a source that is about to be visited, or registering new sources.
//!
//! The registry belongs to the reactor thread alone. Worker threads reach
//! the reactor through the `ThreadChannel`, never through this type.

use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use medialoop_core::error::{RegistryError, WaitError};
use medialoop_core::{mdebug, mtrace};

/// Readiness classes a source can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const READABLE: Interest = Interest(0b001);
    pub const WRITABLE: Interest = Interest(0b010);
    pub const EXCEPTION: Interest = Interest(0b100);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    #[inline]
    pub fn is_exception(self) -> bool {
        self.contains(Self::EXCEPTION)
    }
}

impl std::ops::BitOr for Interest {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Interest(self.0 | other.0)
    }
}

/// Callbacks for one registered source.
///
/// Only the methods matching the declared `Interest` are ever invoked.
/// Handlers may freely call back into the registry (register, unregister,
/// request_abort) - the dispatcher never holds a borrow across an
/// invocation.
pub trait SourceHandler {
    fn on_readable(&self, _fd: RawFd) {}
    fn on_writable(&self, _fd: RawFd) {}
    fn on_exception(&self, _fd: RawFd) {}
}

/// Adapter for the common read-only source.
pub struct ReadHandler<F: Fn(RawFd)>(pub F);

impl<F: Fn(RawFd)> SourceHandler for ReadHandler<F> {
    fn on_readable(&self, fd: RawFd) {
        (self.0)(fd)
    }
}

/// Handle to a registered source. Index-stable; the generation counter
/// detects reuse of the slot by a later registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId {
    index: u32,
    gen: u32,
}

struct Watch {
    fd: RawFd,
    interest: Interest,
    name: &'static str,
    handler: Rc<dyn SourceHandler>,
}

struct Slot {
    gen: u32,
    watch: Option<Watch>,
}

/// Registry of readiness-watched descriptors.
pub struct EventRegistry {
    slots: RefCell<Vec<Slot>>,
    /// LIFO stack of free slot indices for cache-friendly reuse.
    free: RefCell<Vec<u32>>,
    live: Cell<usize>,
    /// A handler set this to stop the current dispatch pass.
    abort: Cell<bool>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
            live: Cell::new(0),
            abort: Cell::new(false),
        }
    }

    /// Number of registered sources.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.get() == 0
    }

    /// Register a descriptor. Fails on a negative descriptor or an empty
    /// interest set; failures are reported, never fatal.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        name: &'static str,
        handler: Rc<dyn SourceHandler>,
    ) -> Result<SourceId, RegistryError> {
        if fd < 0 {
            return Err(RegistryError::InvalidDescriptor(fd));
        }
        if interest.is_empty() {
            return Err(RegistryError::NoCallback);
        }

        let mut slots = self.slots.borrow_mut();
        let index = match self.free.borrow_mut().pop() {
            Some(i) => i,
            None => {
                slots.push(Slot { gen: 0, watch: None });
                (slots.len() - 1) as u32
            }
        };
        let slot = &mut slots[index as usize];
        debug_assert!(slot.watch.is_none(), "free slot still occupied");
        slot.watch = Some(Watch { fd, interest, name, handler });
        self.live.set(self.live.get() + 1);

        let id = SourceId { index, gen: slot.gen };
        mdebug!("registered source '{}' fd={} slot={}", name, fd, index);
        Ok(id)
    }

    /// Unregister a source. O(1). Unregistering twice, or with an id whose
    /// slot was since reused, is reported as `StaleSource`.
    pub fn unregister(&self, id: SourceId) -> Result<(), RegistryError> {
        let watch = {
            let mut slots = self.slots.borrow_mut();
            let slot = slots
                .get_mut(id.index as usize)
                .filter(|s| s.gen == id.gen)
                .ok_or(RegistryError::StaleSource)?;
            let watch = slot.watch.take().ok_or(RegistryError::StaleSource)?;
            slot.gen = slot.gen.wrapping_add(1);
            watch
        };
        self.free.borrow_mut().push(id.index);
        self.live.set(self.live.get() - 1);
        mdebug!("unregistered source '{}' fd={} slot={}", watch.name, watch.fd, id.index);
        // Handler dropped here, outside any borrow.
        drop(watch);
        Ok(())
    }

    /// Does `id` still name a live registration?
    pub fn contains(&self, id: SourceId) -> bool {
        self.slots
            .borrow()
            .get(id.index as usize)
            .map_or(false, |s| s.gen == id.gen && s.watch.is_some())
    }

    /// Ask the dispatcher to stop after the callback currently running.
    pub fn request_abort(&self) {
        self.abort.set(true);
    }

    /// Value copy of a source's dispatch fields. The borrow is released
    /// before the caller invokes anything.
    fn snapshot(&self, id: SourceId) -> Option<(RawFd, Interest, Rc<dyn SourceHandler>)> {
        let slots = self.slots.borrow();
        let slot = slots.get(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        let watch = slot.watch.as_ref()?;
        Some((watch.fd, watch.interest, Rc::clone(&watch.handler)))
    }

    /// Snapshot the registered sources into an OS poll set.
    pub fn prepare(&self) -> PollSet {
        let slots = self.slots.borrow();
        let mut fds = Vec::with_capacity(self.live.get());
        let mut ids = Vec::with_capacity(self.live.get());
        for (index, slot) in slots.iter().enumerate() {
            let Some(watch) = slot.watch.as_ref() else { continue };
            let mut events: libc::c_short = 0;
            if watch.interest.is_readable() {
                events |= libc::POLLIN;
            }
            if watch.interest.is_writable() {
                events |= libc::POLLOUT;
            }
            if watch.interest.is_exception() {
                events |= libc::POLLPRI;
            }
            fds.push(libc::pollfd { fd: watch.fd, events, revents: 0 });
            ids.push(SourceId { index: index as u32, gen: slot.gen });
        }
        PollSet { fds, ids }
    }

    /// Dispatch every readiness event reported in `set`.
    ///
    /// Before each callback the source id is revalidated against the
    /// arena; sources unregistered earlier in the same pass (stale
    /// wakeups) are skipped silently. A handler's `request_abort` stops
    /// the pass after that handler returns. Returns the number of
    /// callbacks invoked.
    pub fn dispatch(&self, set: &mut PollSet) -> usize {
        const EXCEPTION_MASK: libc::c_short =
            libc::POLLPRI | libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
        const CLASSES: [(libc::c_short, Interest); 3] = [
            (libc::POLLIN, Interest::READABLE),
            (libc::POLLOUT, Interest::WRITABLE),
            (EXCEPTION_MASK, Interest::EXCEPTION),
        ];

        let mut fired = 0;
        for i in 0..set.fds.len() {
            if self.abort.take() {
                mdebug!("dispatch pass aborted");
                return fired;
            }
            let revents = set.fds[i].revents;
            if revents == 0 {
                continue;
            }
            // Consume the entry so a later pass over the same set cannot
            // re-trigger it.
            set.fds[i].revents = 0;
            let id = set.ids[i];

            for (mask, class) in CLASSES {
                if revents & mask == 0 {
                    continue;
                }
                // Revalidate between classes too: the readable callback
                // may have unregistered its own source.
                let Some((fd, interest, handler)) = self.snapshot(id) else {
                    mtrace!("stale wakeup for slot {}, ignored", id.index);
                    break;
                };
                if !interest.contains(class) {
                    continue;
                }
                if class.is_readable() {
                    handler.on_readable(fd);
                } else if class.is_writable() {
                    handler.on_writable(fd);
                } else {
                    handler.on_exception(fd);
                }
                fired += 1;
                if self.abort.take() {
                    mdebug!("dispatch pass aborted");
                    return fired;
                }
            }
        }
        fired
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("sources", &self.live.get())
            .finish()
    }
}

/// One prepared snapshot of pollable descriptors.
pub struct PollSet {
    fds: Vec<libc::pollfd>,
    ids: Vec<SourceId>,
}

impl PollSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Block until a descriptor is ready or `timeout` elapses
    /// (`None` blocks indefinitely). Returns the ready count; zero on
    /// timeout. EINTR is surfaced as `Interrupted`, meaning "nothing
    /// ready, try again" - any other failure is unrecoverable.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<usize, WaitError> {
        let ms = match timeout {
            None => -1,
            Some(d) => {
                // Round up so a sub-millisecond deadline does not busy-spin.
                let ms = (d.as_nanos() + 999_999) / 1_000_000;
                ms.min(i32::MAX as u128) as i32
            }
        };
        let ret = unsafe {
            libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, ms)
        };
        if ret < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == libc::EINTR {
                return Err(WaitError::Interrupted);
            }
            return Err(WaitError::Failed(errno));
        }
        Ok(ret as usize)
    }

    /// Mark a descriptor's readiness by hand. Test support: readiness
    /// normally comes from `wait`.
    #[cfg(test)]
    pub(crate) fn force_ready(&mut self, fd: RawFd, revents: libc::c_short) {
        for p in self.fds.iter_mut() {
            if p.fd == fd {
                p.revents = revents;
            }
        }
    }
}
