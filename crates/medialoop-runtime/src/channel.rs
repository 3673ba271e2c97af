//! Cross-thread notification channel.
//!
//! One OS pipe, wrapped so worker threads can wake the reactor and hand
//! it arbitrary bytes without sharing memory. The read end is registered
//! as an event source; the reactor's wakeup callback drains exactly one
//! frame per readable event.
//!
//! # Wire format
//!
//! Each frame is `[u64 little-endian length][length payload bytes]`,
//! written as two sequential transfers and read back the same way. The
//! length width is fixed at 8 bytes regardless of the platform word size,
//! so differently built producers and consumers stay in agreement.
//!
//! # Concurrency contract
//!
//! `ChannelPost` carries no lock of its own: multiple threads posting to
//! the same channel must serialize with an external lock or their two
//! header/payload writes may interleave. Payloads above [`SAFE_PAYLOAD`]
//! can block the poster, because the OS pipe buffer is finite. `get` is
//! only ever called on the reactor thread, inside the wakeup callback.

use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use nix::errno::Errno;
use nix::unistd;

use medialoop_core::error::ChannelError;
use medialoop_core::{mdebug, mwarn};

use crate::registry::{EventRegistry, Interest, SourceHandler, SourceId};

/// Frame header width: fixed 8-byte little-endian length.
pub const FRAME_HEADER: usize = 8;

/// Largest payload guaranteed not to block the poster.
pub const SAFE_PAYLOAD: usize = 4096;

struct ChannelShared {
    rx: OwnedFd,
}

fn read_exact(fd: RawFd, buf: &mut [u8]) -> Result<(), ChannelError> {
    let mut done = 0;
    while done < buf.len() {
        let n = unsafe {
            libc::read(
                fd,
                buf[done..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - done,
            )
        };
        if n == 0 {
            // Write end closed mid-frame.
            return Err(ChannelError::Io(libc::EPIPE));
        }
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EINTR {
                continue;
            }
            return Err(ChannelError::Io(errno as i32));
        }
        done += n as usize;
    }
    Ok(())
}

fn write_all(fd: RawFd, buf: &[u8]) -> Result<(), ChannelError> {
    let mut done = 0;
    while done < buf.len() {
        let n = unsafe {
            libc::write(
                fd,
                buf[done..].as_ptr() as *const libc::c_void,
                buf.len() - done,
            )
        };
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EINTR {
                continue;
            }
            return Err(ChannelError::Io(errno as i32));
        }
        done += n as usize;
    }
    Ok(())
}

/// Receiving half, used inside the wakeup callback.
#[derive(Clone)]
pub struct ChannelReceiver {
    shared: Rc<ChannelShared>,
}

impl ChannelReceiver {
    /// Read one frame into `buf`, returning the payload length.
    ///
    /// Every successful wakeup must be matched by exactly one `get`, even
    /// when the payload is discarded; otherwise the byte stream loses its
    /// framing for all subsequent messages. A frame longer than `buf` is
    /// drained and dropped, reported as `Desync`.
    pub fn get(&self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let fd = self.shared.rx.as_raw_fd();
        let mut header = [0u8; FRAME_HEADER];
        read_exact(fd, &mut header)?;
        let len = u64::from_le_bytes(header) as usize;

        if len > buf.len() {
            // Drain the oversized payload to keep the stream framed.
            let mut sink = [0u8; 256];
            let mut left = len;
            while left > 0 {
                let chunk = left.min(sink.len());
                read_exact(fd, &mut sink[..chunk])?;
                left -= chunk;
            }
            mwarn!("channel frame of {} bytes dropped (buffer holds {})", len, buf.len());
            return Err(ChannelError::Desync { frame_len: len, capacity: buf.len() });
        }

        read_exact(fd, &mut buf[..len])?;
        Ok(len)
    }

    /// Read one string frame posted by `post_string`. `max_len` bounds
    /// the accepted frame length, terminator included.
    pub fn get_string(&self, max_len: usize) -> Result<String, ChannelError> {
        let mut buf = vec![0u8; max_len];
        let n = self.get(&mut buf)?;
        let bytes = match buf[..n].split_last() {
            Some((&0, body)) => body,
            _ => &buf[..n], // tolerate a missing terminator
        };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Posting half. `Clone`, `Send`, no internal lock (see module docs).
#[derive(Clone)]
pub struct ChannelPost {
    tx: Arc<OwnedFd>,
}

impl ChannelPost {
    /// Post one frame. Fails when the pipe write fails (e.g. the channel
    /// was destroyed and the read end is closed).
    pub fn post(&self, payload: &[u8]) -> Result<(), ChannelError> {
        let header = (payload.len() as u64).to_le_bytes();
        write_all(self.tx.as_raw_fd(), &header)?;
        write_all(self.tx.as_raw_fd(), payload)
    }

    /// Post the bytes of `s` including a NUL terminator.
    pub fn post_string(&self, s: &str) -> Result<(), ChannelError> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.post(&bytes)
    }
}

/// Internal readable-callback: hands the receiver to the user's wakeup.
struct Trampoline {
    recv: ChannelReceiver,
    wakeup: Box<dyn Fn(&ChannelReceiver)>,
}

impl SourceHandler for Trampoline {
    fn on_readable(&self, _fd: RawFd) {
        (self.wakeup)(&self.recv)
    }
}

/// A pipe-backed one-way channel from worker threads into the reactor.
///
/// Owned by the reactor thread. Dropping (or calling [`destroy`]) closes
/// the read end and unregisters the event source; outstanding
/// `ChannelPost` clones keep the write end alive until they drop, and
/// their posts fail with a broken pipe from then on.
///
/// [`destroy`]: ThreadChannel::destroy
pub struct ThreadChannel {
    shared: Rc<ChannelShared>,
    tx: Arc<OwnedFd>,
    source: Cell<Option<SourceId>>,
    registry: Rc<EventRegistry>,
    name: &'static str,
}

impl ThreadChannel {
    /// Allocate the pipe and register its read end; `on_wakeup` runs on
    /// the reactor thread once per readable event and must call
    /// `ChannelReceiver::get` exactly once.
    pub fn create<F>(
        registry: Rc<EventRegistry>,
        name: &'static str,
        on_wakeup: F,
    ) -> Result<(ThreadChannel, ChannelPost), ChannelError>
    where
        F: Fn(&ChannelReceiver) + 'static,
    {
        let (rx, tx) = unistd::pipe().map_err(|e| ChannelError::Io(e as i32))?;
        let shared = Rc::new(ChannelShared { rx });
        let handler = Rc::new(Trampoline {
            recv: ChannelReceiver { shared: Rc::clone(&shared) },
            wakeup: Box::new(on_wakeup),
        });
        let source = registry.register(
            shared.rx.as_raw_fd(),
            Interest::READABLE,
            name,
            handler,
        )?;
        mdebug!("channel '{}' created (rx fd={})", name, shared.rx.as_raw_fd());

        let tx = Arc::new(tx);
        let post = ChannelPost { tx: Arc::clone(&tx) };
        let channel = ThreadChannel {
            shared,
            tx,
            source: Cell::new(Some(source)),
            registry,
            name,
        };
        Ok((channel, post))
    }

    /// Another posting handle for a further producer thread.
    pub fn poster(&self) -> ChannelPost {
        ChannelPost { tx: Arc::clone(&self.tx) }
    }

    /// Unregister the event source and close this side's pipe ends.
    pub fn destroy(self) {
        // Drop does the work.
    }
}

impl Drop for ThreadChannel {
    fn drop(&mut self) {
        if let Some(id) = self.source.take() {
            if self.registry.unregister(id).is_err() {
                mwarn!("channel '{}' wakeup source already gone", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::thread;

    /// Registry + channel wired so tests can pump wakeups by hand.
    fn pump(registry: &Rc<EventRegistry>) -> usize {
        let mut set = registry.prepare();
        let n = set.wait(Some(std::time::Duration::from_millis(500))).unwrap();
        if n > 0 {
            registry.dispatch(&mut set);
        }
        n
    }

    #[test]
    fn test_round_trip_sizes() {
        for size in [1usize, 255, 4096] {
            let registry = Rc::new(EventRegistry::new());
            let got: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
            let got2 = Rc::clone(&got);
            let (channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", move |rx| {
                let mut buf = vec![0u8; 8192];
                let n = rx.get(&mut buf).unwrap();
                got2.borrow_mut().push(buf[..n].to_vec());
            })
            .unwrap();

            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            post.post(&payload).unwrap();
            pump(&registry);

            let frames = got.borrow();
            assert_eq!(frames.len(), 1, "size {}", size);
            assert_eq!(frames[0], payload, "size {}", size);
            drop(frames);
            channel.destroy();
        }
    }

    #[test]
    fn test_fifo_across_frames() {
        let registry = Rc::new(EventRegistry::new());
        let got: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let got2 = Rc::clone(&got);
        let (_channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", move |rx| {
            let mut buf = [0u8; 16];
            let n = rx.get(&mut buf).unwrap();
            assert_eq!(n, 1);
            got2.borrow_mut().push(buf[0]);
        })
        .unwrap();

        for i in 0u8..5 {
            post.post(&[i]).unwrap();
        }
        // Level-triggered: the fd stays readable until all frames drain.
        while got.borrow().len() < 5 {
            assert!(pump(&registry) > 0, "pipe went quiet early");
        }
        assert_eq!(*got.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_post_from_worker_thread() {
        let registry = Rc::new(EventRegistry::new());
        let got: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let got2 = Rc::clone(&got);
        let (_channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", move |rx| {
            got2.borrow_mut().push(rx.get_string(64).unwrap());
        })
        .unwrap();

        let worker = thread::spawn(move || {
            post.post_string("frame ready").unwrap();
        });
        worker.join().unwrap();
        pump(&registry);
        assert_eq!(*got.borrow(), vec!["frame ready".to_string()]);
    }

    #[test]
    fn test_oversized_frame_reports_desync_and_keeps_framing() {
        let registry = Rc::new(EventRegistry::new());
        let got: Rc<RefCell<Vec<Result<Vec<u8>, ChannelError>>>> =
            Rc::new(RefCell::new(Vec::new()));
        let got2 = Rc::clone(&got);
        let (_channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", move |rx| {
            let mut buf = [0u8; 4];
            let res = rx.get(&mut buf).map(|n| buf[..n].to_vec());
            got2.borrow_mut().push(res);
        })
        .unwrap();

        post.post(&[9u8; 600]).unwrap(); // exceeds the 4-byte buffer
        post.post(&[1, 2]).unwrap();
        while got.borrow().len() < 2 {
            assert!(pump(&registry) > 0, "pipe went quiet early");
        }

        let frames = got.borrow();
        assert_eq!(
            frames[0],
            Err(ChannelError::Desync { frame_len: 600, capacity: 4 })
        );
        // The stream stayed framed: the next frame decodes intact.
        assert_eq!(frames[1], Ok(vec![1, 2]));
    }

    #[test]
    fn test_zero_length_frame() {
        let registry = Rc::new(EventRegistry::new());
        let woke = Rc::new(Cell::new(0u32));
        let woke2 = Rc::clone(&woke);
        let (_channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", move |rx| {
            let mut buf = [0u8; 4];
            assert_eq!(rx.get(&mut buf).unwrap(), 0);
            woke2.set(woke2.get() + 1);
        })
        .unwrap();

        post.post(&[]).unwrap();
        pump(&registry);
        assert_eq!(woke.get(), 1);
    }

    #[test]
    fn test_destroy_unregisters_and_breaks_posters() {
        let registry = Rc::new(EventRegistry::new());
        let (channel, post) = ThreadChannel::create(Rc::clone(&registry), "test", |rx| {
            let mut buf = [0u8; 4];
            let _ = rx.get(&mut buf);
        })
        .unwrap();
        assert_eq!(registry.len(), 1);
        channel.destroy();
        assert_eq!(registry.len(), 0);
        // The read end is gone: posting now fails with a broken pipe.
        assert_eq!(post.post(&[1]), Err(ChannelError::Io(libc::EPIPE)));
    }
}
