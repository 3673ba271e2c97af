//! Deadline-ordered software timers.
//!
//! The schedule is a fixed-capacity pool guarded by one mutex, shared
//! between the reactor thread (which fires timers) and any worker thread
//! that adds or cancels them - cross-thread cancellation during object
//! teardown must not race the reactor firing the same timer.
//!
//! Callbacks receive a `&C` context argument supplied to `trigger` by the
//! caller (the main loop passes itself), so a `Send + Sync` callback can
//! still reach reactor-thread state at fire time. Callbacks run with the
//! pool lock released; calling back into `add`/`remove`/`cancel_owner`
//! from inside a timer callback is legal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use medialoop_core::{mdebug, mtrace};

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Single-shot or repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    Single,
    Repeated,
}

/// Identifies the collaborator that owns a set of timers, for bulk
/// cancellation and leak diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerTag(pub u64);

impl OwnerTag {
    /// Mint a process-unique owner tag.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OwnerTag(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type TimerFn<C> = Arc<dyn Fn(&C) + Send + Sync>;

struct TimerSlot<C> {
    id: u64,
    deadline: Instant,
    interval: Duration,
    mode: TimerMode,
    owner: OwnerTag,
    /// Diagnostic tag naming the code that armed the timer.
    origin: &'static str,
    callback: TimerFn<C>,
}

struct TimerPool<C> {
    slots: Box<[Option<TimerSlot<C>>]>,
    armed: usize,
    next_id: u64,
}

/// Mutex-guarded pool of timers with a hard capacity.
///
/// `C` is the context type handed to callbacks at fire time; standalone
/// users can instantiate `TimerSchedule<()>`.
pub struct TimerSchedule<C = ()> {
    inner: Mutex<TimerPool<C>>,
    capacity: usize,
}

impl<C> TimerSchedule<C> {
    /// Create a schedule holding at most `capacity` simultaneous timers.
    /// The bound is a configuration constant; exceeding it at `add` time
    /// is fatal.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "timer pool capacity must be at least 1");
        Self {
            inner: Mutex::new(TimerPool {
                slots: (0..capacity).map(|_| None).collect(),
                armed: 0,
                next_id: 1,
            }),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().armed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arm a timer firing `first` from now; `Repeated` timers then fire
    /// every `interval`. Panics when the pool is exhausted.
    pub fn add<F>(
        &self,
        first: Duration,
        interval: Duration,
        mode: TimerMode,
        owner: OwnerTag,
        origin: &'static str,
        callback: F,
    ) -> TimerId
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.arm(Instant::now() + first, interval, mode, owner, origin, Arc::new(callback))
    }

    /// Like `add`, but the whole schedule is pushed back by an extra
    /// `delay` before the first fire.
    pub fn add_delayed<F>(
        &self,
        delay: Duration,
        first: Duration,
        interval: Duration,
        mode: TimerMode,
        owner: OwnerTag,
        origin: &'static str,
        callback: F,
    ) -> TimerId
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.arm(
            Instant::now() + delay + first,
            interval,
            mode,
            owner,
            origin,
            Arc::new(callback),
        )
    }

    fn arm(
        &self,
        deadline: Instant,
        interval: Duration,
        mode: TimerMode,
        owner: OwnerTag,
        origin: &'static str,
        callback: TimerFn<C>,
    ) -> TimerId {
        let mut pool = self.inner.lock().unwrap();
        let Some(index) = pool.slots.iter().position(|s| s.is_none()) else {
            // A fixed bound on simultaneous timers is part of the system
            // configuration; running past it is not a recoverable state.
            panic!(
                "timer pool exhausted ({} slots) while arming timer from {}",
                self.capacity, origin
            );
        };
        let id = pool.next_id;
        pool.next_id += 1;
        pool.slots[index] = Some(TimerSlot {
            id,
            deadline,
            interval,
            mode,
            owner,
            origin,
            callback,
        });
        pool.armed += 1;
        mdebug!("armed timer {} from {} ({:?})", id, origin, mode);
        TimerId(id)
    }

    /// Cancel a timer. Calling with an id that already fired and was
    /// removed is a no-op returning false.
    pub fn remove(&self, id: TimerId) -> bool {
        let mut pool = self.inner.lock().unwrap();
        for slot in pool.slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.id == id.0) {
                *slot = None;
                pool.armed -= 1;
                mdebug!("removed timer {}", id.0);
                return true;
            }
        }
        false
    }

    /// Cancel every timer belonging to `owner`. Returns how many were
    /// cancelled. Used when tearing an object down, possibly from a
    /// non-reactor thread.
    pub fn cancel_owner(&self, owner: OwnerTag) -> usize {
        let mut pool = self.inner.lock().unwrap();
        let mut cancelled = 0;
        for slot in pool.slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.owner == owner) {
                *slot = None;
                cancelled += 1;
            }
        }
        pool.armed -= cancelled;
        if cancelled > 0 {
            mdebug!("cancelled {} timer(s) of owner {}", cancelled, owner.0);
        }
        cancelled
    }

    /// Leak diagnostic: does `owner` still have timers armed?
    pub fn has_listener(&self, owner: OwnerTag) -> bool {
        let pool = self.inner.lock().unwrap();
        pool.slots
            .iter()
            .any(|slot| slot.as_ref().is_some_and(|s| s.owner == owner))
    }

    /// Time until the earliest deadline, zero if already due, `None` when
    /// no timer is pending (the loop then blocks without a bound).
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        let pool = self.inner.lock().unwrap();
        pool.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|s| s.deadline))
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Fire every timer due at `now`, in deadline order, passing `ctx` to
    /// each callback. `Repeated` timers are rescheduled one interval past
    /// their own previous deadline (not past `now`), so a late pass
    /// catches up one interval at a time without shifting cadence.
    /// Returns the number fired.
    pub fn trigger(&self, now: Instant, ctx: &C) -> usize {
        let mut due: Vec<(Instant, u64, TimerFn<C>)> = Vec::new();
        {
            let mut pool = self.inner.lock().unwrap();
            let mut fired_singles = 0;
            for slot in pool.slots.iter_mut() {
                let Some(s) = slot.as_mut() else { continue };
                if s.deadline > now {
                    continue;
                }
                due.push((s.deadline, s.id, Arc::clone(&s.callback)));
                match s.mode {
                    TimerMode::Repeated => s.deadline += s.interval,
                    TimerMode::Single => {
                        *slot = None;
                        fired_singles += 1;
                    }
                }
            }
            pool.armed -= fired_singles;
        }
        // Invoke outside the lock so callbacks may re-enter the schedule.
        due.sort_by_key(|(deadline, id, _)| (*deadline, *id));
        for (_, id, callback) in &due {
            mtrace!("firing timer {}", id);
            callback(ctx);
        }
        due.len()
    }
}

impl<C> std::fmt::Debug for TimerSchedule<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSchedule")
            .field("capacity", &self.capacity)
            .field("armed", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_cb(counter: &Arc<AtomicUsize>) -> impl Fn(&()) + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_single_fires_once() {
        let sched = TimerSchedule::<()>::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        sched.add(Duration::from_millis(10), Duration::ZERO, TimerMode::Single,
                  OwnerTag::next(), "test", counter_cb(&fired));

        assert_eq!(sched.trigger(t0, &()), 0); // not due yet
        assert_eq!(sched.trigger(t0 + Duration::from_millis(20), &()), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(sched.is_empty());
        // Long past the deadline, nothing fires again.
        assert_eq!(sched.trigger(t0 + Duration::from_secs(1), &()), 0);
    }

    #[test]
    fn test_remove_prevents_fire() {
        let sched = TimerSchedule::<()>::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = sched.add(Duration::from_millis(5), Duration::ZERO, TimerMode::Single,
                           OwnerTag::next(), "test", counter_cb(&fired));
        assert!(sched.remove(id));
        assert_eq!(sched.trigger(Instant::now() + Duration::from_secs(1), &()), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // Removing again is a harmless no-op.
        assert!(!sched.remove(id));
    }

    #[test]
    fn test_repeated_cadence_chains_from_deadline() {
        let sched = TimerSchedule::<()>::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        let interval = Duration::from_millis(100);
        sched.add(interval, interval, TimerMode::Repeated,
                  OwnerTag::next(), "test", counter_cb(&fired));

        // Fire at t0+I.
        assert_eq!(sched.trigger(t0 + interval, &()), 1);
        // Next deadline chained to t0+2I even though we fired late.
        let next = sched.next_timeout(t0 + interval).unwrap();
        assert_eq!(next, interval);

        // A very late pass catches up one interval at a time.
        let late = t0 + Duration::from_millis(450);
        assert_eq!(sched.trigger(late, &()), 1); // deadline now t0+3I
        assert_eq!(sched.trigger(late, &()), 1); // deadline now t0+4I
        assert_eq!(sched.trigger(late, &()), 1); // deadline now t0+5I > late
        assert_eq!(sched.trigger(late, &()), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_add_delayed_offsets_first_fire() {
        let sched = TimerSchedule::<()>::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        sched.add_delayed(Duration::from_millis(50), Duration::from_millis(10),
                          Duration::ZERO, TimerMode::Single,
                          OwnerTag::next(), "test", counter_cb(&fired));
        assert_eq!(sched.trigger(t0 + Duration::from_millis(30), &()), 0);
        assert_eq!(sched.trigger(t0 + Duration::from_millis(70), &()), 1);
    }

    #[test]
    fn test_deadline_order() {
        let sched = TimerSchedule::<()>::new(8);
        let order = Arc::new(Mutex::new(Vec::new()));
        let t0 = Instant::now();
        for (tag, offset) in [(2u32, 20u64), (1, 10), (3, 30)] {
            let order = Arc::clone(&order);
            sched.add(Duration::from_millis(offset), Duration::ZERO, TimerMode::Single,
                      OwnerTag::next(), "test", move |_| order.lock().unwrap().push(tag));
        }
        sched.trigger(t0 + Duration::from_millis(100), &());
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_owner_bulk_cancel_and_leak_query() {
        let sched = TimerSchedule::<()>::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let owner = OwnerTag::next();
        let other = OwnerTag::next();
        sched.add(Duration::from_millis(1), Duration::ZERO, TimerMode::Single,
                  owner, "test", counter_cb(&fired));
        sched.add(Duration::from_millis(1), Duration::from_millis(1), TimerMode::Repeated,
                  owner, "test", counter_cb(&fired));
        sched.add(Duration::from_millis(1), Duration::ZERO, TimerMode::Single,
                  other, "test", counter_cb(&fired));

        assert!(sched.has_listener(owner));
        assert_eq!(sched.cancel_owner(owner), 2);
        assert!(!sched.has_listener(owner));
        assert!(sched.has_listener(other));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_next_timeout() {
        let sched = TimerSchedule::<()>::new(8);
        let now = Instant::now();
        assert!(sched.next_timeout(now).is_none());
        sched.add(Duration::from_millis(100), Duration::ZERO, TimerMode::Single,
                  OwnerTag::next(), "test", |_| {});
        let t = sched.next_timeout(now).unwrap();
        assert!(t <= Duration::from_millis(101));
        // Past the deadline the timeout clamps to zero.
        assert_eq!(
            sched.next_timeout(now + Duration::from_secs(5)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_callback_rearms_from_inside_trigger() {
        let sched = Arc::new(TimerSchedule::<()>::new(8));
        let fired = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        {
            let sched2 = Arc::clone(&sched);
            let fired = Arc::clone(&fired);
            sched.add(Duration::from_millis(1), Duration::ZERO, TimerMode::Single,
                      OwnerTag::next(), "test", move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                // Re-entrant add must not deadlock.
                let fired2 = Arc::clone(&fired);
                sched2.add(Duration::from_millis(1), Duration::ZERO, TimerMode::Single,
                           OwnerTag::next(), "test-nested", move |_| {
                    fired2.fetch_add(1, Ordering::SeqCst);
                });
            });
        }
        sched.trigger(t0 + Duration::from_millis(10), &());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        sched.trigger(t0 + Duration::from_millis(50), &());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cross_thread_cancel() {
        let sched = Arc::new(TimerSchedule::<()>::new(32));
        let owner = OwnerTag::next();
        for _ in 0..16 {
            sched.add(Duration::from_secs(60), Duration::ZERO, TimerMode::Single,
                      owner, "test", |_| {});
        }
        let sched2 = Arc::clone(&sched);
        let t = std::thread::spawn(move || sched2.cancel_owner(owner));
        assert_eq!(t.join().unwrap(), 16);
        assert!(sched.is_empty());
    }

    #[test]
    #[should_panic(expected = "timer pool exhausted")]
    fn test_capacity_exhaustion_is_fatal() {
        let sched = TimerSchedule::<()>::new(2);
        for _ in 0..3 {
            sched.add(Duration::from_secs(1), Duration::ZERO, TimerMode::Single,
                      OwnerTag::next(), "test-overflow", |_| {});
        }
    }
}
