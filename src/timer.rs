//! Shared heartbeat timer wheel.
//!
//! A hashed wheel with one slot per resolution step over a heartbeat
//! interval. A single task advances the cursor every resolution step and
//! ticks every session registered in the slot it lands on, so each session
//! is ticked once per interval without owning a timer.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::debug;
use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

struct Wheel {
    slots: Vec<Vec<mpsc::Sender<()>>>,
    cursor: usize,
}

/// Handle to the shared wheel.
#[derive(Clone)]
pub(crate) struct HeartbeatWheel {
    wheel: Arc<Mutex<Wheel>>,
    resolution: Duration,
}

impl HeartbeatWheel {
    /// Create a wheel ticking each registration every `interval`.
    pub(crate) fn new(interval: Duration, resolution: Duration) -> Self {
        let resolution = resolution.max(Duration::from_millis(1)).min(interval.max(Duration::from_millis(1)));
        let slots = interval
            .as_nanos()
            .div_ceil(resolution.as_nanos())
            .max(1);
        let slots = usize::try_from(slots).unwrap_or(usize::MAX);
        Self {
            wheel: Arc::new(Mutex::new(Wheel {
                slots: (0..slots).map(|_| Vec::new()).collect(),
                cursor: 0,
            })),
            resolution,
        }
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> usize { self.lock().slots.len() }

    /// Register a new tick receiver.
    ///
    /// The first tick arrives one full rotation after registration. Ticks
    /// are not queued: a receiver that has not consumed the previous tick
    /// misses the next one. Dropping the receiver unregisters it.
    pub(crate) fn register(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let mut wheel = self.lock();
        let cursor = wheel.cursor;
        if let Some(slot) = wheel.slots.get_mut(cursor) {
            slot.push(tx);
        }
        rx
    }

    /// Advance the cursor by one slot and tick its registrations.
    pub(crate) fn advance(&self) {
        let mut wheel = self.lock();
        let len = wheel.slots.len();
        wheel.cursor = (wheel.cursor + 1) % len;
        let cursor = wheel.cursor;
        if let Some(slot) = wheel.slots.get_mut(cursor) {
            slot.retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Closed(()))));
        }
    }

    /// Advance the wheel every resolution step until `shutdown` is cancelled.
    ///
    /// Dropping the wheel on exit closes every tick receiver.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval_at(time::Instant::now() + self.resolution, self.resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                biased;

                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.advance(),
            }
        }
        let mut wheel = self.lock();
        wheel.slots.iter_mut().for_each(Vec::clear);
        debug!("heartbeat wheel stopped");
    }

    fn lock(&self) -> MutexGuard<'_, Wheel> { self.wheel.lock().unwrap_or_else(PoisonError::into_inner) }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::HeartbeatWheel;

    #[rstest]
    #[case(Duration::from_secs(10), Duration::from_millis(100), 100)]
    #[case(Duration::from_millis(250), Duration::from_millis(100), 3)]
    #[case(Duration::from_millis(50), Duration::from_secs(1), 1)]
    fn slot_count_covers_interval(
        #[case] interval: Duration,
        #[case] resolution: Duration,
        #[case] expected: usize,
    ) {
        assert_eq!(HeartbeatWheel::new(interval, resolution).slots(), expected);
    }

    #[test]
    fn ticks_once_per_rotation() {
        let wheel = HeartbeatWheel::new(Duration::from_millis(40), Duration::from_millis(10));
        let mut ticks = wheel.register();
        for _ in 0..3 {
            wheel.advance();
            assert_eq!(ticks.try_recv(), Err(TryRecvError::Empty));
        }
        wheel.advance();
        assert_eq!(ticks.try_recv(), Ok(()));
        for _ in 0..4 {
            wheel.advance();
        }
        assert_eq!(ticks.try_recv(), Ok(()));
    }

    #[test]
    fn unconsumed_ticks_do_not_pile_up() {
        let wheel = HeartbeatWheel::new(Duration::from_millis(20), Duration::from_millis(10));
        let mut ticks = wheel.register();
        for _ in 0..10 {
            wheel.advance();
        }
        assert_eq!(ticks.try_recv(), Ok(()));
        assert_eq!(ticks.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let wheel = HeartbeatWheel::new(Duration::from_millis(10), Duration::from_millis(10));
        drop(wheel.register());
        let mut live = wheel.register();
        wheel.advance();
        assert_eq!(live.try_recv(), Ok(()));
        assert_eq!(wheel.lock().slots[0].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_the_clock() {
        let wheel = HeartbeatWheel::new(Duration::from_millis(100), Duration::from_millis(10));
        let mut ticks = wheel.register();
        let token = tokio_util::sync::CancellationToken::new();
        let task = tokio::spawn(wheel.clone().run(token.clone()));
        let started = tokio::time::Instant::now();
        ticks.recv().await.expect("tick");
        assert!(started.elapsed() >= Duration::from_millis(100));
        token.cancel();
        task.await.expect("wheel task");
        assert_eq!(ticks.recv().await, None);
    }
}
