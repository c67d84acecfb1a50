//! Single-shot session alarms (inactivity and token expiry)
//!
//! Each alarm kind has at most one live timer. Arming a kind always cancels
//! its previous timer first. A fired alarm is delivered as [`AlarmFired`] on a
//! channel and only counts once [`AlarmScheduler::claim`] accepts it: firings
//! from a timer that was cancelled or re-armed in the meantime carry an old
//! generation and are rejected.
//!
//! Timers run on tokio's clock, so tests drive them with paused time.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    Inactivity,
    Expiry,
}

impl AlarmKind {
    fn index(self) -> usize {
        match self {
            AlarmKind::Inactivity => 0,
            AlarmKind::Expiry => 1,
        }
    }
}

/// Delivered when an alarm's timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFired {
    pub kind: AlarmKind,
    generation: u64,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Slot {
    fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Owner of the inactivity and expiry alarms of one session.
///
/// Must be used from within a Tokio runtime.
pub struct AlarmScheduler {
    slots: Mutex<[Slot; 2]>,
    fired: mpsc::UnboundedSender<AlarmFired>,
}

impl AlarmScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlarmFired>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            slots: Mutex::new([Slot::default(), Slot::default()]),
            fired,
        };
        (scheduler, rx)
    }

    /// Cancel any live `kind` alarm, then fire once after `delay`.
    pub fn arm(&self, kind: AlarmKind, delay: Duration) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[kind.index()];
        slot.disarm();
        slot.generation += 1;

        let fired = AlarmFired {
            kind,
            generation: slot.generation,
        };
        let tx = self.fired.clone();
        // deadline fixed now, not when the task is first polled
        let deadline = Instant::now() + delay;
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(fired);
        }));
    }

    pub fn cancel(&self, kind: AlarmKind) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[kind.index()];
        slot.disarm();
        // invalidates a firing that is already queued
        slot.generation += 1;
    }

    pub fn cancel_all(&self) {
        self.cancel(AlarmKind::Inactivity);
        self.cancel(AlarmKind::Expiry);
    }

    pub fn is_armed(&self, kind: AlarmKind) -> bool {
        self.slots.lock()[kind.index()].handle.is_some()
    }

    /// Accept a firing if it belongs to the live timer, disarming it.
    pub fn claim(&self, fired: AlarmFired) -> bool {
        let mut slots = self.slots.lock();
        let slot = &mut slots[fired.kind.index()];
        if slot.generation != fired.generation || slot.handle.is_none() {
            return false;
        }
        slot.handle = None;
        true
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().iter_mut() {
            slot.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (alarms, mut rx) = AlarmScheduler::new();
        alarms.arm(AlarmKind::Expiry, Duration::from_secs(60));
        assert!(alarms.is_armed(AlarmKind::Expiry));

        tokio::time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        tokio::time::advance(Duration::from_secs(1)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, AlarmKind::Expiry);
        assert!(alarms.claim(fired));
        assert!(!alarms.claim(fired), "a firing is claimed only once");
        assert!(!alarms.is_armed(AlarmKind::Expiry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (alarms, mut rx) = AlarmScheduler::new();
        alarms.arm(AlarmKind::Inactivity, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        alarms.arm(AlarmKind::Inactivity, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        tokio::time::advance(Duration::from_secs(5)).await;
        let fired = rx.recv().await.unwrap();
        assert!(alarms.claim(fired));

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rejects_queued_firing() {
        let (alarms, mut rx) = AlarmScheduler::new();
        alarms.arm(AlarmKind::Expiry, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        let fired = rx.recv().await.unwrap();

        // cancelled after the timer elapsed but before the firing was handled
        alarms.cancel(AlarmKind::Expiry);
        assert!(!alarms.claim(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let (alarms, mut rx) = AlarmScheduler::new();
        alarms.arm(AlarmKind::Inactivity, Duration::from_secs(30));
        alarms.arm(AlarmKind::Expiry, Duration::from_secs(10));
        alarms.cancel(AlarmKind::Expiry);

        assert!(alarms.is_armed(AlarmKind::Inactivity));
        assert!(!alarms.is_armed(AlarmKind::Expiry));

        tokio::time::advance(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        tokio::time::advance(Duration::from_secs(1)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, AlarmKind::Inactivity);
        assert!(alarms.claim(fired));
    }
}
