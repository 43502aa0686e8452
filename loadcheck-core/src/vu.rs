use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use loadcheck_metrics::Gauge;
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// One-shot broadcast flag: set once, awaited by many.
#[derive(Debug, Default)]
struct Latch {
    set: AtomicBool,
    notify: Notify,
}

impl Latch {
    fn set(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent `set` cannot be missed.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Released once every virtual user has been spawned.
#[derive(Debug, Default)]
pub struct StartSignal(Latch);

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.0.set();
    }

    pub async fn wait(&self) {
        self.0.wait().await;
    }
}

/// Advisory stop: virtual users finish their current iteration and start no new one.
#[derive(Debug, Default)]
pub struct StopSignal(Latch);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.set();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_set()
    }

    pub async fn stopped(&self) {
        self.0.wait().await;
    }
}

/// Cloneable handle for stopping a run from outside (e.g. on Ctrl-C).
#[derive(Debug, Clone)]
pub struct StopHandle(pub(crate) Arc<StopSignal>);

impl StopHandle {
    pub fn stop(&self) {
        tracing::info!("stop requested");
        self.0.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl VuState {
    fn can_become(self, to: VuState) -> bool {
        matches!(
            (self, to),
            (VuState::Idle, VuState::Running)
                | (VuState::Idle, VuState::Stopped)
                | (VuState::Running, VuState::Paused)
                | (VuState::Running, VuState::Stopped)
                | (VuState::Paused, VuState::Running)
                | (VuState::Paused, VuState::Stopped)
        )
    }
}

/// Lifecycle of a single virtual user.
#[derive(Debug)]
pub struct VuLifecycle {
    vu: u64,
    state: VuState,
}

impl VuLifecycle {
    pub fn new(vu: u64) -> Self {
        Self {
            vu,
            state: VuState::Idle,
        }
    }

    pub fn state(&self) -> VuState {
        self.state
    }

    pub fn transition(&mut self, to: VuState) -> Result<()> {
        if !self.state.can_become(to) {
            return Err(Error::InvalidTransition {
                vu: self.vu,
                from: self.state,
                to,
            });
        }
        tracing::trace!(vu = self.vu, from = %self.state, %to, "vu state");
        self.state = to;
        Ok(())
    }
}

/// Counts a virtual user on the `vus` gauge while it is alive.
pub(crate) struct ActiveVuGuard {
    vus: Arc<Gauge>,
}

impl ActiveVuGuard {
    pub(crate) fn enter(vus: Arc<Gauge>) -> Self {
        vus.add(1);
        Self { vus }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.vus.add(-1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lifecycle_accepts_valid_paths() {
        let mut vu = VuLifecycle::new(1);
        for to in [
            VuState::Running,
            VuState::Paused,
            VuState::Running,
            VuState::Stopped,
        ] {
            vu.transition(to).unwrap_or_else(|e| panic!("{e}"));
        }
        assert_eq!(vu.state(), VuState::Stopped);
    }

    #[test]
    fn lifecycle_rejects_invalid_paths() {
        let mut vu = VuLifecycle::new(7);
        assert!(matches!(
            vu.transition(VuState::Paused),
            Err(Error::InvalidTransition {
                vu: 7,
                from: VuState::Idle,
                to: VuState::Paused
            })
        ));
        vu.transition(VuState::Stopped)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(vu.transition(VuState::Running).is_err());
    }

    #[test]
    fn active_guard_tracks_peak() {
        let vus = Arc::new(Gauge::default());
        {
            let _a = ActiveVuGuard::enter(vus.clone());
            let _b = ActiveVuGuard::enter(vus.clone());
            assert_eq!(vus.value(), 2);
        }
        assert_eq!(vus.value(), 0);
        assert_eq!(vus.max(), 2);
    }

    #[tokio::test]
    async fn stop_wakes_waiters_registered_before_and_after() {
        let stop = Arc::new(StopSignal::new());
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.stopped().await })
        };
        tokio::task::yield_now().await;
        stop.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap_or_else(|_| panic!("waiter not woken"))
            .unwrap_or_else(|e| panic!("{e}"));
        // Already stopped: resolves immediately.
        stop.stopped().await;
        assert!(stop.is_stopped());
    }
}
