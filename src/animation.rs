use crate::{
    SLOT_COUNT,
    Slots,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use std::{
    ops::RangeInclusive,
    time::Duration,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DIGIT_RANGE: RangeInclusive<u64> = 1..=10;

/// Produces placeholder reel frames while a round is waiting on the ledger.
///
/// Frames are cosmetic only. The authoritative result always comes from the
/// confirmation record.
#[derive(Clone, Debug)]
pub struct AnimationScheduler {
    interval: Duration,
    digits: RangeInclusive<u64>,
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_DIGIT_RANGE)
    }
}

impl AnimationScheduler {
    pub fn new(interval: Duration, digits: RangeInclusive<u64>) -> Self {
        Self { interval, digits }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the ticking task. The first frame is delivered immediately.
    pub fn start<F>(&self, mut on_tick: F) -> AnimationHandle
    where
        F: FnMut(Slots) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.interval;
        let digits = self.digits.clone();
        let task = tokio::spawn(async move {
            let mut rng = StdRng::from_rng(&mut rand::rng());
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    // stop always wins over a tick that is ready at the same time
                    biased;
                    _ = &mut stop_rx => break,
                    scheduled = ticker.tick() => {
                        let lag = scheduled.elapsed();
                        if lag >= period {
                            tracing::debug!(lag_ms = lag.as_millis() as u64, "animation ticks skipped");
                        }
                        on_tick(random_slots(&mut rng, &digits));
                    }
                }
            }
            tracing::trace!("animation stopped");
        });
        AnimationHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

fn random_slots(rng: &mut impl Rng, digits: &RangeInclusive<u64>) -> Slots {
    let mut slots = [0u64; SLOT_COUNT];
    for slot in &mut slots {
        *slot = rng.random_range(digits.clone());
    }
    slots
}

/// Running animation. Dropping it without `stop` aborts the ticking task.
#[derive(Debug)]
pub struct AnimationHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AnimationHandle {
    /// Stops the animation and waits for the ticking task to exit. Once this
    /// returns the callback is never invoked again.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            tracing::error!(error = %err, "animation task panicked");
        }
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
