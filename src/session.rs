use crate::{
    Slots,
    animation::AnimationScheduler,
    decoder::{
        self,
        DecodeError,
        GameOutcome,
    },
    provider::{
        ConnectionProvider,
        ProviderError,
        TicketPrice,
    },
};
use alloy_primitives::Address;
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingConfirmation,
    Resolved,
    Failed,
}

/// What the front-end renders. Only the session mutates it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub visible_slots: Slots,
    pub outcome: Option<bool>,
    /// Present only when `phase` is `Failed`.
    pub error_message: Option<String>,
    pub round: u64,
}

impl SessionState {
    pub fn is_rolling(&self) -> bool {
        self.phase == Phase::AwaitingConfirmation
    }

    fn begin(&mut self) {
        self.phase = Phase::AwaitingConfirmation;
        self.outcome = None;
        self.error_message = None;
        self.round += 1;
    }

    fn resolve(&mut self, outcome: &GameOutcome) {
        self.phase = Phase::Resolved;
        self.visible_slots = outcome.results;
        self.outcome = Some(outcome.won);
        self.error_message = None;
    }

    fn fail(&mut self, err: &RoundError) {
        self.phase = Phase::Failed;
        // rendered like a loss; error_message tells the two apart
        self.outcome = Some(false);
        self.error_message = Some(err.user_message());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("round aborted: {0}")]
    Aborted(String),
}

impl RoundError {
    pub fn user_message(&self) -> String {
        format!("Round could not be completed: {self}")
    }
}

/// Cosmetic reaction to a winning round. Must not block.
pub trait Celebration: Send + Sync {
    fn celebrate(&self, outcome: &GameOutcome);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCelebration;

impl Celebration for NoCelebration {
    fn celebrate(&self, _outcome: &GameOutcome) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub account: Address,
    pub ticket_price: TicketPrice,
}

pub struct GameSession<P> {
    provider: Arc<P>,
    info: SessionInfo,
    animation: AnimationScheduler,
    celebration: Arc<dyn Celebration>,
    state: Arc<watch::Sender<SessionState>>,
}

impl<P> GameSession<P>
where
    P: ConnectionProvider + Send + Sync + 'static,
{
    /// Requests the signing account and reads the ticket price.
    pub async fn connect(provider: P) -> Result<Self, ProviderError> {
        let account = provider.connect().await?;
        let ticket_price = provider.ticket_price().await?;
        info!(%account, %ticket_price, "session connected");
        let (state, _) = watch::channel(SessionState::default());
        Ok(Self {
            provider: Arc::new(provider),
            info: SessionInfo {
                account,
                ticket_price,
            },
            animation: AnimationScheduler::default(),
            celebration: Arc::new(NoCelebration),
            state: Arc::new(state),
        })
    }

    pub fn with_animation(mut self, animation: AnimationScheduler) -> Self {
        self.animation = animation;
        self
    }

    pub fn with_celebration(mut self, celebration: Arc<dyn Celebration>) -> Self {
        self.celebration = celebration;
        self
    }

    pub fn info(&self) -> SessionInfo {
        self.info
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Starts a round unless one is already awaiting confirmation, in which
    /// case the trigger is ignored and `None` is returned.
    ///
    /// The round runs on the current tokio runtime. Called outside one, it
    /// also returns `None` and the state is left untouched.
    pub fn begin_round(&self) -> Option<RoundHandle> {
        let Ok(runtime) = Handle::try_current() else {
            warn!("no tokio runtime, cannot start a round");
            return None;
        };
        let started = self.state.send_if_modified(|state| {
            if state.is_rolling() {
                return false;
            }
            state.begin();
            true
        });
        if !started {
            debug!("round already in flight, ignoring trigger");
            return None;
        }

        let round = self.state.borrow().round;
        info!(round, price = %self.info.ticket_price, "round started");
        let task = runtime.spawn(play_round(
            round,
            self.provider.clone(),
            self.info.ticket_price,
            self.animation.clone(),
            self.celebration.clone(),
            self.state.clone(),
        ));
        Some(RoundHandle {
            round,
            task,
            state: self.state.clone(),
        })
    }
}

async fn play_round<P>(
    round: u64,
    provider: Arc<P>,
    price: TicketPrice,
    animation: AnimationScheduler,
    celebration: Arc<dyn Celebration>,
    state: Arc<watch::Sender<SessionState>>,
) where
    P: ConnectionProvider + Send + Sync + 'static,
{
    let frames = state.clone();
    let ticker = animation.start(move |slots| {
        frames.send_modify(|state| state.visible_slots = slots);
    });

    let confirmation = AssertUnwindSafe(async { provider.submit_play(price).await })
        .catch_unwind()
        .await;
    // no frame may land after this point
    ticker.stop().await;

    let result = match confirmation {
        Ok(Ok(record)) => {
            debug!(round, tx_hash = %record.tx_hash, logs = record.logs.len(), "play confirmed");
            decoder::decode(&record).map_err(RoundError::from)
        }
        Ok(Err(e)) => Err(RoundError::from(e)),
        Err(panic) => Err(RoundError::Aborted(panic_message(panic.as_ref()))),
    };

    match result {
        Ok(outcome) => {
            info!(
                round,
                won = outcome.won,
                results = ?outcome.results,
                player = %outcome.player,
                "round resolved"
            );
            state.send_modify(|state| state.resolve(&outcome));
            if outcome.won {
                celebration.celebrate(&outcome);
            }
        }
        Err(err) => {
            warn!(round, error = %err, "round failed");
            state.send_modify(|state| state.fail(&err));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("provider panicked")
    }
}

/// A round in flight. Dropping it leaves the round running.
#[derive(Debug)]
pub struct RoundHandle {
    round: u64,
    task: JoinHandle<()>,
    state: Arc<watch::Sender<SessionState>>,
}

impl RoundHandle {
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Waits for the round to publish its final state and returns it.
    pub async fn finished(self) -> SessionState {
        if let Err(err) = self.task.await {
            warn!(round = self.round, error = %err, "round task did not complete");
        }
        self.state.borrow().clone()
    }
}
