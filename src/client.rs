use crate::ui;
use alloy_primitives::Address;
use base_lottery::{
    Slots,
    animation::AnimationScheduler,
    decoder::GameOutcome,
    local_ledger::{
        LocalLedger,
        LocalLedgerConfig,
    },
    provider::{
        ConnectionProvider,
        TicketPrice,
    },
    session::{
        Celebration,
        GameSession,
        Phase,
        SessionState,
    },
};
use chrono::{
    DateTime,
    Local,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    time::{
        self,
        Instant,
    },
};

pub const RECENT_ROUNDS: usize = 10;
pub const CELEBRATION_DURATION: Duration = Duration::from_secs(3);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(250);
pub const LOCAL_NETWORK: &str = "local ledger";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub ledger: LocalLedgerConfig,
    pub tick_interval: Duration,
    pub network: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundResult {
    Won(Slots),
    Lost(Slots),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct RoundRecord {
    pub round: u64,
    pub finished_at: DateTime<Local>,
    pub result: RoundResult,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub account: Address,
    pub network: String,
    pub ticket_price: TicketPrice,
    pub state: SessionState,
    /// Oldest first.
    pub recent_rounds: Vec<RoundRecord>,
    /// Winning reels while the celebration banner is up.
    pub celebration: Option<Slots>,
}

/// Hands winning outcomes to the UI loop without blocking the round task.
pub struct ChannelCelebration(mpsc::UnboundedSender<GameOutcome>);

impl ChannelCelebration {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GameOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl Celebration for ChannelCelebration {
    fn celebrate(&self, outcome: &GameOutcome) {
        let _ = self.0.send(outcome.clone());
    }
}

pub struct AppController<P> {
    session: GameSession<P>,
    network: String,
    recent_rounds: VecDeque<RoundRecord>,
    last_recorded_round: u64,
    celebration: Option<(Slots, Instant)>,
}

impl<P> AppController<P>
where
    P: ConnectionProvider + Send + Sync + 'static,
{
    pub fn new(session: GameSession<P>, network: impl Into<String>) -> Self {
        Self {
            session,
            network: network.into(),
            recent_rounds: VecDeque::with_capacity(RECENT_ROUNDS),
            last_recorded_round: 0,
            celebration: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Returns false when a round is already in flight.
    pub fn play(&mut self) -> bool {
        self.session.begin_round().is_some()
    }

    /// Records a round in the history the first time it is seen finished.
    pub fn observe(&mut self, state: &SessionState) {
        if state.round <= self.last_recorded_round {
            return;
        }
        let result = match (state.phase, state.outcome) {
            (Phase::Resolved, Some(true)) => RoundResult::Won(state.visible_slots),
            (Phase::Resolved, _) => RoundResult::Lost(state.visible_slots),
            (Phase::Failed, _) => {
                RoundResult::Failed(state.error_message.clone().unwrap_or_default())
            }
            (Phase::Idle | Phase::AwaitingConfirmation, _) => return,
        };
        self.last_recorded_round = state.round;
        if self.recent_rounds.len() == RECENT_ROUNDS {
            self.recent_rounds.pop_front();
        }
        self.recent_rounds.push_back(RoundRecord {
            round: state.round,
            finished_at: Local::now(),
            result,
        });
    }

    pub fn celebrate(&mut self, outcome: &GameOutcome, now: Instant) {
        self.celebration = Some((outcome.results, now + CELEBRATION_DURATION));
    }

    /// Drops an expired banner. Returns true when the screen needs a redraw.
    pub fn expire_celebration(&mut self, now: Instant) -> bool {
        match self.celebration {
            Some((_, until)) if until <= now => {
                self.celebration = None;
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let info = self.session.info();
        let state = self.session.current_state();
        // a new round hides the previous celebration
        let celebration = self
            .celebration
            .filter(|_| !state.is_rolling())
            .map(|(results, _)| results);
        AppSnapshot {
            account: info.account,
            network: self.network.clone(),
            ticket_price: info.ticket_price,
            state,
            recent_rounds: self.recent_rounds.iter().cloned().collect(),
            celebration,
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (celebration, celebrations) = ChannelCelebration::channel();
    let ledger = LocalLedger::new(config.ledger.clone());
    // connection errors surface before the terminal is taken over
    let session = GameSession::connect(ledger)
        .await?
        .with_animation(AnimationScheduler::new(
            config.tick_interval,
            base_lottery::animation::DEFAULT_DIGIT_RANGE,
        ))
        .with_celebration(Arc::new(celebration));
    let controller = AppController::new(session, config.network);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events, celebrations).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<P>(
    mut controller: AppController<P>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    mut celebrations: mpsc::UnboundedReceiver<GameOutcome>,
) -> Result<()>
where
    P: ConnectionProvider + Send + Sync + 'static,
{
    let mut states = controller.subscribe();
    let mut housekeeping = time::interval(HOUSEKEEPING_INTERVAL);
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    tracing::warn!("session state channel closed");
                    break;
                }
                let state = states.borrow_and_update().clone();
                controller.observe(&state);
            }
            Some(outcome) = celebrations.recv() => {
                controller.celebrate(&outcome, Instant::now());
            }
            _ = housekeeping.tick() => {
                if !controller.expire_celebration(Instant::now()) {
                    continue;
                }
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let Some(ev) = ui::interpret_event(raw_ev?) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Play => {
                        if !controller.play() {
                            continue;
                        }
                    }
                    ui::UserEvent::Redraw => {}
                }
            }
        }
        ui::draw(ui_state, &controller.snapshot()).wrap_err("redraw failed")?;
    }
    tracing::info!("UI loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy_primitives::U256;
    use base_lottery::test_helpers::{
        PLAYER,
        ScriptedProvider,
    };

    async fn controller() -> AppController<ScriptedProvider> {
        let price = TicketPrice::from_wei(U256::from(100u64));
        let session = GameSession::connect(ScriptedProvider::new(price))
            .await
            .unwrap();
        AppController::new(session, LOCAL_NETWORK)
    }

    fn finished(round: u64, phase: Phase, outcome: bool, slots: Slots) -> SessionState {
        SessionState {
            phase,
            visible_slots: slots,
            outcome: Some(outcome),
            error_message: (phase == Phase::Failed)
                .then(|| String::from("Round could not be completed: boom")),
            round,
        }
    }

    #[tokio::test]
    async fn observe__records_each_finished_round_once() {
        // given
        let mut controller = controller().await;
        let rolling = SessionState {
            phase: Phase::AwaitingConfirmation,
            round: 1,
            ..SessionState::default()
        };

        // when
        controller.observe(&rolling);
        controller.observe(&finished(1, Phase::Resolved, true, [7, 7, 7]));
        controller.observe(&finished(1, Phase::Resolved, true, [7, 7, 7]));
        controller.observe(&finished(2, Phase::Failed, false, [3, 3, 1]));

        // then
        let results: Vec<_> = controller
            .snapshot()
            .recent_rounds
            .into_iter()
            .map(|r| (r.round, r.result))
            .collect();
        assert_eq!(
            results,
            vec![
                (1, RoundResult::Won([7, 7, 7])),
                (
                    2,
                    RoundResult::Failed(String::from(
                        "Round could not be completed: boom"
                    ))
                ),
            ]
        );
    }

    #[tokio::test]
    async fn observe__keeps_only_recent_rounds() {
        // given
        let mut controller = controller().await;

        // when
        for round in 1..=15 {
            controller.observe(&finished(round, Phase::Resolved, false, [1, 2, 3]));
        }

        // then
        let rounds: Vec<u64> = controller
            .snapshot()
            .recent_rounds
            .iter()
            .map(|r| r.round)
            .collect();
        assert_eq!(rounds, (6..=15).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn celebrate__banner_expires_after_duration() {
        // given
        let mut controller = controller().await;
        let outcome = GameOutcome {
            player: PLAYER,
            won: true,
            results: [7, 7, 7],
        };
        let start = Instant::now();

        // when
        controller.celebrate(&outcome, start);

        // then
        assert_eq!(controller.snapshot().celebration, Some([7, 7, 7]));
        assert!(!controller.expire_celebration(start + Duration::from_secs(1)));
        assert!(controller.expire_celebration(start + CELEBRATION_DURATION));
        assert_eq!(controller.snapshot().celebration, None);
    }
}
