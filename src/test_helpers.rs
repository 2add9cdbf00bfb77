use crate::{
    Slots,
    decoder::{
        GameOutcome,
        LogEntry,
    },
    game_played_signature,
    lottery_types::LotteryGame::{
        GamePlayed,
        TicketPurchased,
    },
    provider::{
        ConfirmationRecord,
        ConnectionProvider,
        ProviderError,
        TicketPrice,
    },
    session::Celebration,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
    address,
};
use alloy_sol_types::SolEvent;
use serde_json::{
    Value,
    json,
};
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::sync::oneshot;

pub const CONTRACT: Address = address!("0x8b0b0ca30e2ae09ff2c6bf9beafb72e13936624f");
pub const PLAYER: Address = address!("0x00000000000000000000000000000000000a11ce");

type Reply = Result<ConfirmationRecord, ProviderError>;

/// Provider double whose confirmations are released by the test.
pub struct ScriptedProvider {
    account: Address,
    ticket_price: Option<TicketPrice>,
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    submitted: Mutex<Vec<TicketPrice>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(ticket_price: TicketPrice) -> Self {
        Self {
            account: PLAYER,
            ticket_price: Some(ticket_price),
            replies: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
        }
    }

    /// No signing environment: `ticket_price` fails.
    pub fn unavailable() -> Self {
        Self {
            ticket_price: None,
            ..Self::new(TicketPrice::from_wei(U256::ZERO))
        }
    }

    /// Queues a reply for the next `submit_play`; it resolves once the
    /// returned gate is released.
    pub fn gate_next(&self) -> ReplyGate {
        let (send, recv) = oneshot::channel();
        self.replies.lock().unwrap().push_back(recv);
        ReplyGate(send)
    }

    pub fn reply_next(&self, reply: Reply) {
        self.gate_next().release(reply);
    }

    pub fn submitted(&self) -> Vec<TicketPrice> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }
}

pub struct ReplyGate(oneshot::Sender<Reply>);

impl ReplyGate {
    pub fn release(self, reply: Reply) {
        let _ = self.0.send(reply);
    }

    pub fn confirm(self, record: ConfirmationRecord) {
        self.release(Ok(record));
    }

    pub fn fail(self, err: ProviderError) {
        self.release(Err(err));
    }
}

impl ConnectionProvider for ScriptedProvider {
    async fn connect(&self) -> Result<Address, ProviderError> {
        Ok(self.account)
    }

    async fn ticket_price(&self) -> Result<TicketPrice, ProviderError> {
        self.ticket_price.ok_or_else(|| {
            ProviderError::ProviderUnavailable(String::from("no wallet detected"))
        })
    }

    async fn submit_play(&self, amount: TicketPrice) -> Reply {
        self.submitted.lock().unwrap().push(amount);
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        let result = match reply {
            Some(recv) => recv.await.unwrap_or_else(|_| {
                Err(ProviderError::NetworkError(String::from("reply gate dropped")))
            }),
            None => Err(ProviderError::NetworkError(String::from(
                "no scripted reply",
            ))),
        };
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Records every celebrated outcome.
#[derive(Default)]
pub struct RecordingCelebration {
    outcomes: Mutex<Vec<GameOutcome>>,
}

impl RecordingCelebration {
    pub fn outcomes(&self) -> Vec<GameOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl Celebration for RecordingCelebration {
    fn celebrate(&self, outcome: &GameOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

pub fn record(logs: Vec<LogEntry>) -> ConfirmationRecord {
    ConfirmationRecord::new(B256::repeat_byte(0xab), logs)
}

pub fn game_played_log(player: Address, won: bool, results: Slots) -> LogEntry {
    let event = GamePlayed {
        player,
        won,
        results: results.map(|value| U256::from(value)),
    };
    LogEntry::abi(CONTRACT, event.encode_log_data())
}

pub fn ticket_purchased_log(player: Address, amount: U256) -> LogEntry {
    let event = TicketPurchased { player, amount };
    LogEntry::abi(CONTRACT, event.encode_log_data())
}

/// `GamePlayed` as a relay hands it over: indexed player in topic 1 and the
/// arguments as JSON in whatever shape the relay chose.
pub fn relay_game_played_log(player: Address, won: bool, results: Vec<Value>) -> LogEntry {
    LogEntry::relay(
        CONTRACT,
        vec![game_played_signature(), player.into_word()],
        json!({
            "player": player.to_string(),
            "won": won,
            "results": results,
        }),
    )
}

/// ethers style fixed-width number.
pub fn big_number_json(value: u64) -> Value {
    json!({ "type": "BigNumber", "hex": format!("{value:#x}") })
}
