use crate::{
    SLOT_COUNT,
    Slots,
    decoder::LogEntry,
    lottery_types::LotteryGame::{
        GamePlayed,
        TicketPurchased,
        playGameCall,
    },
    provider::{
        ConfirmationRecord,
        ConnectionProvider,
        ProviderError,
        TicketPrice,
    },
};
use alloy_primitives::{
    Address,
    U256,
    address,
    keccak256,
};
use alloy_sol_types::{
    SolCall,
    SolEvent,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use serde_json::{
    Value,
    json,
};
use std::{
    ops::RangeInclusive,
    sync::Mutex,
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_LATENCY: Duration = Duration::from_millis(2_500);
pub const DEFAULT_WIN_PROBABILITY: f64 = 0.1;
pub const DEFAULT_TICKET_PRICE_WEI: u64 = 100_000_000_000_000;
pub const DEFAULT_STARTING_BALANCE_WEI: u64 = 1_000_000_000_000_000_000;
pub const WINNING_RESULTS: Slots = [7; SLOT_COUNT];
pub const RESULT_DIGITS: RangeInclusive<u64> = 1..=10;

pub const LOCAL_ACCOUNT: Address = address!("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub const LOCAL_CONTRACT: Address = address!("0x5fbdb2315678afecb367f032d93f642f64180aa3");

/// How `GamePlayed` arguments are handed to the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Raw ABI data, as a node returns it.
    #[default]
    Abi,
    /// Pre-decoded JSON with mixed numeric shapes, as a relay returns it.
    Relay,
}

#[derive(Clone, Debug)]
pub struct LocalLedgerConfig {
    pub latency: Duration,
    /// Chance in `0.0..=1.0` that a play wins.
    pub win_probability: f64,
    pub ticket_price: TicketPrice,
    pub starting_balance: U256,
    pub payload_encoding: PayloadEncoding,
    pub account: Address,
    pub contract: Address,
}

impl Default for LocalLedgerConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            win_probability: DEFAULT_WIN_PROBABILITY,
            ticket_price: TicketPrice::from_wei(U256::from(DEFAULT_TICKET_PRICE_WEI)),
            starting_balance: U256::from(DEFAULT_STARTING_BALANCE_WEI),
            payload_encoding: PayloadEncoding::Abi,
            account: LOCAL_ACCOUNT,
            contract: LOCAL_CONTRACT,
        }
    }
}

struct LedgerState {
    balance: U256,
    pot: U256,
    nonce: u64,
    rng: StdRng,
}

/// In-process stand-in for the deployed game contract.
///
/// Tickets are paid into a pot; a winning play sweeps the pot back to the
/// player.
pub struct LocalLedger {
    config: LocalLedgerConfig,
    state: Mutex<LedgerState>,
}

impl LocalLedger {
    pub fn new(config: LocalLedgerConfig) -> Self {
        Self::with_rng(config, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic ledger for tests and replays.
    pub fn seeded(config: LocalLedgerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LocalLedgerConfig, rng: StdRng) -> Self {
        let state = LedgerState {
            balance: config.starting_balance,
            pot: U256::ZERO,
            nonce: 0,
            rng,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &LocalLedgerConfig {
        &self.config
    }

    pub fn balance(&self) -> Result<U256, ProviderError> {
        Ok(self.lock()?.balance)
    }

    pub fn pot(&self) -> Result<U256, ProviderError> {
        Ok(self.lock()?.pot)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, ProviderError> {
        self.state
            .lock()
            .map_err(|_| ProviderError::NetworkError(String::from("ledger state poisoned")))
    }

    /// Checks a node performs before accepting the transaction.
    fn admit(&self, amount: TicketPrice) -> Result<(), ProviderError> {
        let state = self.lock()?;
        if state.balance < amount.wei() {
            return Err(ProviderError::NetworkError(format!(
                "insufficient funds: balance {} wei, value {} wei",
                state.balance,
                amount.wei()
            )));
        }
        Ok(())
    }

    fn execute(&self, amount: TicketPrice) -> Result<ConfirmationRecord, ProviderError> {
        if amount != self.config.ticket_price {
            return Err(ProviderError::ActionReverted(format!(
                "incorrect ticket price: sent {amount}, expected {}",
                self.config.ticket_price
            )));
        }

        let mut state = self.lock()?;
        // balance may have moved while the transaction was pending
        state.balance = state.balance.checked_sub(amount.wei()).ok_or_else(|| {
            ProviderError::NetworkError(String::from("insufficient funds"))
        })?;
        state.pot += amount.wei();

        let won = state.rng.random::<f64>() < self.config.win_probability;
        let results = if won {
            WINNING_RESULTS
        } else {
            losing_results(&mut state.rng)
        };
        if won {
            let pot = std::mem::replace(&mut state.pot, U256::ZERO);
            state.balance += pot;
        }

        state.nonce += 1;
        let tx_hash = keccak256(state.nonce.to_be_bytes());
        let logs = vec![
            self.ticket_purchased(amount),
            self.game_played(won, results, &mut state.rng),
        ];
        debug!(
            %tx_hash,
            nonce = state.nonce,
            won,
            ?results,
            "local ledger executed play"
        );
        Ok(ConfirmationRecord::new(tx_hash, logs))
    }

    fn ticket_purchased(&self, amount: TicketPrice) -> LogEntry {
        let event = TicketPurchased {
            player: self.config.account,
            amount: amount.wei(),
        };
        LogEntry::abi(self.config.contract, event.encode_log_data())
    }

    fn game_played(&self, won: bool, results: Slots, rng: &mut StdRng) -> LogEntry {
        match self.config.payload_encoding {
            PayloadEncoding::Abi => {
                let event = GamePlayed {
                    player: self.config.account,
                    won,
                    results: results.map(U256::from),
                };
                LogEntry::abi(self.config.contract, event.encode_log_data())
            }
            PayloadEncoding::Relay => {
                let topics = vec![
                    GamePlayed::SIGNATURE_HASH,
                    self.config.account.into_word(),
                ];
                let results: Vec<Value> =
                    results.iter().map(|value| relay_number(*value, rng)).collect();
                LogEntry::relay(
                    self.config.contract,
                    topics,
                    json!({
                        "player": self.config.account.to_checksum(None),
                        "won": won,
                        "results": results,
                    }),
                )
            }
        }
    }
}

/// Three digits that never all match.
fn losing_results(rng: &mut impl Rng) -> Slots {
    let mut slots = [0u64; SLOT_COUNT];
    for slot in &mut slots {
        *slot = rng.random_range(RESULT_DIGITS);
    }
    if slots.iter().all(|digit| *digit == slots[0]) {
        let last = &mut slots[SLOT_COUNT - 1];
        *last = if *last == *RESULT_DIGITS.end() {
            *RESULT_DIGITS.start()
        } else {
            *last + 1
        };
    }
    slots
}

/// Picks one of the shapes relays are known to emit.
fn relay_number(value: u64, rng: &mut impl Rng) -> Value {
    match rng.random_range(0..4u8) {
        0 => json!({ "type": "BigNumber", "hex": format!("{value:#x}") }),
        1 => json!(value.to_string()),
        2 => json!(format!("{value}n")),
        _ => json!(value),
    }
}

impl ConnectionProvider for LocalLedger {
    async fn connect(&self) -> Result<Address, ProviderError> {
        Ok(self.config.account)
    }

    async fn ticket_price(&self) -> Result<TicketPrice, ProviderError> {
        Ok(self.config.ticket_price)
    }

    async fn submit_play(
        &self,
        amount: TicketPrice,
    ) -> Result<ConfirmationRecord, ProviderError> {
        debug!(
            selector = %format!("0x{}", hex::encode(playGameCall::SELECTOR)),
            value = %amount,
            "submitting play"
        );
        self.admit(amount)?;
        tokio::time::sleep(self.config.latency).await;
        self.execute(amount)
    }
}
