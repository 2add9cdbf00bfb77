use crate::{
    decoder::LogEntry,
    format_ether,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use std::fmt;

/// Amount attached to every paid play, in wei.
///
/// The session never computes on it: it is read once from the provider and
/// handed back unmodified with each `submit_play`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TicketPrice(U256);

impl TicketPrice {
    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub const fn wei(&self) -> U256 {
        self.0
    }
}

impl fmt::Display for TicketPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", format_ether(self.0))
    }
}

/// Receipt of a confirmed paid action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfirmationRecord {
    pub tx_hash: B256,
    pub logs: Vec<LogEntry>,
}

impl ConfirmationRecord {
    pub fn new(tx_hash: B256, logs: Vec<LogEntry>) -> Self {
        Self { tx_hash, logs }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no compatible signing environment: {0}")]
    ProviderUnavailable(String),
    #[error("action rejected by signer: {0}")]
    ActionRejected(String),
    #[error("action reverted: {0}")]
    ActionReverted(String),
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Signing handle onto the game contract.
///
/// Every method is a suspension point; a round only ever has one
/// `submit_play` outstanding.
pub trait ConnectionProvider {
    /// Requests the account that will sign paid actions.
    fn connect(&self) -> impl Future<Output = Result<Address, ProviderError>> + Send;

    fn ticket_price(
        &self,
    ) -> impl Future<Output = Result<TicketPrice, ProviderError>> + Send;

    /// Submits `playGame()` with `amount` attached and waits until the ledger
    /// confirms or rejects it. No timeout is applied here.
    fn submit_play(
        &self,
        amount: TicketPrice,
    ) -> impl Future<Output = Result<ConfirmationRecord, ProviderError>> + Send;
}
