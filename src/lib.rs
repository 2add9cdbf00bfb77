use alloy_primitives::{
    B256,
    U256,
    utils::format_units,
};

pub mod animation;

pub mod decoder;

pub mod local_ledger;

pub mod provider;

pub mod session;

pub mod test_helpers;

pub mod lottery_types {
    use alloy_sol_types::sol;

    sol! {
        interface LotteryGame {
            function playGame() external payable;
            function TICKET_PRICE() external view returns (uint256);

            event TicketPurchased(address indexed player, uint256 amount);
            event GamePlayed(address indexed player, bool won, uint256[3] results);
        }
    }
}

/// Number of reels shown by the game and reported by `GamePlayed`.
pub const SLOT_COUNT: usize = 3;

pub type Slots = [u64; SLOT_COUNT];

/// Stable schema identifier of the result event (topic 0).
pub fn game_played_signature() -> B256 {
    use alloy_sol_types::SolEvent;
    lottery_types::LotteryGame::GamePlayed::SIGNATURE_HASH
}

/// Renders a wei amount as ether without trailing zeros, e.g. `0.0001`.
pub fn format_ether(wei: U256) -> String {
    match format_units(wei, "ether") {
        Ok(raw) if raw.contains('.') => raw
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_owned(),
        Ok(raw) => raw,
        Err(_) => format!("{wei} wei"),
    }
}
