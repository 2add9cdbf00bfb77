use alloy_primitives::{
    U256,
    keccak256,
};
use base_lottery::{
    decoder::{
        self,
        LogPayload,
    },
    game_played_signature,
    local_ledger::{
        LOCAL_ACCOUNT,
        LocalLedger,
        LocalLedgerConfig,
        PayloadEncoding,
        WINNING_RESULTS,
    },
    provider::{
        ConnectionProvider,
        ProviderError,
        TicketPrice,
    },
    session::{
        GameSession,
        Phase,
    },
};
use std::time::Duration;
use tokio::time::Instant;

fn instant_config(win_probability: f64) -> LocalLedgerConfig {
    LocalLedgerConfig {
        latency: Duration::ZERO,
        win_probability,
        ..LocalLedgerConfig::default()
    }
}

#[tokio::test]
async fn submit_play__certain_win_reports_jackpot_and_returns_pot() {
    // given
    let config = instant_config(1.0);
    let price = config.ticket_price;
    let starting = config.starting_balance;
    let ledger = LocalLedger::seeded(config, 7);

    // when
    let record = ledger.submit_play(price).await.unwrap();

    // then
    let outcome = decoder::decode(&record).unwrap();
    assert!(outcome.won);
    assert_eq!(outcome.results, WINNING_RESULTS);
    assert_eq!(outcome.player, LOCAL_ACCOUNT);
    assert_eq!(ledger.balance().unwrap(), starting);
    assert_eq!(ledger.pot().unwrap(), U256::ZERO);
}

#[tokio::test]
async fn submit_play__certain_loss_keeps_ticket_in_pot() {
    // given
    let config = instant_config(0.0);
    let price = config.ticket_price;
    let starting = config.starting_balance;
    let ledger = LocalLedger::seeded(config, 7);

    // when
    let mut records = Vec::new();
    for _ in 0..20 {
        records.push(ledger.submit_play(price).await.unwrap());
    }

    // then
    for record in &records {
        let outcome = decoder::decode(record).unwrap();
        assert!(!outcome.won);
        let [a, b, c] = outcome.results;
        assert!(!(a == b && b == c), "losing reels matched: {:?}", outcome.results);
        assert!(outcome.results.iter().all(|digit| (1..=10).contains(digit)));
    }
    let paid = price.wei() * U256::from(records.len() as u64);
    assert_eq!(ledger.balance().unwrap(), starting - paid);
    assert_eq!(ledger.pot().unwrap(), paid);
}

#[tokio::test]
async fn submit_play__emits_purchase_before_result() {
    // given
    let config = instant_config(0.5);
    let price = config.ticket_price;
    let ledger = LocalLedger::seeded(config, 1);

    // when
    let record = ledger.submit_play(price).await.unwrap();

    // then
    assert_eq!(record.logs.len(), 2);
    assert_ne!(record.logs[0].schema_id(), Some(game_played_signature()));
    assert_eq!(record.logs[1].schema_id(), Some(game_played_signature()));
}

#[tokio::test]
async fn submit_play__tx_hash_is_keccak_of_nonce() {
    // given
    let config = instant_config(0.5);
    let price = config.ticket_price;
    let ledger = LocalLedger::seeded(config, 1);

    // when
    let first = ledger.submit_play(price).await.unwrap();
    let second = ledger.submit_play(price).await.unwrap();

    // then
    assert_eq!(first.tx_hash, keccak256(1u64.to_be_bytes()));
    assert_eq!(second.tx_hash, keccak256(2u64.to_be_bytes()));
}

#[tokio::test]
async fn submit_play__wrong_amount_reverts() {
    // given
    let config = instant_config(1.0);
    let starting = config.starting_balance;
    let ledger = LocalLedger::seeded(config, 3);
    let wrong = TicketPrice::from_wei(U256::from(1u64));

    // when
    let actual = ledger.submit_play(wrong).await;

    // then
    assert!(matches!(actual, Err(ProviderError::ActionReverted(_))));
    assert_eq!(ledger.balance().unwrap(), starting);
}

#[tokio::test]
async fn submit_play__insufficient_funds_is_network_error() {
    // given
    let config = LocalLedgerConfig {
        starting_balance: U256::from(10u64),
        ..instant_config(1.0)
    };
    let price = config.ticket_price;
    let ledger = LocalLedger::seeded(config, 3);

    // when
    let actual = ledger.submit_play(price).await;

    // then
    assert!(matches!(actual, Err(ProviderError::NetworkError(_))));
    assert_eq!(ledger.balance().unwrap(), U256::from(10u64));
}

#[tokio::test]
async fn submit_play__relay_payloads_decode_to_same_outcomes() {
    // given
    let config = LocalLedgerConfig {
        payload_encoding: PayloadEncoding::Relay,
        ..instant_config(0.3)
    };
    let price = config.ticket_price;
    let ledger = LocalLedger::seeded(config, 11);

    for _ in 0..30 {
        // when
        let record = ledger.submit_play(price).await.unwrap();

        // then
        assert!(matches!(record.logs[1].payload, LogPayload::Relay(_)));
        let outcome = decoder::decode(&record).unwrap();
        assert_eq!(outcome.player, LOCAL_ACCOUNT);
        assert_eq!(outcome.won, outcome.results == WINNING_RESULTS);
    }
}

#[tokio::test(start_paused = true)]
async fn submit_play__waits_for_confirmation_latency() {
    // given
    let config = LocalLedgerConfig {
        latency: Duration::from_millis(2_500),
        ..instant_config(0.5)
    };
    let price = config.ticket_price;
    let ledger = LocalLedger::seeded(config, 5);
    let start = Instant::now();

    // when
    ledger.submit_play(price).await.unwrap();

    // then
    assert!(start.elapsed() >= Duration::from_millis(2_500));
}

#[tokio::test(start_paused = true)]
async fn game_session__round_against_local_ledger_resolves() {
    // given
    let ledger = LocalLedger::seeded(instant_config(1.0), 9);
    let session = GameSession::connect(ledger).await.unwrap();
    assert_eq!(session.info().ticket_price.to_string(), "0.0001 ETH");

    // when
    let actual = session.begin_round().unwrap().finished().await;

    // then
    assert_eq!(actual.phase, Phase::Resolved);
    assert_eq!(actual.outcome, Some(true));
    assert_eq!(actual.visible_slots, WINNING_RESULTS);
}
