use crate::{
    SLOT_COUNT,
    Slots,
    game_played_signature,
    lottery_types::LotteryGame::GamePlayed,
    provider::ConfirmationRecord,
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    LogData,
    U256,
};
use alloy_sol_types::SolEvent;
use serde::Deserialize;
use serde_json::{
    Number,
    Value,
};
use std::num::IntErrorKind;


/// One log emitted while the paid action executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub payload: LogPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogPayload {
    /// ABI encoded data exactly as emitted on chain.
    Abi(Bytes),
    /// Arguments already decoded by a relay or an older client library,
    /// keyed by parameter name. Numbers keep whatever shape the relay chose.
    Relay(Value),
}

impl LogEntry {
    pub fn abi(address: Address, log: LogData) -> Self {
        Self {
            address,
            topics: log.topics().to_vec(),
            payload: LogPayload::Abi(log.data),
        }
    }

    pub fn relay(address: Address, topics: Vec<B256>, args: Value) -> Self {
        Self {
            address,
            topics,
            payload: LogPayload::Relay(args),
        }
    }

    /// Topic 0, the event signature hash.
    pub fn schema_id(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    pub player: Address,
    pub won: bool,
    pub results: Slots,
}

/// A result value in one of the shapes client libraries hand back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawNumber {
    /// Fixed-width 256 bit word.
    Word(U256),
    /// Arbitrary-precision decimal digits.
    BigInt(String),
    Native(u64),
}

impl RawNumber {
    pub fn from_json(value: &Value) -> Result<Self, MalformedOutcome> {
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(native) => Ok(RawNumber::Native(native)),
                None => number_literal(n),
            },
            Value::String(s) => parse_numeric_string(s),
            Value::Object(map) => {
                // ethers style BigNumber: {"type":"BigNumber","hex":"0x07"}
                // or the in-memory form {"_hex":"0x07","_isBigNumber":true}
                let hex = map
                    .get("hex")
                    .or_else(|| map.get("_hex"))
                    .and_then(Value::as_str);
                let tagged = map.get("type").and_then(Value::as_str) == Some("BigNumber")
                    || map.get("_isBigNumber").and_then(Value::as_bool) == Some(true);
                match hex {
                    Some(hex) if tagged && has_hex_prefix(hex) => parse_numeric_string(hex),
                    _ => Err(MalformedOutcome::NotNumeric(value.to_string())),
                }
            }
            _ => Err(MalformedOutcome::NotNumeric(value.to_string())),
        }
    }

    /// Converts into the native numeric domain without losing precision.
    pub fn normalize(&self) -> Result<u64, MalformedOutcome> {
        match self {
            RawNumber::Word(word) => u64::try_from(*word)
                .map_err(|_| MalformedOutcome::ValueOutOfRange(word.to_string())),
            RawNumber::BigInt(digits) => {
                digits.parse::<u64>().map_err(|e| match e.kind() {
                    IntErrorKind::PosOverflow => {
                        MalformedOutcome::ValueOutOfRange(digits.clone())
                    }
                    _ => MalformedOutcome::NotNumeric(digits.clone()),
                })
            }
            RawNumber::Native(n) => Ok(*n),
        }
    }
}

// Integers wider than u64 arrive as their exact digits (`arbitrary_precision`).
fn number_literal(n: &Number) -> Result<RawNumber, MalformedOutcome> {
    let literal = n.to_string();
    if literal.chars().all(|c| c.is_ascii_digit()) {
        return parse_numeric_string(&literal);
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 => {
            if f < U64_BOUND {
                Ok(RawNumber::Native(f as u64))
            } else {
                Err(MalformedOutcome::ValueOutOfRange(literal))
            }
        }
        _ => Err(MalformedOutcome::NotNumeric(literal)),
    }
}

/// 2^64, the first float that no longer fits a u64.
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

fn has_hex_prefix(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

fn parse_numeric_string(raw: &str) -> Result<RawNumber, MalformedOutcome> {
    let s = raw.trim();
    if has_hex_prefix(s) {
        let digits = &s[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MalformedOutcome::NotNumeric(raw.to_owned()));
        }
        // valid hex that does not parse is wider than a word
        return U256::from_str_radix(digits, 16)
            .map(RawNumber::Word)
            .map_err(|_| MalformedOutcome::ValueOutOfRange(raw.to_owned()));
    }
    let digits = s.strip_suffix('n').unwrap_or(s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MalformedOutcome::NotNumeric(raw.to_owned()));
    }
    Ok(RawNumber::BigInt(digits.to_owned()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("outcome not found in confirmation record")]
    OutcomeNotFound,
    #[error("malformed outcome: {0}")]
    Malformed(#[from] MalformedOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedOutcome {
    #[error("payload does not match GamePlayed: {0}")]
    Abi(String),
    #[error("expected {expected} results, found {found}")]
    WrongArity { expected: usize, found: usize },
    #[error("{0} is not a number")]
    NotNumeric(String),
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("value {0} is out of range")]
    ValueOutOfRange(String),
}

struct RawOutcome {
    player: Address,
    won: bool,
    results: Vec<RawNumber>,
}

#[derive(Deserialize)]
struct RelayArgs {
    #[serde(default)]
    player: Option<String>,
    won: bool,
    results: Vec<Value>,
}

/// Extracts the authoritative `GamePlayed` outcome from a confirmation.
///
/// Entries are matched by topic 0 only. The first match wins, even when a
/// later entry would decode; a malformed first match fails the decode.
pub fn decode(record: &ConfirmationRecord) -> Result<GameOutcome, DecodeError> {
    let signature = game_played_signature();
    let entry = record
        .logs
        .iter()
        .find(|entry| entry.schema_id() == Some(signature))
        .ok_or(DecodeError::OutcomeNotFound)?;

    let raw = match &entry.payload {
        LogPayload::Abi(data) => raw_from_abi(&entry.topics, data)?,
        LogPayload::Relay(args) => raw_from_relay(&entry.topics, args)?,
    };

    Ok(GameOutcome {
        player: raw.player,
        won: raw.won,
        results: normalize_results(&raw.results)?,
    })
}

fn raw_from_abi(topics: &[B256], data: &Bytes) -> Result<RawOutcome, MalformedOutcome> {
    let event = GamePlayed::decode_raw_log(topics.iter().copied(), data)
        .map_err(|e| MalformedOutcome::Abi(e.to_string()))?;
    Ok(RawOutcome {
        player: event.player,
        won: event.won,
        results: event.results.iter().copied().map(RawNumber::Word).collect(),
    })
}

fn raw_from_relay(topics: &[B256], args: &Value) -> Result<RawOutcome, MalformedOutcome> {
    let args = RelayArgs::deserialize(args).map_err(|e| MalformedOutcome::InvalidField {
        field: "payload",
        reason: e.to_string(),
    })?;
    let player = match (args.player, topics.get(1)) {
        (Some(raw), _) => {
            raw.parse::<Address>()
                .map_err(|e| MalformedOutcome::InvalidField {
                    field: "player",
                    reason: e.to_string(),
                })?
        }
        (None, Some(topic)) => Address::from_word(*topic),
        (None, None) => {
            return Err(MalformedOutcome::InvalidField {
                field: "player",
                reason: String::from("missing"),
            });
        }
    };
    let results = args
        .results
        .iter()
        .map(RawNumber::from_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawOutcome {
        player,
        won: args.won,
        results,
    })
}

fn normalize_results(raw: &[RawNumber]) -> Result<Slots, MalformedOutcome> {
    if raw.len() != SLOT_COUNT {
        return Err(MalformedOutcome::WrongArity {
            expected: SLOT_COUNT,
            found: raw.len(),
        });
    }
    let mut slots = [0u64; SLOT_COUNT];
    for (slot, value) in slots.iter_mut().zip(raw) {
        *slot = value.normalize()?;
    }
    Ok(slots)
}
