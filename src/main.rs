use alloy_primitives::U256;
use base_lottery::{
    animation::DEFAULT_TICK_INTERVAL,
    local_ledger::{
        DEFAULT_LATENCY,
        LocalLedgerConfig,
        PayloadEncoding,
    },
    provider::TicketPrice,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

const DEFAULT_LOG_DIR: &str = "./logs";
const LOG_FILE: &str = "base-lottery.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn print_usage_and_exit() -> ! {
    let defaults = LocalLedgerConfig::default();
    println!(
        "Usage: base-lottery [--latency-ms <n>] [--win-rate <p>] [--ticket-wei <n>]\n\
         [--balance-wei <n>] [--tick-ms <n>] [--relay-payloads] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --latency-ms <n>    Confirmation latency of the local ledger (default {})\n\
           --win-rate <p>      Win probability between 0 and 1 (default {})\n\
           --ticket-wei <n>    Ticket price in wei (default {})\n\
           --balance-wei <n>   Starting balance in wei (default {})\n\
           --tick-ms <n>       Reel animation cadence (default {})\n\
           --relay-payloads    Report results as relay-style JSON instead of ABI data\n\
           --log-dir <path>    Directory for the log file (default {DEFAULT_LOG_DIR})",
        DEFAULT_LATENCY.as_millis(),
        defaults.win_probability,
        defaults.ticket_price.wei(),
        defaults.starting_balance,
        DEFAULT_TICK_INTERVAL.as_millis(),
    );
    std::process::exit(0);
}

struct CliArgs {
    app: client::AppConfig,
    log_dir: PathBuf,
}

fn parse_cli_args() -> Result<CliArgs> {
    parse_args(std::env::args().skip(1))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut ledger = LocalLedgerConfig::default();
    let mut tick_interval = DEFAULT_TICK_INTERVAL;
    let mut log_dir: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--latency-ms" => {
                let ms = next_value(&mut args, &arg)?;
                let ms: u64 = ms
                    .parse()
                    .wrap_err_with(|| format!("--latency-ms expects milliseconds, got {ms}"))?;
                ledger.latency = Duration::from_millis(ms);
            }
            "--win-rate" => {
                let raw = next_value(&mut args, &arg)?;
                let p: f64 = raw
                    .parse()
                    .wrap_err_with(|| format!("--win-rate expects a number, got {raw}"))?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(eyre!("--win-rate must be between 0 and 1, got {p}"));
                }
                ledger.win_probability = p;
            }
            "--ticket-wei" => {
                let wei = parse_wei(&next_value(&mut args, &arg)?, &arg)?;
                ledger.ticket_price = TicketPrice::from_wei(wei);
            }
            "--balance-wei" => {
                ledger.starting_balance = parse_wei(&next_value(&mut args, &arg)?, &arg)?;
            }
            "--tick-ms" => {
                let ms = next_value(&mut args, &arg)?;
                let ms: u64 = ms
                    .parse()
                    .wrap_err_with(|| format!("--tick-ms expects milliseconds, got {ms}"))?;
                if ms == 0 {
                    return Err(eyre!("--tick-ms must be greater than zero"));
                }
                tick_interval = Duration::from_millis(ms);
            }
            "--relay-payloads" => ledger.payload_encoding = PayloadEncoding::Relay,
            "--log-dir" => {
                let dir = next_value(&mut args, &arg)?;
                if log_dir.is_some() {
                    return Err(eyre!("--log-dir may only be specified once"));
                }
                log_dir = Some(dir);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let raw_dir = log_dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
    let log_dir = PathBuf::from(shellexpand::tilde(&raw_dir).into_owned());

    Ok(CliArgs {
        app: client::AppConfig {
            ledger,
            tick_interval,
            network: client::LOCAL_NETWORK.to_string(),
        },
        log_dir,
    })
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| eyre!("{flag} requires a value"))
}

fn parse_wei(raw: &str, flag: &str) -> Result<U256> {
    raw.parse::<U256>()
        .map_err(|e| eyre!("{flag} expects an amount in wei, got {raw}: {e}"))
}

fn init_tracing(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("creating log directory {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::never(log_dir, LOG_FILE));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("initializing tracing: {e}"))?;
    // flushes pending lines when the process exits
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_cli_args()?;
    init_tracing(&cli.log_dir)?;
    tracing::info!("starting base-lottery client");
    client::run_app(cli.app).await
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parse_args__defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.app.ledger.latency, Duration::from_millis(2_500));
        assert_eq!(cli.app.ledger.win_probability, 0.1);
        assert_eq!(
            cli.app.ledger.ticket_price.wei(),
            U256::from(100_000_000_000_000u64)
        );
        assert_eq!(cli.app.tick_interval, Duration::from_millis(100));
        assert_eq!(cli.app.ledger.payload_encoding, PayloadEncoding::Abi);
        assert_eq!(cli.log_dir, PathBuf::from("./logs"));
    }

    #[test]
    fn parse_args__overrides() {
        let cli = parse(&[
            "--latency-ms",
            "10",
            "--win-rate",
            "1",
            "--ticket-wei",
            "5",
            "--balance-wei",
            "16",
            "--tick-ms",
            "20",
            "--relay-payloads",
        ])
        .unwrap();
        assert_eq!(cli.app.ledger.latency, Duration::from_millis(10));
        assert_eq!(cli.app.ledger.win_probability, 1.0);
        assert_eq!(cli.app.ledger.ticket_price.wei(), U256::from(5u64));
        assert_eq!(cli.app.ledger.starting_balance, U256::from(16u64));
        assert_eq!(cli.app.tick_interval, Duration::from_millis(20));
        assert_eq!(cli.app.ledger.payload_encoding, PayloadEncoding::Relay);
    }

    #[test]
    fn parse_args__rejects_invalid_input() {
        assert!(parse(&["--tick-ms", "0"]).is_err());
        assert!(parse(&["--win-rate", "1.5"]).is_err());
        assert!(parse(&["--ticket-wei", "lots"]).is_err());
        assert!(parse(&["--latency-ms"]).is_err());
        assert!(parse(&["--log-dir", "a", "--log-dir", "b"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }
}
