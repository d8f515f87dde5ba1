//! Status lines printed by the session.

use std::fmt::Display;

use alloy::primitives::{
    U256,
    utils::{format_ether, format_units, parse_units},
};
use batchwire_core::{chain::network_name, error::FlowError};
use batchwire_executors::atomic_batch::PollOutcome;

pub const TOKEN_DECIMALS: u8 = 6;

pub fn ok(message: impl Display) {
    println!("ok: {message}");
}

pub fn info(message: impl Display) {
    println!("   {message}");
}

pub fn failure(error: &FlowError) {
    println!("error: {error}");
}

pub fn ether(value: U256) -> String {
    format!("{} ETH", format_ether(value))
}

pub fn token(value: U256, symbol: &str) -> String {
    match format_units(value, TOKEN_DECIMALS) {
        Ok(formatted) => format!("{formatted} {symbol}"),
        Err(_) => format!("{value} {symbol} base units"),
    }
}

/// Parses a decimal amount of a `TOKEN_DECIMALS` token into base units.
pub fn parse_token_amount(amount: &str) -> Result<U256, FlowError> {
    parse_units(amount, TOKEN_DECIMALS)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| FlowError::InvalidAmount {
            value: amount.to_string(),
            message: e.to_string(),
        })
}

pub fn chain(chain_id: u64) -> String {
    network_name(chain_id)
}

pub fn poll_outcome(batch_id: &str, outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::Confirmed {
            status,
            explorer_url: Some(url),
        } => format!(
            "batch {batch_id} confirmed (status {}): {url}",
            status.status
        ),
        PollOutcome::Confirmed { status, .. } => format!(
            "batch {batch_id} confirmed (status {}), no explorer link",
            status.status
        ),
        PollOutcome::Terminal { status } => {
            format!("batch {batch_id} failed with status {}", status.status)
        }
        PollOutcome::TimedOut { attempts } => {
            format!("batch {batch_id} still pending after {attempts} checks")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwire_core::calls::CallsStatus;

    #[test]
    fn token_amounts_use_six_decimals() {
        assert_eq!(parse_token_amount("1.5").unwrap(), U256::from(1_500_000));
        assert_eq!(token(U256::from(2_500_000), "USDC"), "2.500000 USDC");
        assert!(matches!(
            parse_token_amount("abc"),
            Err(FlowError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn outcomes_render_explorer_links() {
        let line = poll_outcome(
            "0xabc",
            &PollOutcome::Confirmed {
                status: CallsStatus {
                    version: None,
                    id: None,
                    chain_id: None,
                    status: 200,
                    atomic: true,
                    receipts: vec![],
                },
                explorer_url: Some("https://sepolia.etherscan.io/tx/0xdead".to_string()),
            },
        );
        assert!(line.ends_with("https://sepolia.etherscan.io/tx/0xdead"));
        assert!(poll_outcome("0xabc", &PollOutcome::TimedOut { attempts: 120 }).contains("120"));
    }
}
