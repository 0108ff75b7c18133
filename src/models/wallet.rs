use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ShipperError;

/// Balance for one courier. Never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub shipper_id: String,
    pub balance: f64,
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    pub fn new(shipper_id: impl Into<String>, balance: f64) -> Result<Self, ShipperError> {
        if !balance.is_finite() || balance < 0.0 {
            return Err(ShipperError::Validation(format!(
                "wallet balance must be a non-negative number, got {balance}"
            )));
        }

        Ok(Self {
            shipper_id: shipper_id.into(),
            balance,
            updated_at: Utc::now(),
        })
    }
}

/// Wallet payloads pushed by the backend (`walletBalance`, deposit and
/// withdraw confirmations). Only `balance` is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePayload {
    #[serde(default)]
    pub shipper_id: Option<String>,
    #[serde(alias = "newBalance")]
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

pub fn parse_amount(raw: &str) -> Result<f64, ShipperError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect();

    let amount = cleaned
        .parse::<f64>()
        .map_err(|_| ShipperError::Validation(format!("'{}' is not a valid amount", raw.trim())))?;

    validate_amount(amount)
}

pub fn validate_amount(amount: f64) -> Result<f64, ShipperError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ShipperError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(amount)
}

pub fn validate_withdraw(amount: f64, balance: f64) -> Result<f64, ShipperError> {
    let amount = validate_amount(amount)?;
    if amount > balance {
        return Err(ShipperError::Validation(format!(
            "Withdraw amount {amount} exceeds current balance {balance}"
        )));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::{parse_amount, validate_withdraw, WalletBalance};
    use crate::error::ShipperError;

    #[test]
    fn withdraw_above_balance_names_the_balance() {
        match validate_withdraw(200000.0, 100000.0) {
            Err(ShipperError::Validation(message)) => assert!(message.contains("100000")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(validate_withdraw(100000.0, 100000.0).unwrap(), 100000.0);
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("NaN").is_err());
        assert_eq!(parse_amount("150,000").unwrap(), 150000.0);
    }

    #[test]
    fn negative_balance_is_not_representable() {
        assert!(WalletBalance::new("shipper-1", -1.0).is_err());
        assert!(WalletBalance::new("shipper-1", 0.0).is_ok());
    }
}
