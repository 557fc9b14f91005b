use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a ledger cash movement, as the accounting API reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "PAYIN")]
    PayIn,
    #[serde(rename = "PAYOUT")]
    PayOut,
}

impl Direction {
    /// Sign applied when converting the positive magnitude into signed cents.
    pub fn sign(self) -> i64 {
        match self {
            Direction::PayIn => 1,
            Direction::PayOut => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PayIn => write!(f, "PAYIN"),
            Direction::PayOut => write!(f, "PAYOUT"),
        }
    }
}

/// One line of a bank statement awaiting reconciliation. The amount is
/// signed as the bank reported it, in bank-currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankRecord {
    pub id: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// A ledger-side cash movement. The amount is a positive magnitude;
/// the direction carries the sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowTransaction {
    pub id: String,
    pub direction: Direction,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub cross_currency: bool,
}
