//! Transaction records as delivered by the transaction source.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Category label used when a record carries none.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A dated, signed monetary movement owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    /// Positive = income, negative = expense, zero = neither
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub category: String,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        amount: Decimal,
        date: DateTime<Utc>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            amount,
            date,
            category: category.into(),
        }
    }

    pub fn is_income(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Category for display, falling back to [`UNCATEGORIZED`] when blank.
    pub fn category_label(&self) -> &str {
        let c = self.category.trim();
        if c.is_empty() { UNCATEGORIZED } else { c }
    }
}

/// Which side of the ledger a pipeline looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Income,
    Expense,
}

impl Flow {
    /// The magnitude this record contributes to the flow, if any.
    ///
    /// Income keeps strictly positive amounts as-is. Expense keeps strictly
    /// negative amounts and reports their absolute value. A zero amount
    /// belongs to neither flow.
    pub fn contribution(&self, tx: &Transaction) -> Option<Decimal> {
        match self {
            Flow::Income if tx.is_income() => Some(tx.amount),
            Flow::Expense if tx.is_expense() => Some(tx.amount.abs()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Flow::Income => "Incomes",
            Flow::Expense => "Expenses",
        }
    }
}
