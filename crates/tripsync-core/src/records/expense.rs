//! Shared expense ledger
//!
//! Amounts arrive as raw form text and are parsed before anything is
//! written; a draft that does not parse never reaches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{required_text, Entity};
use crate::error::{SyncError, SyncResult};
use crate::types::{CollectionKind, Identity, RecordId};

/// One expense paid on behalf of the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: RecordId,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Identity,
}

/// Expense form input, amount still unparsed
#[derive(Debug, Clone)]
pub struct ExpenseDraft {
    pub name: String,
    pub amount: String,
}

impl ExpenseDraft {
    pub fn new(name: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: amount.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpenseBody {
    name: String,
    amount: f64,
}

/// Parse a non-negative decimal amount.
fn parse_amount(raw: &str) -> SyncResult<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation("amount must not be empty".into()));
    }
    let amount: f64 = trimmed
        .parse()
        .map_err(|_| SyncError::Validation(format!("amount '{}' is not a number", trimmed)))?;
    if !amount.is_finite() {
        return Err(SyncError::Validation(format!(
            "amount '{}' is not a finite number",
            trimmed
        )));
    }
    if amount < 0.0 {
        return Err(SyncError::Validation(format!(
            "amount '{}' must not be negative",
            trimmed
        )));
    }
    // "-0" parses to negative zero
    Ok(if amount == 0.0 { 0.0 } else { amount })
}

impl Entity for Expense {
    const KIND: CollectionKind = CollectionKind::Expenses;
    type Draft = ExpenseDraft;
    type Body = ExpenseBody;

    fn validate(draft: ExpenseDraft) -> SyncResult<ExpenseBody> {
        Ok(ExpenseBody {
            name: required_text("expense name", &draft.name)?,
            amount: parse_amount(&draft.amount)?,
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Two-decimal rendering used by the ledger view.
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Sum of all amounts in a ledger.
pub fn expense_total<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> f64 {
    expenses.into_iter().map(|e| e.amount).sum()
}
