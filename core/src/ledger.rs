//! Financial ledger rows.
//!
//! A [`Transaction`] is created as a side effect of a `course_purchase`
//! activity carrying transaction details. Ledger rows are write-once: refunds
//! and cancellations are separate activities producing separate rows.

use crate::ids::{CourseId, LearnerId, TransactionId};
use crate::payload::TransactionDetails;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency applied when the purchase payload doesn't name one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// The kind of monetary transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// One-off course purchase.
    Purchase,
    /// Money returned to the learner.
    Refund,
    /// New recurring subscription.
    Subscription,
    /// Subscription renewal charge.
    Renewal,
    /// Subscription cancellation.
    Cancellation,
}

impl TransactionKind {
    /// The snake_case wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Refund => "refund",
            Self::Subscription => "subscription",
            Self::Renewal => "renewal",
            Self::Cancellation => "cancellation",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement status of a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting settlement.
    Pending,
    /// Settled (the default for rows created from purchase activities).
    #[default]
    Completed,
    /// Settlement failed.
    Failed,
    /// Later refunded; the refund itself is a separate row.
    Refunded,
}

/// One row in the financial ledger. Never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// System-generated identity.
    pub id: TransactionId,
    /// The paying learner.
    pub learner_id: LearnerId,
    /// The course paid for, when the activity named one.
    pub course_id: Option<CourseId>,
    /// What kind of transaction this is.
    pub kind: TransactionKind,
    /// Amount in the currency's major unit.
    pub amount: f64,
    /// ISO currency code.
    pub currency: String,
    /// Settlement status.
    pub status: TransactionStatus,
    /// How the learner paid.
    pub payment_method: String,
    /// Gateway-specific metadata.
    pub payment_details: serde_json::Value,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// IP the purchase originated from, if known.
    pub origin_ip: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a `completed` purchase row from the details carried by a
    /// `course_purchase` activity.
    #[must_use]
    pub fn from_purchase(
        id: TransactionId,
        learner_id: LearnerId,
        course_id: Option<CourseId>,
        details: TransactionDetails,
        origin_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            course_id,
            kind: TransactionKind::Purchase,
            amount: details.amount,
            currency: details
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status: TransactionStatus::Completed,
            payment_method: details.payment_method,
            payment_details: details.payment_details,
            metadata: serde_json::Value::Null,
            origin_ip,
            created_at: now,
        }
    }
}
