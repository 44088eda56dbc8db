use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::identity::UserIdentity;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

impl std::fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered opportunity lifecycle. `Won` and `Lost` are terminal; `Lost` is
/// the single cancelled/lost code the engine closes records into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Inquiry,
    Scheduled,
    PaymentReady,
    Won,
    Lost,
}

impl DealStage {
    /// Position in the stage ordering. Both terminal codes share the top
    /// level: neither outranks the other, and nothing outranks them.
    pub fn level(self) -> u8 {
        match self {
            Self::Inquiry => 0,
            Self::Scheduled => 1,
            Self::PaymentReady => 2,
            Self::Won | Self::Lost => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::Scheduled => "scheduled",
            Self::PaymentReady => "payment_ready",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }
}

impl std::fmt::Display for DealStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine's cached copy of a remote deal record. The remote store owns
/// the record; this is never authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub id: OpportunityId,
    pub display_name: String,
    pub stage: DealStage,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Field set sent to the remote store on create/update. Field-level
/// idempotent: re-sending the same fields is safe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityFields {
    pub identity: UserIdentity,
    pub display_name: String,
    pub stage: DealStage,
    pub subject: Option<String>,
    pub description: String,
    pub amount: Option<Decimal>,
}
