//! Observability events emitted by an agreement.
//!
//! Events form an append-only, per-agreement log. They exist for
//! observers and audit; no correctness decision ever reads them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AgreementId, AssetId, PrincipalId, SettlementLeg};

/// Something that happened to an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// The seller's asset moved into custody.
    AssetDeposited { seller: PrincipalId, asset_id: AssetId },
    /// The `installment`-th payment cleared.
    InstallmentPaid {
        buyer: PrincipalId,
        installment: u32,
        amount: Decimal,
    },
    /// Settlement completed. Emitted exactly once per agreement.
    Finalized {
        buyer: PrincipalId,
        seller: PrincipalId,
        asset_id: AssetId,
        total_amount: Decimal,
    },
    /// A settlement leg failed after `finalized` was set.
    SettlementFaulted { leg: SettlementLeg, reason: String },
    /// An operator completed the outstanding settlement legs.
    SettlementRemediated { operator: PrincipalId },
}

impl EscrowEvent {
    /// Stable short name for log fields and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssetDeposited { .. } => "asset_deposited",
            Self::InstallmentPaid { .. } => "installment_paid",
            Self::Finalized { .. } => "finalized",
            Self::SettlementFaulted { .. } => "settlement_faulted",
            Self::SettlementRemediated { .. } => "settlement_remediated",
        }
    }
}

/// An event with its position in the agreement's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub agreement_id: AgreementId,
    /// Zero-based, gap-free per agreement.
    pub sequence: u64,
    pub event: EscrowEvent,
    pub recorded_at: DateTime<Utc>,
}
