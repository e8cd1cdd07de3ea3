//! Settlement bookkeeping: which legs completed, what failed, and the
//! outcome handed back to whoever triggered finalization.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AgreementId, AgreementStatus, AssetId, PrincipalId};

/// One side of the two-sided settlement. Legs always run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementLeg {
    /// Asset: custody → buyer.
    AssetRelease,
    /// Accumulated installments: custody → seller.
    FundsRelease,
}

impl fmt::Display for SettlementLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetRelease => write!(f, "ASSET_RELEASE"),
            Self::FundsRelease => write!(f, "FUNDS_RELEASE"),
        }
    }
}

/// A settlement leg that failed after `finalized` was already set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFault {
    pub leg: SettlementLeg,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Progress of the settlement legs for one agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub asset_released: bool,
    pub funds_released: bool,
    /// Most recent failure, cleared once both legs complete.
    pub fault: Option<SettlementFault>,
}

impl SettlementRecord {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.asset_released && self.funds_released
    }

    /// Legs still to run, in execution order.
    #[must_use]
    pub fn pending_legs(&self) -> Vec<SettlementLeg> {
        let mut legs = Vec::with_capacity(2);
        if !self.asset_released {
            legs.push(SettlementLeg::AssetRelease);
        }
        if !self.funds_released {
            legs.push(SettlementLeg::FundsRelease);
        }
        legs
    }

    pub fn mark_done(&mut self, leg: SettlementLeg) {
        match leg {
            SettlementLeg::AssetRelease => self.asset_released = true,
            SettlementLeg::FundsRelease => self.funds_released = true,
        }
        if self.is_complete() {
            self.fault = None;
        }
    }
}

/// Proof of a completed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub agreement_id: AgreementId,
    pub buyer: PrincipalId,
    pub seller: PrincipalId,
    pub asset_id: AssetId,
    /// Installment funds released to the seller.
    pub total_transferred: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Why a finalize call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoOpReason {
    /// A previous call already consumed readiness.
    AlreadyFinalized,
    /// Not ready yet; carries the status observed under the lock.
    NotReady(AgreementStatus),
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyFinalized => write!(f, "already finalized"),
            Self::NotReady(status) => write!(f, "not ready ({status})"),
        }
    }
}

/// Result of a finalize attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizeOutcome {
    Settled(SettlementReceipt),
    NoOp(NoOpReason),
}

impl FinalizeOutcome {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SettlementReceipt> {
        match self {
            Self::Settled(receipt) => Some(receipt),
            Self::NoOp(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_has_both_legs_pending() {
        let rec = SettlementRecord::default();
        assert!(!rec.is_complete());
        assert_eq!(
            rec.pending_legs(),
            vec![SettlementLeg::AssetRelease, SettlementLeg::FundsRelease]
        );
    }

    #[test]
    fn completing_both_legs_clears_fault() {
        let mut rec = SettlementRecord {
            asset_released: true,
            funds_released: false,
            fault: Some(SettlementFault {
                leg: SettlementLeg::FundsRelease,
                reason: "insufficient balance".into(),
                at: Utc::now(),
            }),
        };
        assert_eq!(rec.pending_legs(), vec![SettlementLeg::FundsRelease]);

        rec.mark_done(SettlementLeg::FundsRelease);
        assert!(rec.is_complete());
        assert!(rec.fault.is_none());
        assert!(rec.pending_legs().is_empty());
    }

    #[test]
    fn partial_completion_keeps_fault() {
        let mut rec = SettlementRecord {
            fault: Some(SettlementFault {
                leg: SettlementLeg::AssetRelease,
                reason: "not approved".into(),
                at: Utc::now(),
            }),
            ..SettlementRecord::default()
        };
        rec.mark_done(SettlementLeg::AssetRelease);
        assert!(rec.fault.is_some());
    }

    #[test]
    fn outcome_accessors() {
        let noop = FinalizeOutcome::NoOp(NoOpReason::AlreadyFinalized);
        assert!(!noop.is_settled());
        assert!(noop.receipt().is_none());
        assert_eq!(
            NoOpReason::NotReady(AgreementStatus::Escrowed).to_string(),
            "not ready (ESCROWED)"
        );
    }
}
