//! # Agreement: the installment sale record
//!
//! One agreement binds a seller, a buyer, one asset and fixed payment terms.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ deposit  ┌──────────┐ last installment ┌───────────────────┐
//!   │ PENDING ├─────────▶│ ESCROWED ├─────────────────▶│ READY_TO_FINALIZE │
//!   └─────────┘          └──────────┘                  └─────────┬─────────┘
//!                                                                │ finalize
//!                              ┌──────────────────────┐          │
//!                              │ SETTLEMENT_FAULTED   │◀─────────┤ leg failed
//!                              └──────────┬───────────┘          │
//!                                         │ operator remediation ▼
//!                                         └────────────────▶┌───────────┐
//!                                                           │ FINALIZED │
//!                                                           └───────────┘
//! ```
//!
//! The status is never stored; it is derived from `deposit_state`,
//! `installments_paid`, `finalized` and the settlement record, so it can
//! never disagree with them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AgreementId, AssetId, LedgerId, PrincipalId, SettlementRecord};

/// Whether the asset has been moved into escrow custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositState {
    NotDeposited,
    Deposited,
}

/// Lifecycle status of an agreement, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementStatus {
    /// Created, asset still with the seller.
    Pending,
    /// Asset in custody, installments outstanding.
    Escrowed,
    /// Asset in custody, every installment paid, not yet settled.
    ReadyToFinalize,
    /// Settled: asset with the buyer, funds with the seller. Terminal.
    Finalized,
    /// `finalized` is set but a settlement leg did not complete.
    /// Needs operator remediation.
    SettlementFaulted,
}

impl AgreementStatus {
    /// Derive the status from the raw agreement fields.
    #[must_use]
    pub fn derive(
        deposit_state: DepositState,
        installments_paid: u32,
        total_installments: u32,
        finalized: bool,
        settlement: &SettlementRecord,
    ) -> Self {
        if finalized {
            if settlement.is_complete() {
                Self::Finalized
            } else {
                Self::SettlementFaulted
            }
        } else if deposit_state == DepositState::NotDeposited {
            Self::Pending
        } else if installments_paid < total_installments {
            Self::Escrowed
        } else {
            Self::ReadyToFinalize
        }
    }

    /// Whether no further transition can happen without operator action.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Escrowed => write!(f, "ESCROWED"),
            Self::ReadyToFinalize => write!(f, "READY_TO_FINALIZE"),
            Self::Finalized => write!(f, "FINALIZED"),
            Self::SettlementFaulted => write!(f, "SETTLEMENT_FAULTED"),
        }
    }
}

/// The party an operation is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Seller,
    Buyer,
    Operator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seller => write!(f, "seller"),
            Self::Buyer => write!(f, "buyer"),
            Self::Operator => write!(f, "operator"),
        }
    }
}

/// Operations that can fail; carried in errors so callers know what was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    DepositAsset,
    PayInstallment,
    Finalize,
    RemediateSettlement,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::DepositAsset => write!(f, "deposit_asset"),
            Self::PayInstallment => write!(f, "pay_installment"),
            Self::Finalize => write!(f, "finalize"),
            Self::RemediateSettlement => write!(f, "remediate_settlement"),
        }
    }
}

/// The immutable terms of one sale, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTerms {
    pub id: AgreementId,
    pub seller: PrincipalId,
    pub buyer: PrincipalId,
    /// Registry holding the asset.
    pub asset_ledger: LedgerId,
    pub asset_id: AssetId,
    /// Token the installments are paid in.
    pub payment_ledger: LedgerId,
    pub total_installments: u32,
    pub installment_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl AgreementTerms {
    /// Custody account for this agreement.
    #[must_use]
    pub fn custody(&self) -> PrincipalId {
        self.id.custody_principal()
    }

    /// Full price, or `None` if it overflows.
    #[must_use]
    pub fn total_price(&self) -> Option<Decimal> {
        self.installment_amount
            .checked_mul(Decimal::from(self.total_installments))
    }

    /// Which role `principal` plays in this agreement, if any.
    #[must_use]
    pub fn role_of(&self, principal: PrincipalId) -> Option<Role> {
        if principal == self.seller {
            Some(Role::Seller)
        } else if principal == self.buyer {
            Some(Role::Buyer)
        } else {
            None
        }
    }

    #[must_use]
    pub fn involves(&self, principal: PrincipalId) -> bool {
        self.role_of(principal).is_some()
    }
}

/// Point-in-time view of an agreement, safe to hand to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementSnapshot {
    pub terms: AgreementTerms,
    pub status: AgreementStatus,
    pub deposit_state: DepositState,
    pub installments_paid: u32,
    pub finalized: bool,
    /// Installment funds currently in custody.
    pub amount_held: Decimal,
    pub settlement: SettlementRecord,
}

impl AgreementSnapshot {
    #[must_use]
    pub fn total_installments(&self) -> u32 {
        self.terms.total_installments
    }

    #[must_use]
    pub fn remaining_installments(&self) -> u32 {
        self.terms
            .total_installments
            .saturating_sub(self.installments_paid)
    }

    /// Amount the buyer still owes.
    #[must_use]
    pub fn remaining_balance(&self) -> Decimal {
        self.terms.installment_amount * Decimal::from(self.remaining_installments())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == AgreementStatus::ReadyToFinalize
    }

    /// Paid fraction in percent, for dashboards.
    #[must_use]
    pub fn progress_percent(&self) -> Decimal {
        if self.terms.total_installments == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.installments_paid) * Decimal::ONE_HUNDRED
            / Decimal::from(self.terms.total_installments)
    }
}

/// Dummy terms for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AgreementTerms {
    /// Terms between two fresh principals over a random asset id.
    pub fn dummy(total_installments: u32, installment_amount: Decimal) -> Self {
        Self {
            id: AgreementId::new(),
            seller: PrincipalId::new(),
            buyer: PrincipalId::new(),
            asset_ledger: LedgerId::new(),
            asset_id: AssetId(rand::random::<u32>().into()),
            payment_ledger: LedgerId::new(),
            total_installments,
            installment_amount,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SettlementFault, SettlementLeg};

    fn settled() -> SettlementRecord {
        SettlementRecord {
            asset_released: true,
            funds_released: true,
            fault: None,
        }
    }

    #[test]
    fn status_pending_until_deposit() {
        let s = AgreementStatus::derive(
            DepositState::NotDeposited,
            0,
            3,
            false,
            &SettlementRecord::default(),
        );
        assert_eq!(s, AgreementStatus::Pending);
    }

    #[test]
    fn status_escrowed_then_ready() {
        let rec = SettlementRecord::default();
        assert_eq!(
            AgreementStatus::derive(DepositState::Deposited, 2, 3, false, &rec),
            AgreementStatus::Escrowed
        );
        assert_eq!(
            AgreementStatus::derive(DepositState::Deposited, 3, 3, false, &rec),
            AgreementStatus::ReadyToFinalize
        );
    }

    #[test]
    fn status_finalized_vs_faulted() {
        assert_eq!(
            AgreementStatus::derive(DepositState::Deposited, 3, 3, true, &settled()),
            AgreementStatus::Finalized
        );

        let faulted = SettlementRecord {
            asset_released: true,
            funds_released: false,
            fault: Some(SettlementFault {
                leg: SettlementLeg::FundsRelease,
                reason: "ledger offline".into(),
                at: Utc::now(),
            }),
        };
        assert_eq!(
            AgreementStatus::derive(DepositState::Deposited, 3, 3, true, &faulted),
            AgreementStatus::SettlementFaulted
        );
    }

    #[test]
    fn only_finalized_is_terminal() {
        assert!(AgreementStatus::Finalized.is_terminal());
        assert!(!AgreementStatus::SettlementFaulted.is_terminal());
        assert!(!AgreementStatus::ReadyToFinalize.is_terminal());
    }

    #[test]
    fn inconsistent_snapshot_reports_nothing_remaining() {
        let snap = AgreementSnapshot {
            terms: AgreementTerms::dummy(3, Decimal::new(10, 0)),
            status: AgreementStatus::Finalized,
            deposit_state: DepositState::Deposited,
            installments_paid: 3,
            finalized: true,
            amount_held: Decimal::ZERO,
            settlement: settled(),
        };
        let mut json = serde_json::to_value(&snap).unwrap();
        json["installments_paid"] = 5.into();
        let tampered: AgreementSnapshot = serde_json::from_value(json).unwrap();

        assert_eq!(tampered.remaining_installments(), 0);
        assert_eq!(tampered.remaining_balance(), Decimal::ZERO);
    }

    #[test]
    fn total_price_multiplies() {
        let terms = AgreementTerms::dummy(3, Decimal::new(10, 0));
        assert_eq!(terms.total_price(), Some(Decimal::new(30, 0)));
    }

    #[test]
    fn total_price_overflow_is_none() {
        let terms = AgreementTerms::dummy(360, Decimal::MAX);
        assert_eq!(terms.total_price(), None);
    }

    #[test]
    fn role_of_distinguishes_parties() {
        let terms = AgreementTerms::dummy(3, Decimal::ONE);
        assert_eq!(terms.role_of(terms.seller), Some(Role::Seller));
        assert_eq!(terms.role_of(terms.buyer), Some(Role::Buyer));
        assert_eq!(terms.role_of(PrincipalId::new()), None);
        assert!(!terms.involves(terms.custody()));
    }

    #[test]
    fn snapshot_progress_and_remaining() {
        let terms = AgreementTerms::dummy(4, Decimal::new(25, 0));
        let snap = AgreementSnapshot {
            terms,
            status: AgreementStatus::Escrowed,
            deposit_state: DepositState::Deposited,
            installments_paid: 1,
            finalized: false,
            amount_held: Decimal::new(25, 0),
            settlement: SettlementRecord::default(),
        };
        assert_eq!(snap.remaining_installments(), 3);
        assert_eq!(snap.remaining_balance(), Decimal::new(75, 0));
        assert_eq!(snap.progress_percent(), Decimal::new(25, 0));
        assert!(!snap.is_ready());
    }

    #[test]
    fn status_display() {
        assert_eq!(AgreementStatus::ReadyToFinalize.to_string(), "READY_TO_FINALIZE");
        assert_eq!(Operation::PayInstallment.to_string(), "pay_installment");
        assert_eq!(Role::Buyer.to_string(), "buyer");
    }

    #[test]
    fn terms_serde_roundtrip() {
        let terms = AgreementTerms::dummy(12, Decimal::new(103_167, 2));
        let json = serde_json::to_string(&terms).unwrap();
        let back: AgreementTerms = serde_json::from_str(&json).unwrap();
        assert_eq!(terms, back);
    }
}
