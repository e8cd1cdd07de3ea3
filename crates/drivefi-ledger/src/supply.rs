//! Supply conservation for a single payment token.
//!
//! ```text
//! Σ(balances) == Σ(mints) - Σ(burns)
//! ```
//!
//! Transfers (including escrow custody and settlement) only move balance
//! between accounts, so they must never change the left-hand side.

use drivefi_types::{LedgerError, LedgerResult};
use rust_decimal::Decimal;

/// Running mint/burn totals for one token.
#[derive(Debug, Clone, Default)]
pub struct SupplyTracker {
    minted: Decimal,
    burned: Decimal,
}

impl SupplyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mint(&mut self, amount: Decimal) {
        self.minted += amount;
    }

    pub fn record_burn(&mut self, amount: Decimal) {
        self.burned += amount;
    }

    /// Mints minus burns.
    #[must_use]
    pub fn expected_supply(&self) -> Decimal {
        self.minted - self.burned
    }

    #[must_use]
    pub fn total_minted(&self) -> Decimal {
        self.minted
    }

    #[must_use]
    pub fn total_burned(&self) -> Decimal {
        self.burned
    }

    /// Compare the sum of all balances against the expected supply.
    ///
    /// # Errors
    /// [`LedgerError::SupplyInvariantViolation`] if they differ.
    pub fn verify(&self, actual_supply: Decimal) -> LedgerResult<()> {
        let expected = self.expected_supply();
        if actual_supply != expected {
            return Err(LedgerError::SupplyInvariantViolation {
                reason: format!(
                    "actual supply {actual_supply} != expected {expected} \
                     (minted={}, burned={})",
                    self.minted, self.burned,
                ),
            });
        }
        Ok(())
    }
}
