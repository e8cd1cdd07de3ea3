//! Automation hook: lets an external keeper poll an agreement and fire
//! its settlement once it becomes ready.
//!
//! The trigger holds no authority of its own. `execute` simply calls
//! [`EscrowEngine::finalize`], which is callable by anyone and idempotent,
//! so a keeper that polls late, twice, or concurrently with another keeper
//! cannot cause a double settlement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use drivefi_types::{AgreementId, AgreementStatus, FinalizeOutcome, Result};
use serde::{Deserialize, Serialize};

use crate::engine::EscrowEngine;

/// Answer to a keeper's "does this need work?" poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpkeepCheck {
    pub upkeep_needed: bool,
    /// Agreement to pass back on execution.
    pub agreement_id: AgreementId,
    /// Status observed by the check.
    pub status: AgreementStatus,
}

/// Counters for one trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStats {
    pub checks: u64,
    pub executions: u64,
    pub settled: u64,
    pub no_ops: u64,
    pub failures: u64,
}

/// Keeper-facing view of one agreement.
pub struct SettlementTrigger {
    engine: Arc<EscrowEngine>,
    checks: AtomicU64,
    executions: AtomicU64,
    settled: AtomicU64,
    no_ops: AtomicU64,
    failures: AtomicU64,
}

impl SettlementTrigger {
    #[must_use]
    pub fn new(engine: Arc<EscrowEngine>) -> Self {
        Self {
            engine,
            checks: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            settled: AtomicU64::new(0),
            no_ops: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn agreement_id(&self) -> AgreementId {
        self.engine.id()
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<EscrowEngine> {
        &self.engine
    }

    /// Whether settlement should be executed. No side effects on the
    /// agreement.
    #[must_use]
    pub fn check(&self) -> bool {
        self.check_upkeep().upkeep_needed
    }

    /// [`check`](Self::check) plus the data a keeper needs to act on it.
    #[must_use]
    pub fn check_upkeep(&self) -> UpkeepCheck {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let status = self.engine.status();
        UpkeepCheck {
            upkeep_needed: status == AgreementStatus::ReadyToFinalize,
            agreement_id: self.engine.id(),
            status,
        }
    }

    /// Settle the agreement if it is ready. Safe to call at any time and
    /// any number of times.
    ///
    /// # Errors
    /// Whatever [`EscrowEngine::finalize`] returns.
    pub fn execute(&self) -> Result<FinalizeOutcome> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        match self.engine.finalize() {
            Ok(outcome) => {
                match &outcome {
                    FinalizeOutcome::Settled(receipt) => {
                        self.settled.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            agreement = %receipt.agreement_id,
                            amount = %receipt.total_transferred,
                            "Trigger settled agreement"
                        );
                    }
                    FinalizeOutcome::NoOp(reason) => {
                        self.no_ops.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(agreement = %self.engine.id(), reason = %reason, "Trigger execution was a no-op");
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(agreement = %self.engine.id(), code = err.code(), error = %err, "Trigger execution failed");
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> TriggerStats {
        TriggerStats {
            checks: self.checks.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            settled: self.settled.load(Ordering::Relaxed),
            no_ops: self.no_ops.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Marketplace;
    use drivefi_types::NoOpReason;
    use rust_decimal::Decimal;

    #[test]
    fn check_tracks_readiness() {
        let market = Marketplace::new();
        let sale = market.open_sale(2, Decimal::new(50, 0));
        let trigger = SettlementTrigger::new(Arc::clone(&sale.engine));

        let check = trigger.check_upkeep();
        assert!(!check.upkeep_needed);
        assert_eq!(check.status, AgreementStatus::Pending);
        assert_eq!(check.agreement_id, sale.engine.id());

        sale.deposit_and_pay_all();
        assert!(trigger.check());

        trigger.execute().unwrap();
        assert!(!trigger.check());
    }

    #[test]
    fn check_has_no_side_effects_on_agreement() {
        let market = Marketplace::new();
        let sale = market.open_sale(1, Decimal::new(50, 0));
        sale.deposit_and_pay_all();
        let trigger = SettlementTrigger::new(Arc::clone(&sale.engine));

        for _ in 0..5 {
            assert!(trigger.check());
        }
        assert_eq!(sale.engine.status(), AgreementStatus::ReadyToFinalize);
        assert_eq!(sale.engine.events().len(), 2);
    }

    #[test]
    fn execute_when_not_ready_is_noop() {
        let market = Marketplace::new();
        let sale = market.open_sale(2, Decimal::new(50, 0));
        let trigger = SettlementTrigger::new(Arc::clone(&sale.engine));

        let outcome = trigger.execute().unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::NoOp(NoOpReason::NotReady(AgreementStatus::Pending))
        );
        assert_eq!(sale.engine.status(), AgreementStatus::Pending);
    }

    #[test]
    fn double_execute_settles_once() {
        let market = Marketplace::new();
        let sale = market.open_sale(3, Decimal::new(50, 0));
        sale.deposit_and_pay_all();
        let trigger = SettlementTrigger::new(Arc::clone(&sale.engine));

        assert!(trigger.execute().unwrap().is_settled());
        assert_eq!(
            trigger.execute().unwrap(),
            FinalizeOutcome::NoOp(NoOpReason::AlreadyFinalized)
        );

        let stats = trigger.stats();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.settled, 1);
        assert_eq!(stats.no_ops, 1);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn failed_execution_is_counted() {
        let market = Marketplace::new();
        let sale = market.open_sale(1, Decimal::new(50, 0));
        sale.deposit_and_pay_all();
        market.registry.pause();
        let trigger = SettlementTrigger::new(Arc::clone(&sale.engine));

        assert!(trigger.execute().unwrap_err().is_fatal());
        assert_eq!(trigger.stats().failures, 1);
        assert_eq!(trigger.check_upkeep().status, AgreementStatus::SettlementFaulted);
    }
}
