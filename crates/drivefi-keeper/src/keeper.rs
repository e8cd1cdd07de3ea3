//! Polling keeper.
//!
//! Each round walks the factory's registry, asks every agreement's
//! [`SettlementTrigger`] whether upkeep is needed, and executes the ready
//! ones. Rounds are independent: a failure on one agreement is reported and
//! the round continues with the next.

use std::collections::HashMap;
use std::sync::Arc;

use drivefi_escrow::{AgreementFactory, EscrowEngine, SettlementTrigger, TriggerStats};
use drivefi_types::{AgreementId, AgreementStatus, FinalizeOutcome, KeeperConfig, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::settled_cache::SettledCache;

/// An `execute()` that returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub agreement_id: AgreementId,
    /// Stable error code, e.g. `ESC_ERR_300`.
    pub code: String,
    pub message: String,
    /// Needs operator remediation rather than a retry.
    pub fatal: bool,
}

/// What one polling round did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub round: u64,
    /// Agreements whose trigger was checked.
    pub checked: usize,
    /// Agreements skipped because this keeper already saw them settled.
    pub skipped: usize,
    pub ready: usize,
    pub executed: usize,
    /// Ready but over the per-round execution cap.
    pub deferred: usize,
    pub settled: Vec<AgreementId>,
    pub no_ops: usize,
    pub failures: Vec<ExecutionFailure>,
    /// Faulted agreements still waiting for an operator.
    pub awaiting_remediation: usize,
}

/// Totals across every round run so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperTotals {
    pub rounds: u64,
    pub executions: u64,
    pub settled: u64,
    pub no_ops: u64,
    pub failures: u64,
}

impl KeeperTotals {
    fn absorb(&mut self, report: &PollReport) {
        self.rounds += 1;
        self.executions += report.executed as u64;
        self.settled += report.settled.len() as u64;
        self.no_ops += report.no_ops as u64;
        self.failures += report.failures.len() as u64;
    }
}

/// Drives settlement for every agreement a factory knows about.
pub struct Keeper {
    factory: Arc<AgreementFactory>,
    config: KeeperConfig,
    triggers: Mutex<HashMap<AgreementId, Arc<SettlementTrigger>>>,
    settled: Mutex<SettledCache>,
    totals: Mutex<KeeperTotals>,
}

impl Keeper {
    /// # Errors
    /// `Configuration` if `config` is invalid.
    pub fn new(factory: Arc<AgreementFactory>, config: KeeperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            settled: Mutex::new(SettledCache::new(config.settled_cache_size)),
            config,
            triggers: Mutex::new(HashMap::new()),
            totals: Mutex::new(KeeperTotals::default()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    #[must_use]
    pub fn totals(&self) -> KeeperTotals {
        *self.totals.lock()
    }

    /// Trigger counters for an agreement this keeper is still tracking.
    #[must_use]
    pub fn trigger_stats(&self, id: AgreementId) -> Option<TriggerStats> {
        self.triggers.lock().get(&id).map(|t| t.stats())
    }

    #[must_use]
    pub fn is_known_settled(&self, id: AgreementId) -> bool {
        self.settled.lock().contains(&id)
    }

    fn trigger_for(&self, engine: &Arc<EscrowEngine>) -> Arc<SettlementTrigger> {
        Arc::clone(
            self.triggers
                .lock()
                .entry(engine.id())
                .or_insert_with(|| Arc::new(SettlementTrigger::new(Arc::clone(engine)))),
        )
    }

    fn forget(&self, id: AgreementId) {
        self.settled.lock().insert(id);
        self.triggers.lock().remove(&id);
    }

    /// Run one polling round.
    pub fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();

        for engine in self.factory.agreements() {
            let id = engine.id();
            if self.is_known_settled(id) {
                report.skipped += 1;
                continue;
            }

            let trigger = self.trigger_for(&engine);
            let check = trigger.check_upkeep();
            report.checked += 1;

            match check.status {
                AgreementStatus::Finalized => {
                    // Settled elsewhere, e.g. by a direct finalize call.
                    self.forget(id);
                    continue;
                }
                AgreementStatus::SettlementFaulted => {
                    report.awaiting_remediation += 1;
                    continue;
                }
                _ => {}
            }
            if !check.upkeep_needed {
                continue;
            }

            report.ready += 1;
            if report.executed >= self.config.max_executions_per_round {
                report.deferred += 1;
                continue;
            }

            report.executed += 1;
            match trigger.execute() {
                Ok(FinalizeOutcome::Settled(_)) => {
                    report.settled.push(id);
                    self.forget(id);
                }
                Ok(FinalizeOutcome::NoOp(_)) => report.no_ops += 1,
                Err(err) => {
                    if err.is_fatal() {
                        report.awaiting_remediation += 1;
                    }
                    report.failures.push(ExecutionFailure {
                        agreement_id: id,
                        code: err.code().to_string(),
                        message: err.to_string(),
                        fatal: err.is_fatal(),
                    });
                }
            }
        }

        let mut totals = self.totals.lock();
        totals.absorb(&report);
        report.round = totals.rounds;
        drop(totals);

        if report.executed > 0 || !report.failures.is_empty() {
            tracing::info!(
                round = report.round,
                checked = report.checked,
                ready = report.ready,
                settled = report.settled.len(),
                deferred = report.deferred,
                failures = report.failures.len(),
                "Keeper round"
            );
        } else {
            tracing::debug!(round = report.round, checked = report.checked, "Keeper round idle");
        }
        for failure in &report.failures {
            if failure.fatal {
                tracing::error!(agreement = %failure.agreement_id, code = %failure.code, "Settlement needs operator remediation");
            } else {
                tracing::warn!(agreement = %failure.agreement_id, code = %failure.code, error = %failure.message, "Execution failed; will retry");
            }
        }
        report
    }

    /// Poll on the configured interval until `shutdown` flips to `true` or
    /// its sender is dropped. Returns the accumulated totals.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> KeeperTotals {
        let mut interval = time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_ms = self.config.poll_interval_ms,
            max_per_round = self.config.max_executions_per_round,
            "Keeper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let totals = self.totals();
        tracing::info!(
            rounds = totals.rounds,
            settled = totals.settled,
            failures = totals.failures,
            "Keeper stopped"
        );
        totals
    }
}
