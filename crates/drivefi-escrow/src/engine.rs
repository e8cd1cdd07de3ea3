//! The escrow engine: one instance per sale.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING ──deposit_asset──▶ ESCROWED ──pay_installment × N──▶ READY_TO_FINALIZE
//!                                                                    │
//!                                                                finalize
//!                                                                    ▼
//!                                         FINALIZED ◀──or──▶ SETTLEMENT_FAULTED
//!                                             ▲                      │
//!                                             └──remediate_settlement┘
//! ```
//!
//! Every state-changing operation runs under the instance mutex, held
//! across its ledger calls. Two operations on the same agreement never
//! interleave; operations on different agreements never contend.
//!
//! Funds stay in custody until settlement. `finalize` moves the asset to
//! the buyer first and the accumulated installments to the seller second,
//! so a failure never leaves the seller paid while the buyer has nothing.

use std::sync::Arc;

use chrono::Utc;
use drivefi_ledger::{AssetLedger, PaymentLedger};
use drivefi_types::{
    AgreementId, AgreementSnapshot, AgreementStatus, AgreementTerms, DepositState, EscrowError,
    EscrowEvent, EventRecord, FinalizeOutcome, LedgerError, NoOpReason, Operation, PrincipalId,
    Result, Role, SettlementFault, SettlementLeg, SettlementReceipt, SettlementRecord,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::sink::EventSink;

/// Mutable part of an agreement. Only touched with the engine lock held.
#[derive(Debug)]
struct EngineState {
    deposit_state: DepositState,
    installments_paid: u32,
    /// Set exactly once, by the finalize call that consumed readiness.
    finalized: bool,
    /// Installment funds sitting in custody.
    amount_held: Decimal,
    settlement: SettlementRecord,
    events: Vec<EventRecord>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            deposit_state: DepositState::NotDeposited,
            installments_paid: 0,
            finalized: false,
            amount_held: Decimal::ZERO,
            settlement: SettlementRecord::default(),
            events: Vec::new(),
        }
    }

    fn status(&self, total_installments: u32) -> AgreementStatus {
        AgreementStatus::derive(
            self.deposit_state,
            self.installments_paid,
            total_installments,
            self.finalized,
            &self.settlement,
        )
    }
}

/// Escrow for one vehicle sale paid in equal installments.
pub struct EscrowEngine {
    terms: AgreementTerms,
    /// `installment_amount × total_installments`, checked at creation.
    total_price: Decimal,
    custody: PrincipalId,
    asset_ledger: Arc<dyn AssetLedger>,
    payment_ledger: Arc<dyn PaymentLedger>,
    operator: Option<PrincipalId>,
    sink: Arc<dyn EventSink>,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for EscrowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("id", &self.terms.id)
            .field("custody", &self.custody)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl EscrowEngine {
    /// Build an engine over already-validated terms. Use
    /// [`AgreementFactory::create`](crate::AgreementFactory::create).
    pub(crate) fn new(
        terms: AgreementTerms,
        total_price: Decimal,
        asset_ledger: Arc<dyn AssetLedger>,
        payment_ledger: Arc<dyn PaymentLedger>,
        operator: Option<PrincipalId>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            custody: terms.custody(),
            terms,
            total_price,
            asset_ledger,
            payment_ledger,
            operator,
            sink,
            state: Mutex::new(EngineState::new()),
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn id(&self) -> AgreementId {
        self.terms.id
    }

    #[must_use]
    pub fn terms(&self) -> &AgreementTerms {
        &self.terms
    }

    /// Account that holds the asset and funds while the sale is open.
    /// Sellers and buyers approve this principal on their ledgers.
    #[must_use]
    pub fn custody(&self) -> PrincipalId {
        self.custody
    }

    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    #[must_use]
    pub fn operator(&self) -> Option<PrincipalId> {
        self.operator
    }

    #[must_use]
    pub fn status(&self) -> AgreementStatus {
        self.state.lock().status(self.terms.total_installments)
    }

    #[must_use]
    pub fn installments_paid(&self) -> u32 {
        self.state.lock().installments_paid
    }

    #[must_use]
    pub fn total_installments(&self) -> u32 {
        self.terms.total_installments
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    #[must_use]
    pub fn amount_held(&self) -> Decimal {
        self.state.lock().amount_held
    }

    /// True iff the asset is deposited, every installment is paid and the
    /// agreement has not been finalized. Side-effect free.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status() == AgreementStatus::ReadyToFinalize
    }

    /// Consistent view of every field, taken under the lock.
    #[must_use]
    pub fn snapshot(&self) -> AgreementSnapshot {
        let state = self.state.lock();
        AgreementSnapshot {
            terms: self.terms.clone(),
            status: state.status(self.terms.total_installments),
            deposit_state: state.deposit_state,
            installments_paid: state.installments_paid,
            finalized: state.finalized,
            amount_held: state.amount_held,
            settlement: state.settlement.clone(),
        }
    }

    /// The agreement's full event log.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().events.clone()
    }

    /// Events with `sequence >= from`.
    #[must_use]
    pub fn events_since(&self, from: u64) -> Vec<EventRecord> {
        let state = self.state.lock();
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        state.events.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    // =================================================================
    // Operations
    // =================================================================

    /// Move the seller's asset into custody.
    ///
    /// The seller must have approved [`custody`](Self::custody) on the
    /// asset ledger beforehand.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the seller
    /// - `InvalidState` unless the agreement is `PENDING`
    /// - `AssetTransferFailed` if the asset ledger refuses the transfer
    pub fn deposit_asset(&self, caller: PrincipalId) -> Result<()> {
        self.require_role(Operation::DepositAsset, Role::Seller, caller)?;

        let mut state = self.state.lock();
        let status = state.status(self.terms.total_installments);
        if status != AgreementStatus::Pending {
            return Err(self.invalid_state(
                Operation::DepositAsset,
                status,
                "asset already deposited",
            ));
        }

        self.asset_ledger
            .transfer(
                self.custody,
                self.terms.asset_id,
                self.terms.seller,
                self.custody,
            )
            .map_err(|source| {
                tracing::warn!(agreement = %self.terms.id, error = %source, "Asset deposit rejected");
                EscrowError::AssetTransferFailed {
                    operation: Operation::DepositAsset,
                    source,
                }
            })?;

        state.deposit_state = DepositState::Deposited;
        self.record(
            &mut state,
            EscrowEvent::AssetDeposited {
                seller: self.terms.seller,
                asset_id: self.terms.asset_id,
            },
        );
        tracing::info!(
            agreement = %self.terms.id,
            asset = %self.terms.asset_id,
            seller = %self.terms.seller,
            "Asset deposited into custody"
        );
        Ok(())
    }

    /// Pull one installment from the buyer into custody.
    ///
    /// The buyer must have approved at least `installment_amount` for
    /// [`custody`](Self::custody) on the payment ledger.
    ///
    /// Returns the number of installments paid so far.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not the buyer
    /// - `InvalidState` unless the agreement is `ESCROWED`
    /// - `PaymentTransferFailed` if the payment ledger refuses the transfer
    pub fn pay_installment(&self, caller: PrincipalId) -> Result<u32> {
        self.require_role(Operation::PayInstallment, Role::Buyer, caller)?;

        let mut state = self.state.lock();
        let status = state.status(self.terms.total_installments);
        let reason = match status {
            AgreementStatus::Escrowed => None,
            AgreementStatus::Pending => Some("asset not yet deposited"),
            AgreementStatus::ReadyToFinalize => Some("all installments already paid"),
            AgreementStatus::Finalized | AgreementStatus::SettlementFaulted => {
                Some("agreement already finalized")
            }
        };
        if let Some(reason) = reason {
            return Err(self.invalid_state(Operation::PayInstallment, status, reason));
        }

        let amount = self.terms.installment_amount;
        self.payment_ledger
            .transfer_from(self.custody, self.terms.buyer, self.custody, amount)
            .map_err(|source| {
                tracing::warn!(agreement = %self.terms.id, error = %source, "Installment rejected");
                EscrowError::PaymentTransferFailed {
                    operation: Operation::PayInstallment,
                    source,
                }
            })?;

        // Bounded by total_price, which was checked for overflow at creation.
        state.installments_paid += 1;
        state.amount_held += amount;
        let paid = state.installments_paid;
        self.record(
            &mut state,
            EscrowEvent::InstallmentPaid {
                buyer: self.terms.buyer,
                installment: paid,
                amount,
            },
        );

        tracing::info!(
            agreement = %self.terms.id,
            installment = paid,
            total = self.terms.total_installments,
            amount = %amount,
            "Installment paid"
        );
        if paid == self.terms.total_installments {
            tracing::info!(agreement = %self.terms.id, "All installments paid; ready to finalize");
        }
        Ok(paid)
    }

    /// Settle the agreement: asset to the buyer, held funds to the seller.
    ///
    /// Callable by anyone. Readiness is re-checked under the lock, so of
    /// any number of concurrent or repeated calls exactly one settles and
    /// the rest return [`FinalizeOutcome::NoOp`].
    ///
    /// # Errors
    /// - `AssetTransferFailed` / `PaymentTransferFailed` if custody no
    ///   longer holds what it should. Nothing changes; `finalized` stays
    ///   unset.
    /// - `SettlementFailed` if a leg fails after `finalized` was set. The
    ///   agreement is then `SETTLEMENT_FAULTED` until an operator runs
    ///   [`remediate_settlement`](Self::remediate_settlement).
    pub fn finalize(&self) -> Result<FinalizeOutcome> {
        let mut state = self.state.lock();
        if state.finalized {
            tracing::debug!(agreement = %self.terms.id, "Finalize ignored: already finalized");
            return Ok(FinalizeOutcome::NoOp(NoOpReason::AlreadyFinalized));
        }
        let status = state.status(self.terms.total_installments);
        if status != AgreementStatus::ReadyToFinalize {
            tracing::debug!(agreement = %self.terms.id, status = %status, "Finalize ignored: not ready");
            return Ok(FinalizeOutcome::NoOp(NoOpReason::NotReady(status)));
        }

        self.preflight(&state)?;

        state.finalized = true;
        let receipt = self.run_settlement(&mut state)?;
        Ok(FinalizeOutcome::Settled(receipt))
    }

    /// Re-run the outstanding settlement legs of a faulted agreement.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the configured operator
    /// - `InvalidState` unless the agreement is `SETTLEMENT_FAULTED`
    /// - `SettlementFailed` if a leg fails again
    pub fn remediate_settlement(&self, caller: PrincipalId) -> Result<SettlementReceipt> {
        self.require_role(Operation::RemediateSettlement, Role::Operator, caller)?;

        let mut state = self.state.lock();
        let status = state.status(self.terms.total_installments);
        if status != AgreementStatus::SettlementFaulted {
            return Err(self.invalid_state(
                Operation::RemediateSettlement,
                status,
                "no settlement fault to remediate",
            ));
        }

        let receipt = self.run_settlement(&mut state)?;
        self.record(&mut state, EscrowEvent::SettlementRemediated { operator: caller });
        tracing::info!(agreement = %self.terms.id, operator = %caller, "Settlement remediated");
        Ok(receipt)
    }

    // =================================================================
    // Internals
    // =================================================================

    fn require_role(&self, operation: Operation, required: Role, caller: PrincipalId) -> Result<()> {
        let expected = match required {
            Role::Seller => Some(self.terms.seller),
            Role::Buyer => Some(self.terms.buyer),
            Role::Operator => self.operator,
        };
        if expected == Some(caller) {
            return Ok(());
        }
        tracing::warn!(
            agreement = %self.terms.id,
            operation = %operation,
            caller = %caller,
            "Unauthorized caller rejected"
        );
        Err(EscrowError::Unauthorized {
            operation,
            required,
            caller,
        })
    }

    fn invalid_state(
        &self,
        operation: Operation,
        state: AgreementStatus,
        reason: &str,
    ) -> EscrowError {
        tracing::debug!(agreement = %self.terms.id, operation = %operation, status = %state, reason, "Rejected");
        EscrowError::InvalidState {
            operation,
            state,
            reason: reason.to_string(),
        }
    }

    /// Custody must still own the asset and hold the funds before
    /// `finalized` is set.
    fn preflight(&self, state: &EngineState) -> Result<()> {
        let asset_id = self.terms.asset_id;
        let owner = self
            .asset_ledger
            .owner_of(asset_id)
            .map_err(|source| EscrowError::AssetTransferFailed {
                operation: Operation::Finalize,
                source,
            })?;
        if owner != self.custody {
            return Err(EscrowError::AssetTransferFailed {
                operation: Operation::Finalize,
                source: LedgerError::NotOwner {
                    asset_id,
                    from: self.custody,
                    owner,
                },
            });
        }

        let available = self.payment_ledger.balance_of(self.custody);
        if available < state.amount_held {
            return Err(EscrowError::PaymentTransferFailed {
                operation: Operation::Finalize,
                source: LedgerError::InsufficientBalance {
                    needed: state.amount_held,
                    available,
                },
            });
        }
        Ok(())
    }

    /// Run every pending leg in order. Stops at the first failure and
    /// records it as a settlement fault.
    fn run_settlement(&self, state: &mut EngineState) -> Result<SettlementReceipt> {
        for leg in state.settlement.pending_legs() {
            let result = match leg {
                SettlementLeg::AssetRelease => self.asset_ledger.transfer(
                    self.custody,
                    self.terms.asset_id,
                    self.custody,
                    self.terms.buyer,
                ),
                SettlementLeg::FundsRelease => self.payment_ledger.transfer_from(
                    self.custody,
                    self.custody,
                    self.terms.seller,
                    state.amount_held,
                ),
            };

            match result {
                Ok(()) => {
                    state.settlement.mark_done(leg);
                    if leg == SettlementLeg::FundsRelease {
                        state.amount_held = Decimal::ZERO;
                    }
                    tracing::debug!(agreement = %self.terms.id, leg = %leg, "Settlement leg completed");
                }
                Err(source) => {
                    state.settlement.fault = Some(SettlementFault {
                        leg,
                        reason: source.to_string(),
                        at: Utc::now(),
                    });
                    self.record(
                        state,
                        EscrowEvent::SettlementFaulted {
                            leg,
                            reason: source.to_string(),
                        },
                    );
                    tracing::error!(
                        agreement = %self.terms.id,
                        leg = %leg,
                        error = %source,
                        "Settlement leg failed; operator remediation required"
                    );
                    return Err(EscrowError::SettlementFailed {
                        agreement_id: self.terms.id,
                        leg,
                        source,
                    });
                }
            }
        }

        let receipt = SettlementReceipt {
            agreement_id: self.terms.id,
            buyer: self.terms.buyer,
            seller: self.terms.seller,
            asset_id: self.terms.asset_id,
            total_transferred: self.total_price,
            settled_at: Utc::now(),
        };
        self.record(
            state,
            EscrowEvent::Finalized {
                buyer: self.terms.buyer,
                seller: self.terms.seller,
                asset_id: self.terms.asset_id,
                total_amount: self.total_price,
            },
        );
        tracing::info!(
            agreement = %self.terms.id,
            buyer = %self.terms.buyer,
            seller = %self.terms.seller,
            asset = %self.terms.asset_id,
            amount = %self.total_price,
            "Agreement finalized"
        );
        Ok(receipt)
    }

    fn record(&self, state: &mut EngineState, event: EscrowEvent) {
        let record = EventRecord {
            agreement_id: self.terms.id,
            sequence: state.events.len() as u64,
            event,
            recorded_at: Utc::now(),
        };
        self.sink.publish(&record);
        state.events.push(record);
    }
}
