//! Agreement factory: validates sale parameters and creates one
//! independent [`EscrowEngine`] per sale.
//!
//! Agreements share no mutable state with each other; the optional
//! registry only maps ids to engines for lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use drivefi_ledger::{AssetLedger, PaymentLedger};
use drivefi_types::{
    AgreementId, AgreementTerms, AssetId, EscrowConfig, EscrowError, PrincipalId, Result,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::engine::EscrowEngine;
use crate::sink::{EventSink, TracingSink};

/// A specific asset on a specific asset ledger.
#[derive(Clone)]
pub struct AssetRef {
    pub ledger: Arc<dyn AssetLedger>,
    pub asset_id: AssetId,
}

/// Everything needed to open a sale.
#[derive(Clone)]
pub struct AgreementParams {
    pub seller: PrincipalId,
    pub buyer: PrincipalId,
    pub asset: AssetRef,
    pub payment_ledger: Arc<dyn PaymentLedger>,
    pub total_installments: u32,
    pub installment_amount: Decimal,
}

/// Creates and (optionally) indexes escrow agreements.
pub struct AgreementFactory {
    config: EscrowConfig,
    sink: Arc<dyn EventSink>,
    registry: RwLock<BTreeMap<AgreementId, Arc<EscrowEngine>>>,
}

impl AgreementFactory {
    /// Factory publishing events to `tracing`.
    ///
    /// # Errors
    /// `Configuration` if `config` is invalid.
    pub fn new(config: EscrowConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Factory publishing every agreement's events to `sink`.
    ///
    /// # Errors
    /// `Configuration` if `config` is invalid.
    pub fn with_sink(config: EscrowConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            registry: RwLock::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Validate `params` and create a new agreement in `PENDING`.
    ///
    /// The seller must currently own the asset. Nothing moves at creation;
    /// the seller deposits separately.
    ///
    /// # Errors
    /// `InvalidParameters` if the parties coincide, the installment count
    /// is zero or above the configured maximum, the amount is not positive,
    /// the total price overflows, or the seller does not own the asset.
    pub fn create(&self, params: AgreementParams) -> Result<Arc<EscrowEngine>> {
        let total_price = self.validate(&params)?;

        let terms = AgreementTerms {
            id: AgreementId::new(),
            seller: params.seller,
            buyer: params.buyer,
            asset_ledger: params.asset.ledger.ledger_id(),
            asset_id: params.asset.asset_id,
            payment_ledger: params.payment_ledger.ledger_id(),
            total_installments: params.total_installments,
            installment_amount: params.installment_amount,
            created_at: Utc::now(),
        };
        let id = terms.id;

        let engine = Arc::new(EscrowEngine::new(
            terms,
            total_price,
            params.asset.ledger,
            params.payment_ledger,
            self.config.operator,
            Arc::clone(&self.sink),
        ));

        if self.config.registry_enabled {
            self.registry.write().insert(id, Arc::clone(&engine));
        }

        tracing::info!(
            agreement = %id,
            seller = %params.seller,
            buyer = %params.buyer,
            asset = %params.asset.asset_id,
            installments = params.total_installments,
            installment_amount = %params.installment_amount,
            custody = %engine.custody(),
            "Agreement created"
        );
        Ok(engine)
    }

    fn validate(&self, params: &AgreementParams) -> Result<Decimal> {
        let invalid = |reason: String| {
            tracing::warn!(reason = %reason, "Agreement creation rejected");
            EscrowError::InvalidParameters { reason }
        };

        if params.seller == params.buyer {
            return Err(invalid("seller and buyer must differ".into()));
        }
        if params.total_installments == 0 {
            return Err(invalid("total_installments must be > 0".into()));
        }
        if params.total_installments > self.config.max_installments {
            return Err(invalid(format!(
                "total_installments {} exceeds maximum {}",
                params.total_installments, self.config.max_installments
            )));
        }
        if params.installment_amount <= Decimal::ZERO {
            return Err(invalid(format!(
                "installment_amount must be positive, got {}",
                params.installment_amount
            )));
        }
        params
            .payment_ledger
            .validate_amount(params.installment_amount)
            .map_err(|e| invalid(format!("installment_amount not payable: {e}")))?;
        let total_price = params
            .installment_amount
            .checked_mul(Decimal::from(params.total_installments))
            .ok_or_else(|| invalid("total price overflows".into()))?;

        let owner = params
            .asset
            .ledger
            .owner_of(params.asset.asset_id)
            .map_err(|e| invalid(format!("asset lookup failed: {e}")))?;
        if owner != params.seller {
            return Err(invalid(format!(
                "{} is owned by {owner}, not the seller {}",
                params.asset.asset_id, params.seller
            )));
        }
        Ok(total_price)
    }

    // =================================================================
    // Registry
    // =================================================================

    /// Look up an agreement created by this factory.
    ///
    /// # Errors
    /// `AgreementNotFound` if unknown or if the registry is disabled.
    pub fn get(&self, id: AgreementId) -> Result<Arc<EscrowEngine>> {
        self.registry
            .read()
            .get(&id)
            .cloned()
            .ok_or(EscrowError::AgreementNotFound(id))
    }

    /// All registered agreements, ordered by id (UUIDv7, so roughly by creation time).
    #[must_use]
    pub fn agreements(&self) -> Vec<Arc<EscrowEngine>> {
        self.registry.read().values().cloned().collect()
    }

    /// Agreements where `principal` is the seller or the buyer.
    #[must_use]
    pub fn agreements_for(&self, principal: PrincipalId) -> Vec<Arc<EscrowEngine>> {
        self.registry
            .read()
            .values()
            .filter(|engine| engine.terms().involves(principal))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }
}
