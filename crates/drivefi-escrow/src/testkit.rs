//! Reference marketplace for tests and demos: one vehicle registry, one
//! stablecoin, an operator, and a factory wired to all three.
//!
//! **Never use in production.**

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use drivefi_ledger::{TokenLedger, VehicleRegistry};
use drivefi_types::{AssetId, EscrowConfig, PrincipalId, VehicleMetadata};
use rust_decimal::Decimal;

use crate::engine::EscrowEngine;
use crate::factory::{AgreementFactory, AgreementParams, AssetRef};
use crate::sink::MemorySink;

/// Keeps minted VINs unique within the process.
static VIN_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct Marketplace {
    pub registry: Arc<VehicleRegistry>,
    pub token: Arc<TokenLedger>,
    pub operator: PrincipalId,
    pub sink: Arc<MemorySink>,
    pub factory: Arc<AgreementFactory>,
}

/// An opened sale with funded, approved participants.
pub struct Sale {
    pub seller: PrincipalId,
    pub buyer: PrincipalId,
    pub asset_id: AssetId,
    pub engine: Arc<EscrowEngine>,
}

impl Marketplace {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EscrowConfig::default())
    }

    /// The operator in `config` is replaced by the marketplace's own.
    ///
    /// # Panics
    /// If `config` is invalid.
    #[must_use]
    pub fn with_config(config: EscrowConfig) -> Self {
        let operator = PrincipalId::new();
        let sink = Arc::new(MemorySink::new());
        let config = EscrowConfig {
            operator: Some(operator),
            ..config
        };
        let factory = AgreementFactory::with_sink(config, sink.clone())
            .map(Arc::new)
            .expect("marketplace config must be valid");
        Self {
            registry: Arc::new(VehicleRegistry::new("DriveFi Vehicles", "DFV")),
            token: Arc::new(TokenLedger::stablecoin()),
            operator,
            sink,
            factory,
        }
    }

    /// Mint a fresh vehicle to `owner`.
    ///
    /// # Panics
    /// If the registry is paused.
    #[must_use]
    pub fn list_vehicle(&self, owner: PrincipalId) -> AssetId {
        let n = VIN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let metadata = VehicleMetadata::new(
            format!("TESTVIN{n:010}"),
            "Honda",
            "Civic",
            2021,
            42_000,
            format!("KA-01-{n:04}"),
        );
        self.registry
            .mint_vehicle(owner, metadata)
            .expect("test vehicle must mint")
    }

    /// New seller and buyer, a vehicle owned by the seller, and an agreement
    /// over it. The seller has approved custody for the vehicle; the buyer
    /// holds exactly the total price and has approved custody for all of it.
    ///
    /// # Panics
    /// If the agreement parameters are rejected.
    #[must_use]
    pub fn open_sale(&self, total_installments: u32, installment_amount: Decimal) -> Sale {
        let seller = PrincipalId::new();
        let buyer = PrincipalId::new();
        let asset_id = self.list_vehicle(seller);

        let engine = self
            .factory
            .create(AgreementParams {
                seller,
                buyer,
                asset: AssetRef {
                    ledger: self.registry.clone(),
                    asset_id,
                },
                payment_ledger: self.token.clone(),
                total_installments,
                installment_amount,
            })
            .expect("test agreement must be valid");

        let total = engine.total_price();
        self.registry
            .approve(seller, engine.custody(), asset_id)
            .expect("seller owns the vehicle");
        self.token.mint(buyer, total).expect("mint buyer funds");
        self.token
            .approve(buyer, engine.custody(), total)
            .expect("approve custody");

        Sale {
            seller,
            buyer,
            asset_id,
            engine,
        }
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl Sale {
    /// Deposit the vehicle and pay every installment.
    ///
    /// # Panics
    /// If any step is rejected.
    pub fn deposit_and_pay_all(&self) {
        self.engine
            .deposit_asset(self.seller)
            .expect("deposit must succeed");
        for _ in 0..self.engine.total_installments() {
            self.engine
                .pay_installment(self.buyer)
                .expect("installment must succeed");
        }
    }
}
