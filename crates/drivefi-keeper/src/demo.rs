//! Demo marketplace: deploys the reference ledgers, opens one or more
//! vehicle sales, pays them off on a schedule, and lets a running keeper
//! settle them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use drivefi_escrow::{AgreementFactory, AgreementParams, AssetRef, EscrowEngine, TracingSink};
use drivefi_ledger::{TokenLedger, VehicleRegistry};
use drivefi_types::{
    AgreementSnapshot, AgreementStatus, EscrowConfig, KeeperConfig, PrincipalId, VehicleMetadata,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::keeper::{Keeper, KeeperTotals};

#[derive(Debug, Clone)]
pub struct DemoParams {
    pub sales: usize,
    pub total_installments: u32,
    pub installment_amount: Decimal,
    /// Pause between installment rounds.
    pub payment_delay: Duration,
    /// Give up waiting for settlement after this long.
    pub settle_timeout: Duration,
    pub keeper: KeeperConfig,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            sales: 1,
            total_installments: 12,
            installment_amount: Decimal::new(10, 0),
            payment_delay: Duration::from_millis(50),
            settle_timeout: Duration::from_secs(30),
            keeper: KeeperConfig::default(),
        }
    }
}

/// Final state of a demo run, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct DemoSummary {
    pub agreements: Vec<AgreementSnapshot>,
    pub keeper: KeeperTotals,
    pub token_supply: Decimal,
}

struct DemoSale {
    buyer: PrincipalId,
    engine: Arc<EscrowEngine>,
}

/// Run the whole demo.
///
/// # Errors
/// Any rejected ledger or escrow call, a failed supply check, or a sale
/// that did not settle before `settle_timeout`.
pub async fn run_demo(params: DemoParams) -> anyhow::Result<DemoSummary> {
    let registry = Arc::new(VehicleRegistry::new("CarNFT", "CARNFT"));
    let token = Arc::new(TokenLedger::stablecoin());
    let operator = PrincipalId::new();
    let factory = Arc::new(AgreementFactory::with_sink(
        EscrowConfig {
            operator: Some(operator),
            ..EscrowConfig::default()
        },
        Arc::new(TracingSink),
    )?);

    let keeper = Arc::new(Keeper::new(Arc::clone(&factory), params.keeper.clone())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keeper_task = tokio::spawn(Arc::clone(&keeper).run(shutdown_rx));

    let mut sales = Vec::with_capacity(params.sales);
    for n in 0..params.sales {
        sales.push(open_sale(&registry, &token, &factory, &params, n)?);
    }

    for round in 1..=params.total_installments {
        for sale in &sales {
            sale.engine
                .pay_installment(sale.buyer)
                .with_context(|| format!("installment {round} for {}", sale.engine.id()))?;
        }
        time::sleep(params.payment_delay).await;
    }

    let deadline = time::Instant::now() + params.settle_timeout;
    while !sales
        .iter()
        .all(|s| s.engine.status() == AgreementStatus::Finalized)
    {
        if time::Instant::now() >= deadline {
            let _ = shutdown_tx.send(true);
            bail!("sales did not settle within {:?}", params.settle_timeout);
        }
        time::sleep(params.keeper.poll_interval()).await;
    }

    let _ = shutdown_tx.send(true);
    let totals = keeper_task.await.context("keeper task panicked")?;
    token.verify_supply()?;

    Ok(DemoSummary {
        agreements: sales.iter().map(|s| s.engine.snapshot()).collect(),
        keeper: totals,
        token_supply: token.total_supply(),
    })
}

fn open_sale(
    registry: &Arc<VehicleRegistry>,
    token: &Arc<TokenLedger>,
    factory: &AgreementFactory,
    params: &DemoParams,
    n: usize,
) -> anyhow::Result<DemoSale> {
    let seller = PrincipalId::new();
    let buyer = PrincipalId::new();

    let vin = format!("1HGCM82633A{:06}", 4352 + n);
    let asset_id = registry.mint_vehicle(
        seller,
        VehicleMetadata::new(vin, "Honda", "Civic", 2021, 20_000, format!("RENAVAM{:06}", 123_456 + n)),
    )?;

    let engine = factory.create(AgreementParams {
        seller,
        buyer,
        asset: AssetRef {
            ledger: registry.clone(),
            asset_id,
        },
        payment_ledger: token.clone(),
        total_installments: params.total_installments,
        installment_amount: params.installment_amount,
    })?;

    let total = engine.total_price();
    token.mint(buyer, total)?;
    token.approve(buyer, engine.custody(), total)?;
    registry.approve(seller, engine.custody(), asset_id)?;
    engine.deposit_asset(seller)?;

    tracing::info!(
        agreement = %engine.id(),
        asset = %asset_id,
        seller = %seller.short(),
        buyer = %buyer.short(),
        total = %total,
        "Demo sale opened"
    );
    Ok(DemoSale { buyer, engine })
}
