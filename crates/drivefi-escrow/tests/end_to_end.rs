//! End-to-end tests across the ledger and escrow planes.
//!
//! Each test builds a small marketplace (vehicle registry, stablecoin,
//! factory), walks one or more sales through their lifecycle, and checks
//! ownership, balances, events and supply afterwards.

use std::sync::Arc;
use std::thread;

use drivefi_escrow::{
    AgreementFactory, AgreementParams, AssetRef, EscrowEngine, MemorySink, SettlementTrigger,
};
use drivefi_ledger::{AssetLedger, PaymentLedger, TokenLedger, VehicleRegistry};
use drivefi_types::*;
use rust_decimal::Decimal;

/// Helper: one registry, one token, one factory.
struct Market {
    registry: Arc<VehicleRegistry>,
    token: Arc<TokenLedger>,
    factory: AgreementFactory,
    sink: Arc<MemorySink>,
    operator: PrincipalId,
    next_vin: u32,
}

struct Parties {
    seller: PrincipalId,
    buyer: PrincipalId,
    asset_id: AssetId,
    engine: Arc<EscrowEngine>,
}

impl Market {
    fn new() -> Self {
        let operator = PrincipalId::new();
        let sink = Arc::new(MemorySink::new());
        let config = EscrowConfig {
            operator: Some(operator),
            ..EscrowConfig::default()
        };
        Self {
            registry: Arc::new(VehicleRegistry::new("DriveFi Vehicles", "DFV")),
            token: Arc::new(TokenLedger::stablecoin()),
            factory: AgreementFactory::with_sink(config, sink.clone()).unwrap(),
            sink,
            operator,
            next_vin: 0,
        }
    }

    /// Create a sale; the buyer is funded with `buyer_funds` and approves
    /// `allowance` for custody.
    fn open(
        &mut self,
        total: u32,
        amount: Decimal,
        buyer_funds: Decimal,
        allowance: Decimal,
    ) -> Parties {
        self.next_vin += 1;
        let seller = PrincipalId::new();
        let buyer = PrincipalId::new();
        let asset_id = self
            .registry
            .mint_vehicle(
                seller,
                VehicleMetadata::new(
                    format!("5YJ3E1EA7KF{:06}", self.next_vin),
                    "Tesla",
                    "Model 3",
                    2019,
                    61_500,
                    format!("MH-12-{:04}", self.next_vin),
                ),
            )
            .expect("mint vehicle");

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
                total_installments: total,
                installment_amount: amount,
            })
            .expect("create agreement");

        self.registry
            .approve(seller, engine.custody(), asset_id)
            .unwrap();
        self.token.mint(buyer, buyer_funds).unwrap();
        self.token.approve(buyer, engine.custody(), allowance).unwrap();

        Parties {
            seller,
            buyer,
            asset_id,
            engine,
        }
    }
}

fn usd(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

#[test]
fn three_installments_of_ten_settle_to_thirty() {
    let mut m = Market::new();
    let p = m.open(3, usd(10), usd(30), usd(30));
    let trigger = SettlementTrigger::new(Arc::clone(&p.engine));

    p.engine.deposit_asset(p.seller).unwrap();
    assert_eq!(m.registry.owner_of(p.asset_id).unwrap(), p.engine.custody());

    for expected in 1..=3 {
        assert!(!trigger.check());
        assert_eq!(p.engine.pay_installment(p.buyer).unwrap(), expected);
    }
    assert!(trigger.check());

    let outcome = trigger.execute().unwrap();
    let receipt = outcome.receipt().expect("settled");
    assert_eq!(receipt.total_transferred, usd(30));

    assert_eq!(m.registry.owner_of(p.asset_id).unwrap(), p.buyer);
    assert_eq!(m.token.balance_of(p.seller), usd(30));
    assert_eq!(m.token.balance_of(p.buyer), Decimal::ZERO);
    assert_eq!(m.token.balance_of(p.engine.custody()), Decimal::ZERO);

    let snap = p.engine.snapshot();
    assert_eq!(snap.status, AgreementStatus::Finalized);
    assert!(snap.finalized);
    assert_eq!(snap.remaining_installments(), 0);
    assert_eq!(snap.progress_percent(), Decimal::ONE_HUNDRED);

    let kinds: Vec<_> = p.engine.events().iter().map(|r| r.event.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "asset_deposited",
            "installment_paid",
            "installment_paid",
            "installment_paid",
            "finalized",
        ]
    );
    m.token.verify_supply().unwrap();
}

#[test]
fn allowance_covering_two_installments_stops_at_two() {
    let mut m = Market::new();
    let p = m.open(3, usd(10), usd(30), usd(20));
    p.engine.deposit_asset(p.seller).unwrap();

    p.engine.pay_installment(p.buyer).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();
    let err = p.engine.pay_installment(p.buyer).unwrap_err();

    assert_eq!(err.code(), "ESC_ERR_201");
    assert!(err.is_retryable());
    assert_eq!(p.engine.installments_paid(), 2);
    assert!(!p.engine.is_ready());
    assert_eq!(m.token.balance_of(p.buyer), usd(10));

    // Topping up the allowance makes the failed call retryable.
    m.token.approve(p.buyer, p.engine.custody(), usd(10)).unwrap();
    assert_eq!(p.engine.pay_installment(p.buyer).unwrap(), 3);
    assert!(p.engine.is_ready());
}

#[test]
fn buyer_without_funds_cannot_pay() {
    let mut m = Market::new();
    let p = m.open(2, usd(10), usd(5), usd(20));
    p.engine.deposit_asset(p.seller).unwrap();

    let err = p.engine.pay_installment(p.buyer).unwrap_err();
    assert!(matches!(
        err,
        EscrowError::PaymentTransferFailed {
            source: LedgerError::InsufficientBalance { .. },
            ..
        }
    ));
    assert_eq!(p.engine.status(), AgreementStatus::Escrowed);
}

#[test]
fn second_execute_is_noop_with_single_finalized_event() {
    let mut m = Market::new();
    let p = m.open(2, usd(100), usd(200), usd(200));
    p.engine.deposit_asset(p.seller).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();

    let trigger = SettlementTrigger::new(Arc::clone(&p.engine));
    assert!(trigger.execute().unwrap().is_settled());
    assert_eq!(
        trigger.execute().unwrap(),
        FinalizeOutcome::NoOp(NoOpReason::AlreadyFinalized)
    );

    let finalized = m
        .sink
        .records()
        .into_iter()
        .filter(|r| r.agreement_id == p.engine.id() && r.event.kind() == "finalized")
        .count();
    assert_eq!(finalized, 1);
    assert_eq!(m.token.balance_of(p.seller), usd(200));
}

#[test]
fn concurrent_executes_settle_exactly_once() {
    let mut m = Market::new();
    let p = m.open(4, usd(25), usd(100), usd(100));
    p.engine.deposit_asset(p.seller).unwrap();
    for _ in 0..4 {
        p.engine.pay_installment(p.buyer).unwrap();
    }

    let trigger = Arc::new(SettlementTrigger::new(Arc::clone(&p.engine)));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let trigger = Arc::clone(&trigger);
            thread::spawn(move || trigger.execute().unwrap())
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_settled()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter(|o| !o.is_settled())
            .all(|o| *o == FinalizeOutcome::NoOp(NoOpReason::AlreadyFinalized))
    );
    assert_eq!(m.token.balance_of(p.seller), usd(100));
    assert_eq!(m.registry.owner_of(p.asset_id).unwrap(), p.buyer);
    assert_eq!(trigger.stats().settled, 1);
    assert_eq!(trigger.stats().no_ops, 15);
}

#[test]
fn concurrent_installments_never_overpay() {
    let mut m = Market::new();
    let p = m.open(5, usd(10), usd(100), usd(100));
    p.engine.deposit_asset(p.seller).unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = Arc::clone(&p.engine);
            let buyer = p.buyer;
            thread::spawn(move || engine.pay_installment(buyer).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 5);
    assert_eq!(p.engine.installments_paid(), 5);
    assert_eq!(m.token.balance_of(p.engine.custody()), usd(50));
    assert_eq!(m.token.balance_of(p.buyer), usd(50));
}

#[test]
fn settlement_fault_then_remediation() {
    let mut m = Market::new();
    let p = m.open(2, usd(10), usd(20), usd(20));
    p.engine.deposit_asset(p.seller).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();

    m.token.set_blocked(p.seller, true);
    let err = SettlementTrigger::new(Arc::clone(&p.engine))
        .execute()
        .unwrap_err();
    assert_eq!(err.code(), "ESC_ERR_300");
    assert!(err.is_fatal());
    assert_eq!(p.engine.status(), AgreementStatus::SettlementFaulted);
    assert!(!p.engine.is_ready());

    // Buyer already has the car; funds are still safe in custody.
    assert_eq!(m.registry.owner_of(p.asset_id).unwrap(), p.buyer);
    assert_eq!(m.token.balance_of(p.engine.custody()), usd(20));

    m.token.set_blocked(p.seller, false);
    let receipt = p.engine.remediate_settlement(m.operator).unwrap();
    assert_eq!(receipt.total_transferred, usd(20));
    assert_eq!(p.engine.status(), AgreementStatus::Finalized);
    assert_eq!(m.token.balance_of(p.seller), usd(20));
    m.token.verify_supply().unwrap();
}

#[test]
fn finalize_refuses_when_custody_lost_the_asset() {
    let mut m = Market::new();
    let p = m.open(1, usd(10), usd(10), usd(10));
    p.engine.deposit_asset(p.seller).unwrap();
    p.engine.pay_installment(p.buyer).unwrap();

    // Move the asset out of custody behind the engine's back.
    let thief = PrincipalId::new();
    m.registry.set_approval_for_all(p.engine.custody(), thief, true);
    m.registry
        .transfer(thief, p.asset_id, p.engine.custody(), thief)
        .unwrap();

    let err = p.engine.finalize().unwrap_err();
    assert!(matches!(
        err,
        EscrowError::AssetTransferFailed {
            operation: Operation::Finalize,
            source: LedgerError::NotOwner { .. },
        }
    ));
    assert!(!p.engine.is_finalized());
    assert_eq!(p.engine.status(), AgreementStatus::ReadyToFinalize);
    assert_eq!(m.token.balance_of(p.seller), Decimal::ZERO);
}

#[test]
fn many_independent_sales_conserve_supply() {
    let mut m = Market::new();
    let sales: Vec<_> = (1..=8)
        .map(|i| m.open(i, usd(i64::from(i) * 3), usd(1_000), usd(1_000)))
        .collect();

    for (i, p) in sales.iter().enumerate() {
        p.engine.deposit_asset(p.seller).unwrap();
        // Leave every third sale half-paid.
        let to_pay = if i % 3 == 0 {
            p.engine.total_installments() / 2
        } else {
            p.engine.total_installments()
        };
        for _ in 0..to_pay {
            p.engine.pay_installment(p.buyer).unwrap();
        }
        SettlementTrigger::new(Arc::clone(&p.engine)).execute().unwrap();
        m.token.verify_supply().unwrap();
    }

    let expected_total = Decimal::from(8 * 1_000);
    assert_eq!(m.token.total_supply(), expected_total);

    for (i, p) in sales.iter().enumerate() {
        let snap = p.engine.snapshot();
        if i % 3 == 0 {
            assert!(!snap.finalized);
            assert_eq!(m.registry.owner_of(p.asset_id).unwrap(), p.engine.custody());
            assert_eq!(m.token.balance_of(p.seller), Decimal::ZERO);
        } else {
            assert_eq!(snap.status, AgreementStatus::Finalized);
            assert_eq!(m.token.balance_of(p.seller), p.engine.total_price());
        }
    }
    assert_eq!(m.factory.len(), 8);
}
