//! # drivefi-escrow
//!
//! **Escrow plane**: one [`EscrowEngine`] per vehicle sale, created by the
//! [`AgreementFactory`] and settled through a [`SettlementTrigger`].
//!
//! ## Architecture
//!
//! 1. **AgreementFactory**: validates sale parameters, creates engines, indexes them
//! 2. **EscrowEngine**: deposit, installments, readiness, finalize, remediation
//! 3. **SettlementTrigger**: keeper-facing `check` / `execute`
//! 4. **EventSink**: where agreement events go besides the per-agreement log
//!
//! ## Guarantees
//!
//! - Each engine serializes its own operations behind one mutex
//! - `finalize` settles at most once, whoever calls it and however often
//! - Installments stay in custody until settlement
//! - A settlement leg that fails after `finalized` is set is recorded,
//!   surfaced as `SettlementFailed`, and left for operator remediation

pub mod engine;
pub mod factory;
pub mod sink;
pub mod trigger;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testkit;

pub use engine::EscrowEngine;
pub use factory::{AgreementFactory, AgreementParams, AssetRef};
pub use sink::{EventSink, MemorySink, TracingSink};
pub use trigger::{SettlementTrigger, TriggerStats, UpkeepCheck};
