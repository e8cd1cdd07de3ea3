//! # drivefi-types
//!
//! Shared types, errors, and configuration for the **DriveFi** installment escrow.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AgreementId`], [`PrincipalId`], [`AssetId`], [`LedgerId`]
//! - **Agreement model**: [`AgreementTerms`], [`AgreementStatus`], [`DepositState`], [`AgreementSnapshot`]
//! - **Settlement model**: [`SettlementRecord`], [`SettlementLeg`], [`SettlementReceipt`], [`FinalizeOutcome`]
//! - **Events**: [`EscrowEvent`], [`EventRecord`]
//! - **Vehicle model**: [`VehicleMetadata`]
//! - **Configuration**: [`EscrowConfig`], [`KeeperConfig`]
//! - **Errors**: [`EscrowError`] (`ESC_ERR_`) and [`LedgerError`] (`LEDGER_ERR_`)
//! - **Constants**: system-wide limits and defaults

pub mod agreement;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod settlement;
pub mod vehicle;

// Re-export all primary types at crate root for ergonomic imports:
//   use drivefi_types::{AgreementId, AgreementStatus, EscrowError, ...};

pub use agreement::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use settlement::*;
pub use vehicle::*;

// Constants are accessed via `drivefi_types::constants::FOO`
// (not re-exported to avoid name collisions).
