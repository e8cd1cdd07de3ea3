//! # drivefi-keeper
//!
//! **Automation plane**: a reference keeper that polls every agreement a
//! factory created and executes settlement once an agreement is ready.
//!
//! The keeper holds no authority. It only calls the public
//! `check` / `execute` pair on each [`SettlementTrigger`], so any number of
//! keepers can run against the same factory without double settlement.
//!
//! [`SettlementTrigger`]: drivefi_escrow::SettlementTrigger

pub mod demo;
pub mod keeper;
pub mod logging;
pub mod settled_cache;

pub use keeper::{ExecutionFailure, Keeper, KeeperTotals, PollReport};
pub use settled_cache::SettledCache;
