//! # drivefi-ledger
//!
//! **Ledger plane**: the interfaces the escrow consumes and in-memory
//! reference ledgers that implement them.
//!
//! ## Architecture
//!
//! 1. **AssetLedger / PaymentLedger**: traits the escrow engine calls
//! 2. **VehicleRegistry**: unique vehicle tokens with metadata and approvals
//! 3. **TokenLedger**: fungible stablecoin with allowances and a blocklist
//! 4. **SupplyTracker**: Σ balances == mints − burns, checked on demand
//!
//! ## Escrow Flow
//!
//! ```text
//! seller: VehicleRegistry.approve(custody) → engine: AssetLedger.transfer(seller → custody)
//! buyer:  TokenLedger.approve(custody)     → engine: PaymentLedger.transfer_from(buyer → custody)
//! settle: AssetLedger.transfer(custody → buyer) + PaymentLedger.transfer_from(custody → seller)
//! ```

pub mod ledger;
pub mod registry;
pub mod supply;
pub mod token;

pub use ledger::{AssetLedger, PaymentLedger};
pub use registry::VehicleRegistry;
pub use supply::SupplyTracker;
pub use token::TokenLedger;
