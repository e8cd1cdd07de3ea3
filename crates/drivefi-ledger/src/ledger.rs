//! The two ledger interfaces the escrow engine consumes.
//!
//! Both traits are object safe and `Send + Sync`, so an engine can hold
//! them as `Arc<dyn AssetLedger>` / `Arc<dyn PaymentLedger>` and share one
//! ledger across many agreements. Implementations synchronize internally;
//! every method takes `&self`.

use drivefi_types::{AssetId, LedgerId, LedgerResult, PrincipalId};
use rust_decimal::Decimal;

/// Authoritative registry of unique asset ownership.
pub trait AssetLedger: Send + Sync {
    fn ledger_id(&self) -> LedgerId;

    /// Current owner of `asset_id`.
    ///
    /// # Errors
    /// `UnknownAsset` if the id was never minted.
    fn owner_of(&self, asset_id: AssetId) -> LedgerResult<PrincipalId>;

    /// Move `asset_id` from `from` to `to`, acting as `operator`.
    ///
    /// # Errors
    /// - `NotOwner` if `from` does not own the asset
    /// - `NotApproved` if `operator` is neither the owner nor approved
    /// - `Paused` if the registry suspended transfers
    fn transfer(
        &self,
        operator: PrincipalId,
        asset_id: AssetId,
        from: PrincipalId,
        to: PrincipalId,
    ) -> LedgerResult<()>;
}

/// Authoritative registry of fungible balances and allowances.
pub trait PaymentLedger: Send + Sync {
    fn ledger_id(&self) -> LedgerId;

    fn balance_of(&self, owner: PrincipalId) -> Decimal;

    /// Amount `spender` may still move out of `owner`'s balance.
    fn allowance(&self, owner: PrincipalId, spender: PrincipalId) -> Decimal;

    /// Whether `amount` could ever be moved by `transfer_from`, independent
    /// of balances and allowances.
    ///
    /// # Errors
    /// `InvalidAmount` if `amount` is non-positive or finer than the
    /// ledger's precision.
    fn validate_amount(&self, amount: Decimal) -> LedgerResult<()>;

    /// Move `amount` from `owner` to `to`, acting as `spender`.
    ///
    /// When `spender != owner` the allowance is checked and reduced.
    ///
    /// # Errors
    /// - `InvalidAmount` if [`validate_amount`](Self::validate_amount) rejects `amount`
    /// - `InsufficientBalance` / `InsufficientAllowance`
    /// - `AccountBlocked` if either side is blocklisted
    fn transfer_from(
        &self,
        spender: PrincipalId,
        owner: PrincipalId,
        to: PrincipalId,
        amount: Decimal,
    ) -> LedgerResult<()>;
}
