//! Error types for the DriveFi escrow.
//!
//! Two enums, both with stable prefixed codes for easy grepping in logs:
//!
//! - [`LedgerError`] (`LEDGER_ERR_`): a ledger rejected a query or transfer.
//!   - 1xx: asset registry
//!   - 2xx: payment token
//! - [`EscrowError`] (`ESC_ERR_`): an escrow operation failed.
//!   - 1xx: caller / state / parameter checks (nothing changed)
//!   - 2xx: ledger transfer rejected (nothing changed, retryable)
//!   - 3xx: settlement fault (`finalized` already set, operator action needed)
//!   - 4xx: registry lookups
//!   - 9xx: configuration

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    AgreementId, AgreementStatus, AssetId, LedgerId, Operation, PrincipalId, Role, SettlementLeg,
};

/// Rejection from an asset registry or payment token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // =================================================================
    // Asset registry (1xx)
    // =================================================================
    #[error("LEDGER_ERR_100: Unknown asset: {0}")]
    UnknownAsset(AssetId),

    /// `from` does not own the asset.
    #[error("LEDGER_ERR_101: {from} does not own {asset_id} (owner is {owner})")]
    NotOwner {
        asset_id: AssetId,
        from: PrincipalId,
        owner: PrincipalId,
    },

    /// The operator is neither the owner nor approved by it.
    #[error("LEDGER_ERR_102: {operator} is not approved to move {asset_id}")]
    NotApproved {
        asset_id: AssetId,
        operator: PrincipalId,
    },

    #[error("LEDGER_ERR_103: Invalid vehicle metadata: {reason}")]
    InvalidVehicle { reason: String },

    #[error("LEDGER_ERR_104: VIN already registered: {0}")]
    DuplicateVin(String),

    /// Transfers are suspended registry-wide.
    #[error("LEDGER_ERR_105: Ledger paused: {0}")]
    Paused(LedgerId),

    // =================================================================
    // Payment token (2xx)
    // =================================================================
    #[error("LEDGER_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("LEDGER_ERR_201: Insufficient allowance: need {needed}, approved {approved}")]
    InsufficientAllowance { needed: Decimal, approved: Decimal },

    /// Non-positive amount, or one finer than the token's decimals.
    #[error("LEDGER_ERR_202: Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("LEDGER_ERR_203: Balance overflow")]
    Overflow,

    /// Supply conservation broke. Critical: the ledger's books are wrong.
    #[error("LEDGER_ERR_204: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// The account is blocklisted by the token issuer.
    #[error("LEDGER_ERR_205: Account blocked: {0}")]
    AccountBlocked(PrincipalId),
}

/// Central error enum for escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    // =================================================================
    // Checks (1xx): state unchanged
    // =================================================================
    /// Wrong caller for the operation.
    #[error("ESC_ERR_100: Unauthorized: {operation} is reserved for the {required}, called by {caller}")]
    Unauthorized {
        operation: Operation,
        required: Role,
        caller: PrincipalId,
    },

    /// Operation not valid in the current state.
    #[error("ESC_ERR_101: Invalid state for {operation}: agreement is {state}, {reason}")]
    InvalidState {
        operation: Operation,
        state: AgreementStatus,
        reason: String,
    },

    /// Construction-time validation failed.
    #[error("ESC_ERR_102: Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    // =================================================================
    // Ledger rejections (2xx): state unchanged, retryable
    // =================================================================
    #[error("ESC_ERR_200: Asset transfer failed during {operation}: {source}")]
    AssetTransferFailed {
        operation: Operation,
        #[source]
        source: LedgerError,
    },

    #[error("ESC_ERR_201: Payment transfer failed during {operation}: {source}")]
    PaymentTransferFailed {
        operation: Operation,
        #[source]
        source: LedgerError,
    },

    // =================================================================
    // Settlement (3xx): fatal
    // =================================================================
    /// `finalized` is set but a settlement leg did not complete.
    #[error("ESC_ERR_300: Settlement failed at {leg} for {agreement_id}: {source}")]
    SettlementFailed {
        agreement_id: AgreementId,
        leg: SettlementLeg,
        #[source]
        source: LedgerError,
    },

    // =================================================================
    // Registry (4xx)
    // =================================================================
    #[error("ESC_ERR_400: Agreement not found: {0}")]
    AgreementNotFound(AgreementId),

    // =================================================================
    // Configuration (9xx)
    // =================================================================
    #[error("ESC_ERR_900: Configuration error: {0}")]
    Configuration(String),
}

impl EscrowError {
    /// The caller may retry once the underlying cause (e.g. a missing
    /// approval) is fixed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AssetTransferFailed { .. } | Self::PaymentTransferFailed { .. }
        )
    }

    /// Requires operator remediation.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SettlementFailed { .. })
    }

    /// Stable code, e.g. `ESC_ERR_101`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "ESC_ERR_100",
            Self::InvalidState { .. } => "ESC_ERR_101",
            Self::InvalidParameters { .. } => "ESC_ERR_102",
            Self::AssetTransferFailed { .. } => "ESC_ERR_200",
            Self::PaymentTransferFailed { .. } => "ESC_ERR_201",
            Self::SettlementFailed { .. } => "ESC_ERR_300",
            Self::AgreementNotFound(_) => "ESC_ERR_400",
            Self::Configuration(_) => "ESC_ERR_900",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

/// `Result` alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
