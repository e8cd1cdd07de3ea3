//! System-wide constants for the DriveFi escrow.

/// Upper bound on the installment count a single agreement may carry
/// (30 years of monthly payments).
pub const MAX_TOTAL_INSTALLMENTS: u32 = 360;

/// Default keeper polling interval in milliseconds.
pub const DEFAULT_KEEPER_POLL_MS: u64 = 1000;

/// Default cap on `execute()` calls a keeper issues in one polling round.
pub const DEFAULT_MAX_EXECUTIONS_PER_ROUND: usize = 256;

/// Number of settled agreement ids a keeper remembers before evicting the oldest.
pub const DEFAULT_SETTLED_CACHE_SIZE: usize = 100_000;

/// Domain separator for deriving an agreement's custody principal.
pub const CUSTODY_DOMAIN: &[u8] = b"drivefi:custody:v1:";

/// Decimal places of the reference stablecoin (matches USDT).
pub const STABLECOIN_DECIMALS: u32 = 6;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "DriveFi";
