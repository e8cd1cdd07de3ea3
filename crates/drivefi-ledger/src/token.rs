//! In-memory fungible payment token with allowances.
//!
//! Balances and allowances live behind one lock, so every transfer is
//! atomic: it either debits, credits and (when acting on behalf of
//! someone) consumes allowance, or changes nothing.

use std::collections::{HashMap, HashSet};

use drivefi_types::{LedgerError, LedgerId, LedgerResult, PrincipalId, constants};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::ledger::PaymentLedger;
use crate::supply::SupplyTracker;

#[derive(Default)]
struct TokenState {
    balances: HashMap<PrincipalId, Decimal>,
    /// (owner, spender) → remaining allowance.
    allowances: HashMap<(PrincipalId, PrincipalId), Decimal>,
    blocked: HashSet<PrincipalId>,
    supply: SupplyTracker,
}

impl TokenState {
    fn balance(&self, owner: PrincipalId) -> Decimal {
        self.balances.get(&owner).copied().unwrap_or(Decimal::ZERO)
    }

    fn allowance(&self, owner: PrincipalId, spender: PrincipalId) -> Decimal {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// A fungible token ledger (the reference stablecoin).
pub struct TokenLedger {
    id: LedgerId,
    name: String,
    symbol: String,
    decimals: u32,
    state: Mutex<TokenState>,
}

impl TokenLedger {
    #[must_use]
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            id: LedgerId::new(),
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// A six-decimal USD stablecoin.
    #[must_use]
    pub fn stablecoin() -> Self {
        Self::new("Tether USD", "USDT", constants::STABLECOIN_DECIMALS)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Reject amounts that are non-positive or finer than the token's precision.
    fn check_amount(&self, amount: Decimal) -> LedgerResult<()> {
        if amount <= Decimal::ZERO || amount.normalize().scale() > self.decimals {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(())
    }

    /// Create `amount` new tokens in `to`'s balance.
    pub fn mint(&self, to: PrincipalId, amount: Decimal) -> LedgerResult<()> {
        self.check_amount(amount)?;
        let mut state = self.state.lock();
        let new_balance = state
            .balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        state.balances.insert(to, new_balance);
        state.supply.record_mint(amount);
        tracing::debug!(token = %self.symbol, to = %to, amount = %amount, "Minted");
        Ok(())
    }

    /// Destroy `amount` from `from`'s balance.
    pub fn burn(&self, from: PrincipalId, amount: Decimal) -> LedgerResult<()> {
        self.check_amount(amount)?;
        let mut state = self.state.lock();
        let available = state.balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        state.balances.insert(from, available - amount);
        state.supply.record_burn(amount);
        Ok(())
    }

    /// Set (not add to) the amount `spender` may move from `owner`.
    pub fn approve(&self, owner: PrincipalId, spender: PrincipalId, amount: Decimal) -> LedgerResult<()> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = self.state.lock();
        if amount.is_zero() {
            state.allowances.remove(&(owner, spender));
        } else {
            state.allowances.insert((owner, spender), amount);
        }
        tracing::debug!(token = %self.symbol, owner = %owner, spender = %spender, amount = %amount, "Allowance set");
        Ok(())
    }

    /// Owner-initiated transfer.
    pub fn transfer(&self, from: PrincipalId, to: PrincipalId, amount: Decimal) -> LedgerResult<()> {
        self.transfer_from(from, from, to, amount)
    }

    /// Add or remove `principal` from the issuer blocklist.
    pub fn set_blocked(&self, principal: PrincipalId, blocked: bool) {
        let mut state = self.state.lock();
        if blocked {
            state.blocked.insert(principal);
            tracing::warn!(token = %self.symbol, account = %principal, "Account blocked");
        } else {
            state.blocked.remove(&principal);
            tracing::info!(token = %self.symbol, account = %principal, "Account unblocked");
        }
    }

    #[must_use]
    pub fn is_blocked(&self, principal: PrincipalId) -> bool {
        self.state.lock().blocked.contains(&principal)
    }

    /// Sum of all balances.
    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        self.state.lock().balances.values().copied().sum()
    }

    /// Check Σ balances == mints − burns.
    pub fn verify_supply(&self) -> LedgerResult<()> {
        let state = self.state.lock();
        let actual: Decimal = state.balances.values().copied().sum();
        state.supply.verify(actual)
    }
}

impl PaymentLedger for TokenLedger {
    fn ledger_id(&self) -> LedgerId {
        self.id
    }

    fn balance_of(&self, owner: PrincipalId) -> Decimal {
        self.state.lock().balance(owner)
    }

    fn allowance(&self, owner: PrincipalId, spender: PrincipalId) -> Decimal {
        self.state.lock().allowance(owner, spender)
    }

    fn validate_amount(&self, amount: Decimal) -> LedgerResult<()> {
        self.check_amount(amount)
    }

    fn transfer_from(
        &self,
        spender: PrincipalId,
        owner: PrincipalId,
        to: PrincipalId,
        amount: Decimal,
    ) -> LedgerResult<()> {
        self.check_amount(amount)?;
        let mut state = self.state.lock();

        for account in [owner, to] {
            if state.blocked.contains(&account) {
                return Err(LedgerError::AccountBlocked(account));
            }
        }

        let available = state.balance(owner);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available,
            });
        }

        let remaining_allowance = if spender == owner {
            None
        } else {
            let approved = state.allowance(owner, spender);
            if approved < amount {
                return Err(LedgerError::InsufficientAllowance {
                    needed: amount,
                    approved,
                });
            }
            Some(approved - amount)
        };

        // All checks passed: apply debit, credit and allowance together.
        if owner != to {
            let credited = state
                .balance(to)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            state.balances.insert(owner, available - amount);
            state.balances.insert(to, credited);
        }
        if let Some(left) = remaining_allowance {
            if left.is_zero() {
                state.allowances.remove(&(owner, spender));
            } else {
                state.allowances.insert((owner, spender), left);
            }
        }

        tracing::debug!(
            token = %self.symbol,
            spender = %spender,
            from = %owner,
            to = %to,
            amount = %amount,
            "Transferred"
        );
        Ok(())
    }
}
