//! In-memory vehicle registry: one unique token per vehicle.
//!
//! Ownership and approvals follow the usual non-fungible token rules:
//! the owner, the per-token approved account, or an operator approved for
//! all of the owner's tokens may move a token. The per-token approval is
//! cleared on every transfer.

use std::collections::{HashMap, HashSet};

use drivefi_types::{
    AssetId, LedgerError, LedgerId, LedgerResult, PrincipalId, VehicleMetadata,
};
use parking_lot::Mutex;

use crate::ledger::AssetLedger;

struct RegistryState {
    /// Id the next mint receives.
    next_id: AssetId,
    owners: HashMap<AssetId, PrincipalId>,
    vehicles: HashMap<AssetId, VehicleMetadata>,
    /// VINs already minted, for duplicate detection.
    vins: HashSet<String>,
    /// Per-token approved account.
    token_approvals: HashMap<AssetId, PrincipalId>,
    /// (owner, operator) pairs approved for all tokens.
    operator_approvals: HashSet<(PrincipalId, PrincipalId)>,
    paused: bool,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            next_id: AssetId(1),
            owners: HashMap::new(),
            vehicles: HashMap::new(),
            vins: HashSet::new(),
            token_approvals: HashMap::new(),
            operator_approvals: HashSet::new(),
            paused: false,
        }
    }

    fn owner(&self, asset_id: AssetId) -> LedgerResult<PrincipalId> {
        self.owners
            .get(&asset_id)
            .copied()
            .ok_or(LedgerError::UnknownAsset(asset_id))
    }

    fn is_authorized(&self, operator: PrincipalId, owner: PrincipalId, asset_id: AssetId) -> bool {
        operator == owner
            || self.token_approvals.get(&asset_id) == Some(&operator)
            || self.operator_approvals.contains(&(owner, operator))
    }
}

/// Registry of tokenized vehicles.
pub struct VehicleRegistry {
    id: LedgerId,
    name: String,
    symbol: String,
    state: Mutex<RegistryState>,
}

impl VehicleRegistry {
    /// Create an empty registry. Token ids start at 1.
    #[must_use]
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: LedgerId::new(),
            name: name.into(),
            symbol: symbol.into(),
            state: Mutex::new(RegistryState::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Mint a new vehicle token to `to`.
    ///
    /// # Errors
    /// - `InvalidVehicle` if the metadata fails validation
    /// - `DuplicateVin` if the VIN was already minted
    pub fn mint_vehicle(&self, to: PrincipalId, metadata: VehicleMetadata) -> LedgerResult<AssetId> {
        metadata.validate()?;

        let mut state = self.state.lock();
        if state.vins.contains(&metadata.vin) {
            return Err(LedgerError::DuplicateVin(metadata.vin));
        }

        let asset_id = state.next_id;
        state.next_id = asset_id.next();
        state.vins.insert(metadata.vin.clone());
        state.owners.insert(asset_id, to);

        tracing::info!(
            registry = %self.symbol,
            asset = %asset_id,
            owner = %to,
            vehicle = %metadata.label(),
            vin = %metadata.vin,
            "Vehicle minted"
        );
        state.vehicles.insert(asset_id, metadata);
        Ok(asset_id)
    }

    /// Metadata recorded at mint time.
    #[must_use]
    pub fn vehicle(&self, asset_id: AssetId) -> Option<VehicleMetadata> {
        self.state.lock().vehicles.get(&asset_id).cloned()
    }

    /// Approve `spender` to move one token. `caller` must be the owner or
    /// an operator approved for all of the owner's tokens.
    ///
    /// # Errors
    /// `UnknownAsset`, or `NotApproved` if `caller` may not grant approval.
    pub fn approve(
        &self,
        caller: PrincipalId,
        spender: PrincipalId,
        asset_id: AssetId,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock();
        let owner = state.owner(asset_id)?;
        if caller != owner && !state.operator_approvals.contains(&(owner, caller)) {
            return Err(LedgerError::NotApproved {
                asset_id,
                operator: caller,
            });
        }
        state.token_approvals.insert(asset_id, spender);
        tracing::debug!(asset = %asset_id, owner = %owner, spender = %spender, "Token approval set");
        Ok(())
    }

    /// Account approved for one token, if any.
    #[must_use]
    pub fn get_approved(&self, asset_id: AssetId) -> Option<PrincipalId> {
        self.state.lock().token_approvals.get(&asset_id).copied()
    }

    /// Grant or revoke `operator` control over all of `owner`'s tokens.
    pub fn set_approval_for_all(&self, owner: PrincipalId, operator: PrincipalId, approved: bool) {
        let mut state = self.state.lock();
        if approved {
            state.operator_approvals.insert((owner, operator));
        } else {
            state.operator_approvals.remove(&(owner, operator));
        }
    }

    #[must_use]
    pub fn is_approved_for_all(&self, owner: PrincipalId, operator: PrincipalId) -> bool {
        self.state.lock().operator_approvals.contains(&(owner, operator))
    }

    /// Token ids held by `owner`, ascending.
    #[must_use]
    pub fn assets_of(&self, owner: PrincipalId) -> Vec<AssetId> {
        let state = self.state.lock();
        let mut ids: Vec<AssetId> = state
            .owners
            .iter()
            .filter(|(_, o)| **o == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of tokens ever minted.
    #[must_use]
    pub fn total_minted(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Suspend all transfers (approvals and queries keep working).
    pub fn pause(&self) {
        self.state.lock().paused = true;
        tracing::warn!(registry = %self.symbol, "Registry transfers paused");
    }

    pub fn unpause(&self) {
        self.state.lock().paused = false;
        tracing::info!(registry = %self.symbol, "Registry transfers resumed");
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

impl AssetLedger for VehicleRegistry {
    fn ledger_id(&self) -> LedgerId {
        self.id
    }

    fn owner_of(&self, asset_id: AssetId) -> LedgerResult<PrincipalId> {
        self.state.lock().owner(asset_id)
    }

    fn transfer(
        &self,
        operator: PrincipalId,
        asset_id: AssetId,
        from: PrincipalId,
        to: PrincipalId,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock();
        if state.paused {
            return Err(LedgerError::Paused(self.id));
        }

        let owner = state.owner(asset_id)?;
        if owner != from {
            return Err(LedgerError::NotOwner {
                asset_id,
                from,
                owner,
            });
        }
        if !state.is_authorized(operator, owner, asset_id) {
            return Err(LedgerError::NotApproved { asset_id, operator });
        }

        state.token_approvals.remove(&asset_id);
        state.owners.insert(asset_id, to);
        tracing::debug!(asset = %asset_id, from = %from, to = %to, "Vehicle transferred");
        Ok(())
    }
}
