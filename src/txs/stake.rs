// Stake - Delegate staking currency behind a validator, creating it if new
//
// Signed by both the stake address (the capital owner) and the validator
// address. Rotating a validator's stake address is only allowed once the old
// address holds nothing: no effective stake, no bounded funds, no pending
// maturity entries.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::currency::STAKING_CURRENCY;
use crate::types::keys::verify_signers;
use crate::types::{Address, Event, PublicKey, RawTx, SignedTx, TxResponse, TxType};

use super::{basic_fee_handling, decode_payload, Transaction, TxAmount, TxContext, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stake {
    pub validator_address: Address,
    pub stake_address: Address,
    pub validator_pubkey: PublicKey,
    pub validator_ecdsa_pubkey: PublicKey,
    pub node_name: String,
    pub amount: TxAmount,
}

impl Stake {
    fn signers(&self) -> Vec<Address> {
        vec![self.stake_address, self.validator_address]
    }

    fn event(&self, kind: &str) -> Event {
        Event::new(kind)
            .attr("tx.type", TxType::Stake.to_string())
            .attr("tx.validator", self.validator_address.as_ref().to_vec())
            .attr("tx.delegator", self.stake_address.as_ref().to_vec())
            .attr("tx.amount", self.amount.value.to_string())
    }
}

pub struct StakeTx;

impl Transaction for StakeTx {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError> {
        let payload: Stake = decode_payload(&tx.raw.data)?;
        verify_signers(&tx.raw.raw_bytes(), &payload.signers(), &tx.signatures)?;

        let option = ctx.governance.get_fee_option()?;
        ctx.fee_pool.validate_fee(&option, &tx.raw.fee)?;

        if payload.validator_address.is_zero() || payload.stake_address.is_zero() {
            return Err(TxError::MissingData);
        }
        payload.validator_pubkey.verifying_key()?;

        let coin = payload.amount.to_coin(ctx.currencies)?;
        if coin.amount.is_zero() {
            return Err(TxError::InvalidAmount);
        }
        if !coin.is_currency(STAKING_CURRENCY) {
            return Err(TxError::InvalidCurrency(coin.currency.name));
        }
        if !ctx.balances.check_balance(&payload.stake_address, &coin)? {
            return Err(TxError::NotEnoughFund);
        }
        Ok(())
    }

    fn process_check(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing stake transaction for check");
        run_stake(ctx, tx)
    }

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing stake transaction for deliver");
        run_stake(ctx, tx)
    }

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError> {
        basic_fee_handling(ctx, tx, 2)
    }
}

fn run_stake(ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
    let payload: Stake = decode_payload(&tx.data)?;
    let coin = payload.amount.to_coin(ctx.currencies)?;

    let mut update_stake_address = false;
    if ctx.validators.exists(&payload.validator_address) {
        let existing = ctx.validators.get(&payload.validator_address)?;
        if existing.stake_address != payload.stake_address {
            ensure_clean_stake_address(ctx, &existing.stake_address)?;
            update_stake_address = true;
        }
    }

    ctx.balances
        .minus_from_address(&payload.stake_address, &coin)?;
    ctx.delegation.stake(
        &payload.validator_address,
        &payload.stake_address,
        &payload.amount.value,
    )?;
    ctx.validators.handle_stake(
        &crate::types::Stake {
            validator_address: payload.validator_address,
            stake_address: payload.stake_address,
            pubkey: payload.validator_pubkey.clone(),
            ecdsa_pubkey: payload.validator_ecdsa_pubkey.clone(),
            name: payload.node_name.clone(),
            amount: payload.amount.value.clone(),
        },
        update_stake_address,
    )?;

    Ok(TxResponse::with_events(vec![payload.event("apply_stake")]))
}

/// The outgoing stake address must hold nothing anywhere in the delegation
/// ledgers, including entries still waiting to mature
fn ensure_clean_stake_address(ctx: &TxContext, old: &Address) -> Result<(), TxError> {
    let opts = ctx.governance.get_staking_options()?;
    let clean = ctx.delegation.effective_amount(old)?.is_zero()
        && ctx.delegation.bounded_amount(old)?.is_zero()
        && ctx
            .delegation
            .matured_pending(old, ctx.height, opts.maturity_time + 1)?
            .is_zero();
    if !clean {
        return Err(TxError::StakeAddressInUse);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Amount;

    #[test]
    fn payload_roundtrips_through_json() {
        let payload = Stake {
            validator_address: Address::from_bytes([1u8; 20]),
            stake_address: Address::from_bytes([2u8; 20]),
            validator_pubkey: PublicKey::ed25519([3u8; 32]),
            validator_ecdsa_pubkey: PublicKey::ecdsa(vec![4u8; 33]),
            node_name: "node-1".into(),
            amount: TxAmount::new(STAKING_CURRENCY, Amount::from_u64(7).mul_pow10(18)),
        };
        let raw = serde_json::to_vec(&payload).unwrap();
        let back: Stake = decode_payload(&raw).unwrap();
        assert_eq!(back.validator_address, payload.validator_address);
        assert_eq!(back.amount, payload.amount);
    }
}
