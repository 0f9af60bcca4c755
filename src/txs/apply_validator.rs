// ApplyValidator - Legacy validator bootstrap funded by the voting token
//
// Signed by the stake address alone. Deposited VT maps one-to-one onto voting
// power, so the amount is scaled to staking base units before it reaches the
// validator record. The `purge` flag reuses the same payload to take the
// deposit back out through the unstake path.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::currency::{STAKING_DECIMALS, VOTING_CURRENCY};
use crate::types::keys::verify_signers;
use crate::types::{Address, Event, PublicKey, RawTx, SignedTx, TxResponse, TxType};

use super::{basic_fee_handling, decode_payload, Transaction, TxAmount, TxContext, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyValidator {
    pub stake_address: Address,
    pub stake: TxAmount,
    pub node_name: String,
    pub validator_address: Address,
    pub validator_pubkey: PublicKey,
    pub validator_ecdsa_pubkey: PublicKey,
    pub purge: bool,
}

impl ApplyValidator {
    fn signers(&self) -> Vec<Address> {
        vec![self.stake_address]
    }

    fn event(&self, kind: &str) -> Event {
        Event::new(kind)
            .attr("tx.type", TxType::ApplyValidator.to_string())
            .attr("tx.owner", self.stake_address.as_ref().to_vec())
    }
}

pub struct ApplyValidatorTx;

impl Transaction for ApplyValidatorTx {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError> {
        let payload: ApplyValidator = decode_payload(&tx.raw.data)?;
        verify_signers(&tx.raw.raw_bytes(), &payload.signers(), &tx.signatures)?;

        let option = ctx.governance.get_fee_option()?;
        ctx.fee_pool.validate_fee(&option, &tx.raw.fee)?;

        if payload.stake_address.is_zero() || payload.validator_address.is_zero() {
            return Err(TxError::MissingData);
        }
        payload.validator_pubkey.verifying_key()?;

        let coin = payload.stake.to_coin(ctx.currencies)?;
        if !coin.is_currency(VOTING_CURRENCY) {
            return Err(TxError::InvalidCurrency(coin.currency.name));
        }
        Ok(())
    }

    fn process_check(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing apply-validator transaction for check");
        run_apply(ctx, tx)
    }

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing apply-validator transaction for deliver");
        run_apply(ctx, tx)
    }

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError> {
        basic_fee_handling(ctx, tx, 1)
    }
}

fn run_apply(ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
    let payload: ApplyValidator = decode_payload(&tx.data)?;
    let coin = payload.stake.to_coin(ctx.currencies)?;

    if !ctx.balances.check_balance(&payload.stake_address, &coin)? {
        return Err(TxError::NotEnoughFund);
    }
    ctx.balances
        .minus_from_address(&payload.stake_address, &coin)?;

    // one VT is one unit of power on the staking scale
    let scaled = payload.stake.value.mul_pow10(STAKING_DECIMALS);
    if !payload.purge {
        ctx.validators.handle_stake(
            &crate::types::Stake {
                validator_address: payload.validator_address,
                stake_address: payload.stake_address,
                pubkey: payload.validator_pubkey.clone(),
                ecdsa_pubkey: payload.validator_ecdsa_pubkey.clone(),
                name: payload.node_name.clone(),
                amount: scaled,
            },
            false,
        )?;
    } else {
        ctx.validators.handle_unstake(&crate::types::Unstake {
            address: payload.validator_address,
            amount: scaled,
        })?;
    }

    Ok(TxResponse::with_events(vec![
        payload.event("apply_validator")
    ]))
}
