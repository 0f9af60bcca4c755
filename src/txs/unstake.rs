// Unstake - Withdraw stake from a validator, subject to the maturity delay
//
// Voting power drops in the same block; the funds only become withdrawable
// once the maturity window has passed and the end-of-block release moves them
// to the delegator's bounded ledger.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::currency::STAKING_CURRENCY;
use crate::types::keys::verify_signers;
use crate::types::{Address, Event, RawTx, SignedTx, TxResponse, TxType};

use super::{basic_fee_handling, decode_payload, Transaction, TxAmount, TxContext, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unstake {
    pub validator_address: Address,
    pub stake_address: Address,
    pub amount: TxAmount,
}

impl Unstake {
    fn signers(&self) -> Vec<Address> {
        vec![self.stake_address, self.validator_address]
    }

    fn event(&self, kind: &str) -> Event {
        Event::new(kind)
            .attr("tx.type", TxType::Unstake.to_string())
            .attr("tx.validator", self.validator_address.as_ref().to_vec())
            .attr("tx.delegator", self.stake_address.as_ref().to_vec())
            .attr("tx.amount", self.amount.value.to_string())
    }
}

pub struct UnstakeTx;

impl Transaction for UnstakeTx {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError> {
        let payload: Unstake = decode_payload(&tx.raw.data)?;
        verify_signers(&tx.raw.raw_bytes(), &payload.signers(), &tx.signatures)?;

        let option = ctx.governance.get_fee_option()?;
        ctx.fee_pool.validate_fee(&option, &tx.raw.fee)?;

        if payload.validator_address.is_zero() || payload.stake_address.is_zero() {
            return Err(TxError::MissingData);
        }
        let coin = payload.amount.to_coin(ctx.currencies)?;
        if coin.amount.is_zero() {
            return Err(TxError::InvalidAmount);
        }
        if !coin.is_currency(STAKING_CURRENCY) {
            return Err(TxError::InvalidCurrency(coin.currency.name));
        }
        Ok(())
    }

    fn process_check(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing unstake transaction for check");
        run_unstake(ctx, tx)
    }

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing unstake transaction for deliver");
        run_unstake(ctx, tx)
    }

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError> {
        basic_fee_handling(ctx, tx, 2)
    }
}

fn run_unstake(ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
    let payload: Unstake = decode_payload(&tx.data)?;

    let opts = ctx.governance.get_staking_options()?;
    ctx.delegation.unstake(
        &payload.validator_address,
        &payload.stake_address,
        &payload.amount.value,
        ctx.height + opts.maturity_time,
    )?;
    ctx.validators.handle_unstake(&crate::types::Unstake {
        address: payload.validator_address,
        amount: payload.amount.value.clone(),
    })?;

    Ok(TxResponse::with_events(vec![payload.event("unstake")]))
}
