// Withdraw - Move matured (bounded) funds back to the spendable balance
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::currency::STAKING_CURRENCY;
use crate::types::keys::verify_signers;
use crate::types::{Address, Event, RawTx, SignedTx, TxResponse, TxType};

use super::{basic_fee_handling, decode_payload, Transaction, TxAmount, TxContext, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdraw {
    pub validator_address: Address,
    pub stake_address: Address,
    pub amount: TxAmount,
}

impl Withdraw {
    fn signers(&self) -> Vec<Address> {
        vec![self.stake_address, self.validator_address]
    }

    fn event(&self, kind: &str) -> Event {
        Event::new(kind)
            .attr("tx.type", TxType::Withdraw.to_string())
            .attr("tx.validator", self.validator_address.as_ref().to_vec())
            .attr("tx.delegator", self.stake_address.as_ref().to_vec())
            .attr("tx.amount", self.amount.value.to_string())
    }
}

pub struct WithdrawTx;

impl Transaction for WithdrawTx {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError> {
        let payload: Withdraw = decode_payload(&tx.raw.data)?;
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
        debug!("processing withdraw transaction for check");
        run_withdraw(ctx, tx)
    }

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing withdraw transaction for deliver");
        run_withdraw(ctx, tx)
    }

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError> {
        basic_fee_handling(ctx, tx, 2)
    }
}

fn run_withdraw(ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
    let payload: Withdraw = decode_payload(&tx.data)?;
    let coin = payload.amount.to_coin(ctx.currencies)?;

    ctx.delegation
        .withdraw(&payload.stake_address, &payload.amount.value)?;
    ctx.balances.add_to_address(&payload.stake_address, &coin)?;

    let mut response = TxResponse::with_events(vec![payload.event("apply_withdraw")]);
    response.info = coin.to_string();
    Ok(response)
}
