// Purge - Administrative removal of a validator's entire stake
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::keys::verify_signers;
use crate::types::{Address, Event, RawTx, SignedTx, TxResponse, TxType};

use super::{basic_fee_handling, decode_payload, Transaction, TxContext, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purge {
    pub admin_address: Address,
    pub validator_address: Address,
}

impl Purge {
    fn signers(&self) -> Vec<Address> {
        vec![self.admin_address]
    }

    fn event(&self, kind: &str) -> Event {
        Event::new(kind)
            .attr("tx.type", TxType::Purge.to_string())
            .attr("tx.owner", self.admin_address.as_ref().to_vec())
    }
}

pub struct PurgeTx;

impl Transaction for PurgeTx {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError> {
        let payload: Purge = decode_payload(&tx.raw.data)?;
        verify_signers(&tx.raw.raw_bytes(), &payload.signers(), &tx.signatures)?;

        let option = ctx.governance.get_fee_option()?;
        ctx.fee_pool.validate_fee(&option, &tx.raw.fee)?;

        if payload.admin_address.is_zero() || payload.validator_address.is_zero() {
            return Err(TxError::MissingData);
        }
        Ok(())
    }

    fn process_check(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing purge transaction for check");
        run_purge(ctx, tx)
    }

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
        debug!("processing purge transaction for deliver");
        run_purge(ctx, tx)
    }

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError> {
        basic_fee_handling(ctx, tx, 1)
    }
}

fn run_purge(ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError> {
    let payload: Purge = decode_payload(&tx.data)?;

    let validator = ctx.validators.get(&payload.validator_address)?;
    ctx.validators.handle_unstake(&crate::types::Unstake {
        address: validator.address,
        amount: validator.staked.clone(),
    })?;

    Ok(TxResponse::with_events(vec![payload.event("purge")]))
}
