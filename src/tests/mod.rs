// Cross-module scenario tests: whole blocks driven through the App exactly
// the way a consensus engine would drive them.
mod accountability;

use ed25519_dalek::{Signer, SigningKey};
use tempfile::TempDir;

use crate::app::App;
use crate::evidence::VoteInfo;
use crate::governance::FeeOption;
use crate::storage::{shared, ChainState, Database};
use crate::types::currency::STAKING_CURRENCY;
use crate::types::{
    Address, Amount, BlockNumber, CurrencySet, Fee, GenesisValidator, Power, PublicKey, RawTx,
    Signature, SignedTx, SignerSignature, TxType,
};
use crate::validator::BeginBlockInfo;

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn pubkey(sk: &SigningKey) -> PublicKey {
    PublicKey::ed25519(sk.verifying_key().to_bytes())
}

fn addr_of(sk: &SigningKey) -> Address {
    pubkey(sk).address()
}

fn new_app() -> (TempDir, App) {
    let dir = TempDir::new().unwrap();
    let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
    let app = App::new(state, CurrencySet::standard());
    (dir, app)
}

/// Fee policy used by the scenarios: anything goes, including a zero price
fn open_fee_option() -> FeeOption {
    let set = CurrencySet::standard();
    let olt = set.get(STAKING_CURRENCY).unwrap();
    FeeOption {
        min_fee: olt.coin_from_amount(Amount::zero()),
    }
}

fn zero_fee() -> Fee {
    let set = CurrencySet::standard();
    let olt = set.get(STAKING_CURRENCY).unwrap();
    Fee {
        price: olt.coin_from_amount(Amount::zero()),
        gas: 1,
    }
}

fn genesis_validator(seed: u8, power: Power) -> (SigningKey, GenesisValidator) {
    let sk = signing_key(seed);
    let pk = pubkey(&sk);
    let gv = GenesisValidator {
        address: pk.address(),
        stake_address: Address::from_bytes([seed.wrapping_add(100); 20]),
        pubkey: pk,
        ecdsa_pubkey: PublicKey::ecdsa(vec![seed; 33]),
        name: format!("node-{seed}"),
        power,
    };
    (sk, gv)
}

fn vote(address: Address, signed: bool) -> VoteInfo {
    VoteInfo {
        address,
        power: 1,
        signed_last_block: signed,
    }
}

fn begin_info(height: BlockNumber, votes: Vec<VoteInfo>) -> BeginBlockInfo {
    let proposer = votes
        .first()
        .map(|v| v.address)
        .unwrap_or(Address::from_bytes([0u8; 20]));
    BeginBlockInfo {
        height,
        time: Some(1_700_000_000 + height),
        proposer,
        last_commit_votes: votes,
        byzantine: Vec::new(),
    }
}

fn signed_tx<T: serde::Serialize>(tx_type: TxType, payload: &T, keys: &[&SigningKey]) -> SignedTx {
    signed_tx_with_fee(tx_type, payload, zero_fee(), keys)
}

fn signed_tx_with_fee<T: serde::Serialize>(
    tx_type: TxType,
    payload: &T,
    fee: Fee,
    keys: &[&SigningKey],
) -> SignedTx {
    let raw = RawTx {
        tx_type,
        data: serde_json::to_vec(payload).unwrap(),
        fee,
    };
    let bytes = raw.raw_bytes();
    let signatures = keys
        .iter()
        .map(|sk| SignerSignature {
            signer: PublicKey::ed25519(sk.verifying_key().to_bytes()),
            signature: Signature(sk.sign(&bytes).to_bytes().to_vec()),
        })
        .collect();
    SignedTx { raw, signatures }
}

/// Run an empty block so the next one sees this height as committed history
fn empty_block(app: &mut App, height: BlockNumber, votes: Vec<VoteInfo>) {
    app.begin_block(&begin_info(height, votes)).unwrap();
    app.end_block(height).unwrap();
    app.commit().unwrap();
}
