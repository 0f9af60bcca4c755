// Meridian Core - Validator lifecycle and byzantine accountability engine
// Deterministic per-block state transition driven by an external consensus layer

pub mod app;
pub mod balance;
pub mod delegation;
pub mod evidence;
pub mod fees;
pub mod governance;
pub mod storage;
pub mod txs;
pub mod types;
pub mod validator;

#[cfg(test)]
mod tests;
