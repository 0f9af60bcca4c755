// Byzantine accountability - missed-vote detection and allegation resolution
//
// Threshold comparisons are exact integer cross-multiplications, never
// floating point: every replica must reach the same verdict.
use tracing::{debug, error, info};

use crate::evidence::{AllegationRequest, AllegationStatus, EvidenceStore, SuspicionReason};
use crate::governance::GovernanceStore;
use crate::types::currency::STAKING_CURRENCY;
use crate::types::{Address, Amount, Event, Unstake};

use super::{ValidatorContext, ValidatorError, ValidatorStore};

/// `ceil(active_count * percentage / decimals)`
fn required_votes(active_count: u64, percentage: u64, decimals: u64) -> u64 {
    (active_count * percentage + decimals - 1) / decimals
}

impl ValidatorStore {
    /// Flag validators whose signed-vote count over the trailing window fell
    /// below the required minimum. Reads validator state as of the previous
    /// height only; the current block's mutations must not influence the
    /// decision.
    pub fn check_malicious_validators(
        &mut self,
        evidence: &EvidenceStore,
        governance: &GovernanceStore,
    ) -> Result<(), ValidatorError> {
        self.malicious.clear();
        let opts = governance.get_evidence_options()?;

        if self.last_height <= opts.block_votes_diff {
            debug!(
                height = self.last_height,
                window = opts.block_votes_diff,
                "insufficient history for missed-vote check"
            );
            return Ok(());
        }
        let Some(block_time) = self.last_block_time else {
            debug!("last block time not set, skipping missed-vote check");
            return Ok(());
        };

        let cv = evidence.get_cumulative_vote()?;
        for lvh in evidence.iterate_suspicious_validators()? {
            self.malicious.insert(lvh.address, lvh);
        }

        for (addr, votes) in &cv.addresses {
            if *votes >= opts.min_votes_required {
                continue;
            }
            if self.malicious.contains_key(addr) {
                continue;
            }
            let Some(validator) = self.get_at(self.last_height - 1, addr) else {
                error!(address = %addr, "previous state data not found");
                continue;
            };
            let Some(status) = evidence.get_validator_status(&validator.address)? else {
                continue;
            };
            // a validator younger than the window cannot be blamed for
            // blocks that predate it
            if !status.is_active || status.height + opts.block_votes_diff > self.last_height {
                continue;
            }
            info!(address = %addr, votes, "validator missed required votes");
            let lvh = evidence.create_suspicious_validator(
                *addr,
                SuspicionReason::MissedRequiredVotes,
                self.last_height,
                block_time,
            )?;
            self.malicious.insert(*addr, lvh);
        }
        Ok(())
    }

    /// Resolve every open allegation whose vote tally crossed a threshold.
    /// Guilty verdicts debit the penalty now, credit the bounty best-effort,
    /// and schedule the power-reducing unstake for the next block.
    pub fn execute_allegation_tracker(
        &mut self,
        ctx: &ValidatorContext,
        active_count: u64,
    ) -> Result<(), ValidatorError> {
        let Some(block_time) = self.last_block_time else {
            return Err(ValidatorError::NoBlockTime);
        };
        if active_count == 0 {
            return Err(ValidatorError::ZeroActiveCount);
        }

        let currency = ctx
            .currencies
            .get(STAKING_CURRENCY)
            .ok_or(ValidatorError::StakeTokenNotRegistered)?;
        let opts = ctx.governance.get_evidence_options()?;
        let bounty_addr = ctx.governance.get_proposal_options()?.bounty_program_addr;
        let required = required_votes(
            active_count,
            opts.validator_vote_percentage,
            opts.validator_vote_decimals,
        );

        ctx.evidence.clean_tracker()?;
        let mut tracker = ctx.evidence.get_allegation_tracker()?;
        let mut resolved: Vec<String> = Vec::new();

        for id in &tracker.requests {
            let mut ar = match ctx.evidence.get_allegation_request(id) {
                Ok(ar) => ar,
                Err(_) => continue,
            };
            let (yes, no) = ar.tally();
            debug!(%id, yes, no, required, "tallying allegation request");

            // yes/required > pct/dec, compared without division
            let guilty = yes * opts.allegation_decimals > opts.allegation_percentage * required;
            // no/required > 1 - pct/dec
            let innocent = no * opts.allegation_decimals
                > (opts.allegation_decimals - opts.allegation_percentage) * required;

            if guilty {
                ar.status = AllegationStatus::Guilty;
                ctx.evidence.create_suspicious_validator(
                    ar.malicious,
                    SuspicionReason::ByzantineFault,
                    self.last_height,
                    block_time,
                )?;

                let Some(validator) = self.get_at(self.last_height - 1, &ar.malicious) else {
                    error!(address = %ar.malicious, "previous state data not found");
                    continue;
                };
                let staked = ctx.delegation.validator_total(&validator.address)?;
                let penalty = staked.mul_div_round_half_up(
                    opts.penalty_base_percentage,
                    opts.penalty_base_decimals,
                );
                let bounty = penalty.mul_pow10(currency.decimals).mul_div(
                    opts.penalty_bounty_percentage,
                    opts.penalty_bounty_decimals,
                );

                match ctx
                    .delegation
                    .penalize(&validator.address, &validator.stake_address, &penalty)
                {
                    Ok(()) => {
                        let coin = currency.coin_from_amount(bounty);
                        // the debit stands even if the credit fails
                        if let Err(e) = ctx.balances.add_to_address(&bounty_addr, &coin) {
                            error!(address = %bounty_addr, "failed to credit bounty: {e}");
                        }
                    }
                    Err(e) => {
                        info!(address = %validator.address, "nothing to withdraw for penalty: {e}");
                    }
                }

                self.delay_handle_unstake(validator.address, penalty)?;
                self.create_allegation_event(&ar);
                ctx.evidence.delete_allegation_request(id);
                resolved.push(id.clone());
            } else if innocent {
                ar.status = AllegationStatus::Innocent;
                self.create_allegation_event(&ar);
                ctx.evidence.delete_allegation_request(id);
                resolved.push(id.clone());
            }
            // otherwise the request stays open until a side crosses
        }

        if !resolved.is_empty() {
            for id in &resolved {
                tracker.requests.remove(id);
            }
            ctx.evidence.set_allegation_tracker(&tracker)?;
        }
        Ok(())
    }

    /// Schedule a penalty-derived unstake for application next block
    fn delay_handle_unstake(
        &self,
        address: Address,
        amount: Amount,
    ) -> Result<(), ValidatorError> {
        self.set_delay_unstake(&Unstake { address, amount })
    }

    fn create_allegation_event(&mut self, ar: &AllegationRequest) {
        let event = Event::new("allegation_tracker")
            .attr("block.reporter", ar.reporter.as_ref().to_vec())
            .attr("block.malicious", ar.malicious.as_ref().to_vec())
            .attr("block.status", ar.status.to_string());
        self.push_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_votes_rounds_up() {
        assert_eq!(required_votes(4, 50, 100), 2);
        assert_eq!(required_votes(5, 50, 100), 3);
        assert_eq!(required_votes(1, 100, 100), 1);
        assert_eq!(required_votes(3, 67, 100), 3);
    }

    #[test]
    fn threshold_comparison_matches_ratio_semantics() {
        // activeCount=4, 50/100: one yes of required 2 is exactly the
        // threshold and must not convict; two yes votes must
        let required = required_votes(4, 50, 100);
        assert!(1 * 100 <= 50 * required);
        assert!(2 * 100 > 50 * required);
    }
}
