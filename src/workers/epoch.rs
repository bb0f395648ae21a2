/// Reward epoch builder.
///
/// Sweeps mined transactions that no epoch has claimed yet, aggregates each
/// owner's cashback, builds the Merkle tree over the per-user totals and
/// persists everything in one database transaction. Leaf order is the order
/// in which each user first appears in the (transaction_pk ASC) sweep, so a
/// given set of input rows always yields the same root.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use uuid::Uuid;

use crate::metrics::prometheus as metrics;
use crate::rewards::{hash_leaf, MerkleTree, RebateCalculator};
use crate::store::{LedgerStore, NewClaim, RewardableTx};

/// Per-user aggregate feeding one Merkle leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReward {
    pub user_id: i64,
    pub account: Address,
    pub amount: U256,
}

#[derive(Debug, Clone)]
pub struct EpochOutcome {
    pub epoch_id: String,
    pub merkle_root: String,
    pub claim_count: usize,
    pub tx_count: usize,
}

pub struct EpochCalculator {
    store: LedgerStore,
    rebate: RebateCalculator,
    reward_token: String,
    staking_token: String,
    run_interval: Duration,
}

impl EpochCalculator {
    pub fn new(
        store: LedgerStore,
        rebate: RebateCalculator,
        reward_token: String,
        staking_token: String,
        run_interval: Duration,
    ) -> Self {
        Self {
            store,
            rebate,
            reward_token,
            staking_token,
            run_interval,
        }
    }

    /// Build epochs until the shutdown signal fires. Intended to be spawned
    /// as a background task; the atomic epoch write means stopping between
    /// ticks never strands a partial epoch.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Epoch calculator started (interval={}s, cashback={}%)",
            self.run_interval.as_secs(),
            self.rebate.percent()
        );
        loop {
            tokio::select! {
                _ = sleep(self.run_interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Epoch calculator stopped");
                    return;
                }
            }
            match self.run_once().await {
                Ok(Some(outcome)) => tracing::info!(
                    "Epoch {} built: root={}, {} claim(s) over {} transaction(s)",
                    outcome.epoch_id,
                    outcome.merkle_root,
                    outcome.claim_count,
                    outcome.tx_count
                ),
                Ok(None) => tracing::debug!("No rewardable transactions, skipping epoch"),
                Err(e) => tracing::error!("Epoch build failed: {}", e),
            }
        }
    }

    /// One epoch attempt. `None` when there is nothing to pay out or the
    /// reward token is unconfigured.
    pub async fn run_once(&mut self) -> Result<Option<EpochOutcome>> {
        if self.reward_token.is_empty() {
            tracing::warn!("Reward token not configured, skipping epoch build");
            return Ok(None);
        }

        let rows = self.store.unrewarded_mined(&self.staking_token).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let (rewards, tx_pks) = aggregate_rewards(&rows, &self.rebate);
        if rewards.is_empty() {
            return Ok(None);
        }

        let leaves: Vec<_> = rewards
            .iter()
            .enumerate()
            .map(|(i, r)| hash_leaf(i as u64, r.account, r.amount))
            .collect();
        let tree = MerkleTree::new(leaves)?;

        let claims: Vec<NewClaim> = rewards
            .iter()
            .enumerate()
            .map(|(i, r)| NewClaim {
                user_id: r.user_id,
                amount_raw: r.amount.to_string(),
                leaf_index: i as i64,
                proof: tree.proof_hex(i),
            })
            .collect();

        let epoch_id = format!("epoch-{}", Uuid::new_v4());
        let merkle_root = tree.root_hex();
        self.store
            .write_epoch(&epoch_id, &merkle_root, &self.reward_token, &claims, &tx_pks)
            .await?;

        metrics::inc_epochs_built();
        metrics::inc_claims_written_by(claims.len() as u64);

        Ok(Some(EpochOutcome {
            epoch_id,
            merkle_root,
            claim_count: claims.len(),
            tx_count: tx_pks.len(),
        }))
    }
}

/// Fold rewardable transactions into per-user totals, preserving first-seen
/// user order. Rows with missing or malformed gas accounting or an unparsable
/// wallet are skipped with a warning and stay eligible for a later epoch.
pub fn aggregate_rewards(
    rows: &[RewardableTx],
    rebate: &RebateCalculator,
) -> (Vec<UserReward>, Vec<i64>) {
    let mut order: Vec<i64> = Vec::new();
    let mut by_user: HashMap<i64, UserReward> = HashMap::new();
    let mut tx_pks: Vec<i64> = Vec::new();

    for row in rows {
        let (gas_used, effective_gas_price) = match parse_gas(row) {
            Some(pair) => pair,
            None => {
                tracing::warn!(
                    "Skipping {}: missing or malformed gas accounting",
                    row.tx_hash
                );
                continue;
            }
        };
        let account = match Address::from_str(&row.wallet_address) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(
                    "Skipping {}: bad wallet address {}: {}",
                    row.tx_hash,
                    row.wallet_address,
                    e
                );
                continue;
            }
        };

        let fee = RebateCalculator::fee(gas_used, effective_gas_price);
        let reward = rebate.reward_for_fee(fee);

        match by_user.get_mut(&row.user_id) {
            Some(entry) => entry.amount += reward,
            None => {
                order.push(row.user_id);
                by_user.insert(
                    row.user_id,
                    UserReward {
                        user_id: row.user_id,
                        account,
                        amount: reward,
                    },
                );
            }
        }
        tx_pks.push(row.pk);
    }

    let rewards = order
        .iter()
        .map(|id| by_user[id].clone())
        .collect();
    (rewards, tx_pks)
}

fn parse_gas(row: &RewardableTx) -> Option<(U256, U256)> {
    let gas_used = U256::from_str_radix(row.gas_used.as_deref()?, 10).ok()?;
    let price = U256::from_str_radix(row.effective_gas_price.as_deref()?, 10).ok()?;
    Some((gas_used, price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::merkle;

    fn row(pk: i64, user_id: i64, wallet: &str, gas_used: &str, price: &str) -> RewardableTx {
        RewardableTx {
            pk,
            tx_hash: format!("0xtx{}", pk),
            user_id,
            wallet_address: wallet.to_string(),
            gas_used: Some(gas_used.to_string()),
            effective_gas_price: Some(price.to_string()),
            total_staked_raw: "0".to_string(),
        }
    }

    const WALLET_A: &str = "0x1111111111111111111111111111111111111111";
    const WALLET_B: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn test_single_user_fees_aggregate_into_one_leaf() {
        // fees 1000 and 2000 at 25% -> one claim of 750
        let rows = vec![
            row(1, 7, WALLET_A, "100", "10"),
            row(2, 7, WALLET_A, "200", "10"),
        ];
        let rebate = RebateCalculator::new(Some(25));
        let (rewards, tx_pks) = aggregate_rewards(&rows, &rebate);

        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].user_id, 7);
        assert_eq!(rewards[0].amount, U256::from(750u64));
        assert_eq!(tx_pks, vec![1, 2]);
    }

    #[test]
    fn test_two_users_two_leaves_with_sibling_proofs() {
        let rows = vec![
            row(1, 1, WALLET_A, "40", "10"),  // fee 400 -> reward 100
            row(2, 2, WALLET_B, "80", "10"),  // fee 800 -> reward 200
        ];
        let rebate = RebateCalculator::new(Some(25));
        let (rewards, _) = aggregate_rewards(&rows, &rebate);
        assert_eq!(rewards.len(), 2);
        assert_eq!(rewards[0].amount, U256::from(100u64));
        assert_eq!(rewards[1].amount, U256::from(200u64));

        let leaves: Vec<_> = rewards
            .iter()
            .enumerate()
            .map(|(i, r)| hash_leaf(i as u64, r.account, r.amount))
            .collect();
        let tree = MerkleTree::new(leaves.clone()).unwrap();

        let proof0 = tree.proof(0);
        let proof1 = tree.proof(1);
        assert_eq!(proof0, vec![leaves[1]]);
        assert_eq!(proof1, vec![leaves[0]]);
        assert!(MerkleTree::verify(leaves[0], &proof0, tree.root()));
        assert!(MerkleTree::verify(leaves[1], &proof1, tree.root()));
    }

    #[test]
    fn test_single_leaf_epoch_root_is_leaf() {
        let rows = vec![row(1, 7, WALLET_A, "100", "10")];
        let rebate = RebateCalculator::new(Some(25));
        let (rewards, _) = aggregate_rewards(&rows, &rebate);

        let leaf = hash_leaf(0, rewards[0].account, rewards[0].amount);
        let tree = MerkleTree::new(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert!(tree.proof(0).is_empty());
        assert_eq!(tree.root_hex(), merkle::to_hex(&leaf));
    }

    #[test]
    fn test_reward_floors_per_transaction() {
        // fee 3 at 25% floors to 0; the user still gets a zero-amount leaf
        // rather than silently changing the leaf set.
        let rows = vec![row(1, 7, WALLET_A, "3", "1")];
        let rebate = RebateCalculator::new(Some(25));
        let (rewards, tx_pks) = aggregate_rewards(&rows, &rebate);
        assert_eq!(rewards[0].amount, U256::ZERO);
        assert_eq!(tx_pks, vec![1]);
    }

    #[test]
    fn test_rows_without_gas_accounting_are_skipped() {
        let mut bad = row(1, 7, WALLET_A, "100", "10");
        bad.gas_used = None;
        let rows = vec![bad, row(2, 8, WALLET_B, "100", "10")];

        let rebate = RebateCalculator::new(Some(25));
        let (rewards, tx_pks) = aggregate_rewards(&rows, &rebate);
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].user_id, 8);
        assert_eq!(tx_pks, vec![2]);
    }

    #[test]
    fn test_leaf_order_follows_first_appearance() {
        let rows = vec![
            row(1, 9, WALLET_B, "10", "10"),
            row(2, 4, WALLET_A, "10", "10"),
            row(3, 9, WALLET_B, "10", "10"),
        ];
        let rebate = RebateCalculator::new(Some(25));
        let (rewards, _) = aggregate_rewards(&rows, &rebate);
        assert_eq!(rewards[0].user_id, 9);
        assert_eq!(rewards[1].user_id, 4);
        assert_eq!(rewards[0].amount, U256::from(50u64));
    }
}
