/// Rebate Calculator - fixed-percentage cashback on the on-chain fee
///
/// Reward: floor(gasUsed * effectiveGasPrice * percent / 100) in the reward
/// token's smallest unit. 25% unless configured otherwise.

use alloy_primitives::U256;

/// Default cashback percentage of the transaction fee.
pub const DEFAULT_CASHBACK_PERCENT: u64 = 25;

pub struct RebateCalculator {
    percent: U256,
}

impl RebateCalculator {
    pub fn new(percent: Option<u64>) -> Self {
        let percent = match percent {
            Some(p) if p > 0 && p <= 100 => p,
            _ => DEFAULT_CASHBACK_PERCENT,
        };

        tracing::info!("RebateCalculator: cashback={}%", percent);

        Self {
            percent: U256::from(percent),
        }
    }

    /// Fee paid on-chain for a mined transaction.
    pub fn fee(gas_used: U256, effective_gas_price: U256) -> U256 {
        gas_used * effective_gas_price
    }

    /// Reward for a given fee, floored by integer division.
    pub fn reward_for_fee(&self, fee: U256) -> U256 {
        fee * self.percent / U256::from(100)
    }

    pub fn percent(&self) -> U256 {
        self.percent
    }
}

impl Default for RebateCalculator {
    fn default() -> Self {
        Self::new(None)
    }
}
