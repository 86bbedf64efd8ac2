use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::CommissionConfig;
use crate::domain::restaurant::Restaurant;
use crate::ports::{CommissionResolver, StoreError};

/// Subscription-tier commission table from `[commission]` config.
///
/// A restaurant's own override always wins; unknown tiers pay the default.
#[derive(Clone, Debug)]
pub struct TieredCommissionResolver {
    config: CommissionConfig,
}

impl TieredCommissionResolver {
    pub fn new(config: CommissionConfig) -> Self {
        Self { config }
    }

    pub fn default_rate_pct(&self) -> Decimal {
        self.config.default_rate_pct
    }

    pub fn rate_for(&self, restaurant: &Restaurant) -> Decimal {
        restaurant
            .commission_override_pct
            .unwrap_or_else(|| self.config.rate_for_tier(&restaurant.subscription_tier))
    }
}

#[async_trait]
impl CommissionResolver for TieredCommissionResolver {
    async fn resolve_rate_pct(&self, restaurant: &Restaurant) -> Result<Decimal, StoreError> {
        Ok(self.rate_for(restaurant))
    }
}
