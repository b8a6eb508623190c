//! Merchant subscriptions and the shops they keep open.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::CommerceError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier { #[default] Free, Premium }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus { #[default] Active, Cancelled, Suspended, Expired }

impl FromStr for Tier {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(CommerceError::Storage(format!("unknown subscription tier '{other}'"))),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "suspended" => Ok(Self::Suspended),
            "expired" => Ok(Self::Expired),
            other => Err(CommerceError::Storage(format!("unknown subscription status '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription { pub merchant_id: Uuid, pub tier: Tier, pub status: SubscriptionStatus }

impl Subscription {
    /// Commission as a fraction of the order total. Depends on tier only.
    pub fn commission_rate(&self) -> Decimal {
        match self.tier { Tier::Free => dec!(0.073), Tier::Premium => dec!(0.031) }
    }

    pub fn monthly_fee(&self) -> Money {
        match self.tier { Tier::Free => Money::ZERO, Tier::Premium => Money::new(dec!(299.00)) }
    }

    pub fn is_premium(&self) -> bool { self.tier == Tier::Premium && self.is_operational() }
    pub fn is_operational(&self) -> bool { self.status == SubscriptionStatus::Active }

    pub fn commission_on(&self, total: Money) -> Money { (total * self.commission_rate()).round_cents() }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shop { pub id: Uuid, pub merchant_id: Uuid, pub name: String, pub is_active: bool, pub subscription: Subscription }

impl Shop {
    /// Ready to take orders.
    pub fn is_operational(&self) -> bool { self.is_active && self.subscription.is_operational() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(tier: Tier, status: SubscriptionStatus) -> Subscription { Subscription { merchant_id: Uuid::now_v7(), tier, status } }

    #[test]
    fn test_commission_by_tier() {
        assert_eq!(sub(Tier::Free, SubscriptionStatus::Active).commission_rate(), dec!(0.073));
        assert_eq!(sub(Tier::Premium, SubscriptionStatus::Suspended).commission_rate(), dec!(0.031));
    }

    #[test]
    fn test_monthly_fee() {
        assert!(sub(Tier::Free, SubscriptionStatus::Active).monthly_fee().is_zero());
        assert_eq!(sub(Tier::Premium, SubscriptionStatus::Active).monthly_fee().amount(), dec!(299));
    }

    #[test]
    fn test_operational_requires_active_status() {
        assert!(sub(Tier::Free, SubscriptionStatus::Active).is_operational());
        assert!(!sub(Tier::Premium, SubscriptionStatus::Expired).is_operational());
        assert!(!sub(Tier::Premium, SubscriptionStatus::Expired).is_premium());
    }

    #[test]
    fn test_commission_on_total() {
        assert_eq!(sub(Tier::Free, SubscriptionStatus::Active).commission_on(Money::new(dec!(59.50))).amount(), dec!(4.34));
    }

    #[test]
    fn test_inactive_shop_is_not_operational() {
        let shop = Shop { id: Uuid::now_v7(), merchant_id: Uuid::now_v7(), name: "Bäckerei".into(), is_active: false, subscription: Subscription::default() };
        assert!(!shop.is_operational());
    }
}
