//! Service configuration
//!
//! Built once in `main` and handed to the components that need it.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `DATABASE_URL` | unset | Postgres URL; unset runs on the in-memory store |
//! | `DB_MAX_CONNECTIONS` | 10 | Pool size |
//! | `PORT` | 8083 | HTTP port |
//! | `NATS_URL` | unset | Event sink |
//! | `TAX_RATE` | 0.19 | VAT fraction |
//! | `FREE_SHIPPING_THRESHOLD` | 50.00 | Subtotal from which shipping is free |
//! | `SHIPPING_FLAT_FEE` | 4.99 | Shipping below the threshold |
//! | `TOKEN_VALUE_EUR` | 1.00 | Redemption value of one token |
//! | `LOYALTY_PURCHASE_THRESHOLD` | 100.00 | Spend per earned token |

use rust_decimal::Decimal;
use std::str::FromStr;
use crate::domain::aggregates::LoyaltyPolicy;
use crate::domain::pricing::PricingParams;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    pub pricing: PricingParams,
    pub loyalty: LoyaltyPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self { database_url: None, db_max_connections: 10, port: 8083, nats_url: None, pricing: PricingParams::default(), loyalty: LoyaltyPolicy::default() }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError { pub key: &'static str, pub value: String }

impl Config {
    /// Read from the process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let parsed = |key: &'static str| -> Result<Option<Decimal>, ConfigError> { parse(&lookup, key) };
        let money = |key: &'static str, default: Money| -> Result<Money, ConfigError> {
            Ok(parsed(key)?.map(Money::new).unwrap_or(default))
        };
        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS")?.unwrap_or(defaults.db_max_connections),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            pricing: PricingParams {
                tax_rate: parsed("TAX_RATE")?.unwrap_or(defaults.pricing.tax_rate),
                free_shipping_threshold: money("FREE_SHIPPING_THRESHOLD", defaults.pricing.free_shipping_threshold)?,
                shipping_flat_fee: money("SHIPPING_FLAT_FEE", defaults.pricing.shipping_flat_fee)?,
            },
            loyalty: LoyaltyPolicy {
                token_value: money("TOKEN_VALUE_EUR", defaults.loyalty.token_value)?,
                purchase_threshold: money("LOYALTY_PURCHASE_THRESHOLD", defaults.loyalty.purchase_threshold)?,
            },
        };
        if config.pricing.tax_rate < Decimal::ZERO || config.pricing.tax_rate >= Decimal::ONE {
            return Err(ConfigError { key: "TAX_RATE", value: config.pricing.tax_rate.to_string() });
        }
        if config.loyalty.purchase_threshold.amount() <= Decimal::ZERO {
            return Err(ConfigError { key: "LOYALTY_PURCHASE_THRESHOLD", value: config.loyalty.purchase_threshold.amount().to_string() });
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value.trim().parse().map(Some).map_err(|_| ConfigError { key, value }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.database_url.is_none());
        assert_eq!(config.pricing, PricingParams::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[("PORT", "9000"), ("TAX_RATE", "0.07"), ("SHIPPING_FLAT_FEE", "3.50")]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.pricing.tax_rate, dec!(0.07));
        assert_eq!(config.pricing.shipping_flat_fee.amount(), dec!(3.50));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.key, "PORT");
        assert!(config_from(&[("TAX_RATE", "1.5")]).is_err());
    }
}
