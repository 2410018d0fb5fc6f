//! Objective-function library: maps a time-series power profile to a scalar
//! cost in dollars.
//!
//! Each function is declared on a resource node as an [`ObjectiveConfig`]
//! binding and resolved once per pass against the [`TariffContext`] into a
//! ready-to-evaluate [`ObjectiveFunction`]. Evaluation is pure and repeated
//! many thousands of times per pass.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::error::PassError;

/// Demand-charge threshold used when neither the binding nor the tariff
/// context supplies one (kW).
pub const DEFAULT_DEMAND_CHARGE_THRESHOLD_KW: f32 = 250.0;
/// Demand-charge rate above the threshold ($ per kW).
pub const DEFAULT_DEMAND_CHARGE_RATE: f32 = 10.0;
/// Ramp penalty per kW of change between consecutive points.
pub const DEFAULT_RAMP_COST_PER_KW: f32 = 0.005;
/// Weight applied to squared load-shape tracking error.
pub const DEFAULT_LOAD_SHAPE_PRICE: f32 = 10.0;

/// Default marginal tariff tiers as (threshold kW, rate above threshold).
pub const DEFAULT_ENERGY_TIERS: [(f32, f32); 7] = [
    (400.0, 100.0),
    (250.0, 50.0),
    (200.0, 25.0),
    (150.0, 10.0),
    (100.0, 5.0),
    (50.0, 3.0),
    (0.0, 1.0),
];

/// Per-pass tariff and target-shape context supplied by the caller.
///
/// Series must already be resampled to the schedule horizon; alignment is a
/// collaborator responsibility.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TariffContext {
    /// Demand level above which demand charges accrue (kW).
    pub demand_charge_threshold_kw: Option<f32>,
    /// Energy price series aligned to the horizon ($ per kWh per point).
    pub energy_price: Option<Vec<f32>>,
    /// Target load shape aligned to the horizon (kW).
    pub load_shape_target_kw: Option<Vec<f32>>,
}

/// One tier of a piecewise-linear marginal tariff.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    /// Demand threshold above which this tier's rate applies (kW).
    pub threshold_kw: f32,
    /// Marginal rate for demand in excess of the threshold.
    pub rate: f32,
}

/// Declarative objective-function binding attached to a resource node.
///
/// Parameters omitted here fall back to the tariff context and then to the
/// documented defaults. Unrecognized keys are tolerated: they are collected
/// and logged as a warning when the binding is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectiveConfig {
    /// Linear energy cost: `sum(price[t] * profile[t])`.
    EnergyCost {
        #[serde(default)]
        price: Option<Vec<f32>>,
        #[serde(flatten)]
        extra: BTreeMap<String, toml::Value>,
    },
    /// Linear penalty on peak demand above a threshold.
    DemandCharge {
        #[serde(default)]
        threshold_kw: Option<f32>,
        #[serde(default)]
        rate_per_kw: Option<f32>,
        #[serde(flatten)]
        extra: BTreeMap<String, toml::Value>,
    },
    /// Penalty on the sum of absolute first differences.
    Ramp {
        #[serde(default)]
        cost_per_kw: Option<f32>,
        #[serde(flatten)]
        extra: BTreeMap<String, toml::Value>,
    },
    /// Quadratic penalty against a target load shape.
    LoadShapeTracking {
        #[serde(default)]
        target_kw: Option<Vec<f32>>,
        #[serde(default)]
        price: Option<f32>,
        #[serde(flatten)]
        extra: BTreeMap<String, toml::Value>,
    },
    /// Piecewise-linear marginal tariff evaluated independently per point.
    TieredEnergy {
        #[serde(default)]
        tiers: Option<Vec<TierConfig>>,
        #[serde(flatten)]
        extra: BTreeMap<String, toml::Value>,
    },
}

impl ObjectiveConfig {
    /// Short name used in error messages and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectiveConfig::EnergyCost { .. } => "energy_cost",
            ObjectiveConfig::DemandCharge { .. } => "demand_charge",
            ObjectiveConfig::Ramp { .. } => "ramp",
            ObjectiveConfig::LoadShapeTracking { .. } => "load_shape_tracking",
            ObjectiveConfig::TieredEnergy { .. } => "tiered_energy",
        }
    }

    fn warn_extra(&self, resource_id: &str, extra: &BTreeMap<String, toml::Value>) {
        if !extra.is_empty() {
            let keys: Vec<&str> = extra.keys().map(String::as_str).collect();
            warn!(
                resource = resource_id,
                objective = self.kind_name(),
                ?keys,
                "ignoring unrecognized objective parameter keys"
            );
        }
    }

    /// Resolves this binding against the tariff context for the coming pass.
    ///
    /// # Errors
    ///
    /// Returns a [`PassError`] if a required series is missing or does not
    /// match the schedule horizon.
    pub fn configure(
        &self,
        tariffs: &TariffContext,
        points: usize,
        resource_id: &str,
    ) -> Result<ObjectiveFunction, PassError> {
        match self {
            ObjectiveConfig::EnergyCost { price, extra } => {
                self.warn_extra(resource_id, extra);
                let price = price
                    .clone()
                    .or_else(|| tariffs.energy_price.clone())
                    .ok_or_else(|| PassError::MissingParameter {
                        resource: resource_id.to_string(),
                        objective: "energy_cost",
                        parameter: "price",
                    })?;
                if price.len() != points {
                    return Err(PassError::SeriesLength {
                        resource: resource_id.to_string(),
                        series: "price",
                        expected: points,
                        actual: price.len(),
                    });
                }
                Ok(ObjectiveFunction::EnergyCost { price })
            }
            ObjectiveConfig::DemandCharge {
                threshold_kw,
                rate_per_kw,
                extra,
            } => {
                self.warn_extra(resource_id, extra);
                Ok(ObjectiveFunction::DemandCharge {
                    threshold_kw: threshold_kw
                        .or(tariffs.demand_charge_threshold_kw)
                        .unwrap_or(DEFAULT_DEMAND_CHARGE_THRESHOLD_KW),
                    rate_per_kw: rate_per_kw.unwrap_or(DEFAULT_DEMAND_CHARGE_RATE),
                })
            }
            ObjectiveConfig::Ramp { cost_per_kw, extra } => {
                self.warn_extra(resource_id, extra);
                Ok(ObjectiveFunction::Ramp {
                    cost_per_kw: cost_per_kw.unwrap_or(DEFAULT_RAMP_COST_PER_KW),
                })
            }
            ObjectiveConfig::LoadShapeTracking {
                target_kw,
                price,
                extra,
            } => {
                self.warn_extra(resource_id, extra);
                let target_kw = target_kw
                    .clone()
                    .or_else(|| tariffs.load_shape_target_kw.clone())
                    .ok_or_else(|| PassError::MissingParameter {
                        resource: resource_id.to_string(),
                        objective: "load_shape_tracking",
                        parameter: "target_kw",
                    })?;
                if target_kw.len() != points {
                    return Err(PassError::SeriesLength {
                        resource: resource_id.to_string(),
                        series: "target_kw",
                        expected: points,
                        actual: target_kw.len(),
                    });
                }
                Ok(ObjectiveFunction::LoadShapeTracking {
                    target_kw,
                    price: price.unwrap_or(DEFAULT_LOAD_SHAPE_PRICE),
                })
            }
            ObjectiveConfig::TieredEnergy { tiers, extra } => {
                self.warn_extra(resource_id, extra);
                let tiers = tiers
                    .as_ref()
                    .map(|t| t.iter().map(|tier| (tier.threshold_kw, tier.rate)).collect())
                    .unwrap_or_else(|| DEFAULT_ENERGY_TIERS.to_vec());
                Ok(ObjectiveFunction::TieredEnergy { tiers })
            }
        }
    }
}

/// A configured, ready-to-evaluate cost function.
///
/// Stateless across evaluations within a pass.
#[derive(Debug, Clone)]
pub enum ObjectiveFunction {
    /// `sum(price[t] * profile[t])`
    EnergyCost { price: Vec<f32> },
    /// `rate * max(0, max(profile) - threshold)`
    DemandCharge { threshold_kw: f32, rate_per_kw: f32 },
    /// `cost_per_kw * sum(|profile[t] - profile[t-1]|)`
    Ramp { cost_per_kw: f32 },
    /// `price * sum((profile[t] - target[t])^2)`
    LoadShapeTracking { target_kw: Vec<f32>, price: f32 },
    /// `sum over t, tiers of max(profile[t] - threshold, 0) * rate`
    TieredEnergy { tiers: Vec<(f32, f32)> },
}

impl ObjectiveFunction {
    /// Evaluates the cost of executing `profile`.
    ///
    /// # Panics
    ///
    /// Panics if `profile` does not match the length of a configured series;
    /// evaluating against the wrong horizon is a programming error.
    pub fn evaluate(&self, profile: &[f32]) -> f32 {
        match self {
            ObjectiveFunction::EnergyCost { price } => {
                assert_eq!(profile.len(), price.len(), "profile/price length mismatch");
                profile.iter().zip(price).map(|(p, c)| p * c).sum()
            }
            ObjectiveFunction::DemandCharge {
                threshold_kw,
                rate_per_kw,
            } => {
                let peak = profile.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                rate_per_kw * (peak - threshold_kw).max(0.0)
            }
            ObjectiveFunction::Ramp { cost_per_kw } => {
                cost_per_kw * profile.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>()
            }
            ObjectiveFunction::LoadShapeTracking { target_kw, price } => {
                assert_eq!(
                    profile.len(),
                    target_kw.len(),
                    "profile/target length mismatch"
                );
                price
                    * profile
                        .iter()
                        .zip(target_kw)
                        .map(|(p, t)| (p - t) * (p - t))
                        .sum::<f32>()
            }
            ObjectiveFunction::TieredEnergy { tiers } => profile
                .iter()
                .map(|&p| {
                    tiers
                        .iter()
                        .map(|&(threshold, rate)| (p - threshold).max(0.0) * rate)
                        .sum::<f32>()
                })
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_cost_is_dot_product() {
        let f = ObjectiveFunction::EnergyCost {
            price: vec![0.1, 0.2, 0.3],
        };
        let cost = f.evaluate(&[10.0, 10.0, 10.0]);
        assert!((cost - 6.0).abs() < 1e-5);
    }

    #[test]
    fn energy_cost_generation_earns_credit() {
        let f = ObjectiveFunction::EnergyCost {
            price: vec![1.0, 1.0],
        };
        assert!((f.evaluate(&[-5.0, 3.0]) + 2.0).abs() < 1e-5);
    }

    #[test]
    #[should_panic]
    fn energy_cost_wrong_length_panics() {
        let f = ObjectiveFunction::EnergyCost {
            price: vec![1.0, 1.0],
        };
        f.evaluate(&[1.0, 2.0, 3.0]);
    }

    #[test]
    fn demand_charge_above_threshold() {
        // threshold 250, rate 10, flat 300 kW -> 10 * (300 - 250) = 500
        let f = ObjectiveFunction::DemandCharge {
            threshold_kw: 250.0,
            rate_per_kw: 10.0,
        };
        let cost = f.evaluate(&[300.0; 24]);
        assert!((cost - 500.0).abs() < 1e-3);
    }

    #[test]
    fn demand_charge_below_threshold_is_free() {
        let f = ObjectiveFunction::DemandCharge {
            threshold_kw: 250.0,
            rate_per_kw: 10.0,
        };
        assert_eq!(f.evaluate(&[100.0, 240.0, 0.0]), 0.0);
    }

    #[test]
    fn ramp_cost_counts_absolute_differences() {
        // [0, 100, 0] -> 0.005 * (100 + 100) = 1.0
        let f = ObjectiveFunction::Ramp { cost_per_kw: 0.005 };
        let cost = f.evaluate(&[0.0, 100.0, 0.0]);
        assert!((cost - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ramp_cost_flat_profile_is_free() {
        let f = ObjectiveFunction::Ramp { cost_per_kw: 0.005 };
        assert_eq!(f.evaluate(&[42.0; 10]), 0.0);
    }

    #[test]
    fn load_shape_tracking_squares_the_error() {
        let f = ObjectiveFunction::LoadShapeTracking {
            target_kw: vec![10.0, 10.0],
            price: 10.0,
        };
        // errors 2 and -3 -> 10 * (4 + 9) = 130
        let cost = f.evaluate(&[12.0, 7.0]);
        assert!((cost - 130.0).abs() < 1e-4);
    }

    #[test]
    fn tiered_energy_only_positive_excess_contributes() {
        // tiers (100, 5) and (0, 1) at p = 120: 20*5 + 120*1 = 220
        let f = ObjectiveFunction::TieredEnergy {
            tiers: vec![(100.0, 5.0), (0.0, 1.0)],
        };
        let cost = f.evaluate(&[120.0]);
        assert!((cost - 220.0).abs() < 1e-4);
    }

    #[test]
    fn tiered_energy_negative_point_is_free() {
        let f = ObjectiveFunction::TieredEnergy {
            tiers: DEFAULT_ENERGY_TIERS.to_vec(),
        };
        assert_eq!(f.evaluate(&[-50.0]), 0.0);
    }

    #[test]
    fn tiered_energy_evaluates_points_independently() {
        let f = ObjectiveFunction::TieredEnergy {
            tiers: vec![(100.0, 5.0), (0.0, 1.0)],
        };
        let single = f.evaluate(&[120.0]);
        let double = f.evaluate(&[120.0, 120.0]);
        assert!((double - 2.0 * single).abs() < 1e-4);
    }

    #[test]
    fn configure_energy_cost_from_tariffs() {
        let cfg = ObjectiveConfig::EnergyCost {
            price: None,
            extra: BTreeMap::new(),
        };
        let tariffs = TariffContext {
            energy_price: Some(vec![1.0; 24]),
            ..TariffContext::default()
        };
        let f = cfg.configure(&tariffs, 24, "system");
        assert!(f.is_ok());
    }

    #[test]
    fn configure_energy_cost_without_price_fails() {
        let cfg = ObjectiveConfig::EnergyCost {
            price: None,
            extra: BTreeMap::new(),
        };
        let err = cfg.configure(&TariffContext::default(), 24, "system");
        assert!(matches!(err, Err(PassError::MissingParameter { .. })));
    }

    #[test]
    fn configure_energy_cost_wrong_length_fails() {
        let cfg = ObjectiveConfig::EnergyCost {
            price: Some(vec![1.0; 12]),
            extra: BTreeMap::new(),
        };
        let err = cfg.configure(&TariffContext::default(), 24, "system");
        assert!(matches!(err, Err(PassError::SeriesLength { .. })));
    }

    #[test]
    fn configure_demand_charge_uses_tariff_threshold() {
        let cfg = ObjectiveConfig::DemandCharge {
            threshold_kw: None,
            rate_per_kw: None,
            extra: BTreeMap::new(),
        };
        let tariffs = TariffContext {
            demand_charge_threshold_kw: Some(180.0),
            ..TariffContext::default()
        };
        let f = cfg.configure(&tariffs, 24, "system").ok();
        match f {
            Some(ObjectiveFunction::DemandCharge {
                threshold_kw,
                rate_per_kw,
            }) => {
                assert_eq!(threshold_kw, 180.0);
                assert_eq!(rate_per_kw, DEFAULT_DEMAND_CHARGE_RATE);
            }
            other => panic!("unexpected configure result: {other:?}"),
        }
    }

    #[test]
    fn configure_demand_charge_falls_back_to_default_threshold() {
        let cfg = ObjectiveConfig::DemandCharge {
            threshold_kw: None,
            rate_per_kw: None,
            extra: BTreeMap::new(),
        };
        let f = cfg.configure(&TariffContext::default(), 24, "system").ok();
        match f {
            Some(ObjectiveFunction::DemandCharge { threshold_kw, .. }) => {
                assert_eq!(threshold_kw, DEFAULT_DEMAND_CHARGE_THRESHOLD_KW);
            }
            other => panic!("unexpected configure result: {other:?}"),
        }
    }

    #[test]
    fn unknown_parameter_keys_are_non_fatal() {
        let toml = r#"
kind = "ramp"
cost_per_kw = 0.01
legacy_knob = true
"#;
        let cfg: Result<ObjectiveConfig, _> = toml::from_str(toml);
        assert!(cfg.is_ok(), "unknown keys should parse: {:?}", cfg.err());
        let f = cfg
            .ok()
            .map(|c| c.configure(&TariffContext::default(), 24, "system"));
        assert!(matches!(f, Some(Ok(ObjectiveFunction::Ramp { .. }))));
    }

    #[test]
    fn tiered_config_parses_from_toml() {
        let toml = r#"
kind = "tiered_energy"
tiers = [
    { threshold_kw = 100.0, rate = 5.0 },
    { threshold_kw = 0.0, rate = 1.0 },
]
"#;
        let cfg: Result<ObjectiveConfig, _> = toml::from_str(toml);
        assert!(cfg.is_ok(), "tier table should parse: {:?}", cfg.err());
        let f = cfg
            .ok()
            .and_then(|c| c.configure(&TariffContext::default(), 1, "meter").ok());
        match f {
            Some(func @ ObjectiveFunction::TieredEnergy { .. }) => {
                assert!((func.evaluate(&[120.0]) - 220.0).abs() < 1e-4);
            }
            other => panic!("unexpected configure result: {other:?}"),
        }
    }
}
