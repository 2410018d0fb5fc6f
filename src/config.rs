//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::objective::{ObjectiveConfig, TariffContext};
use crate::optimizer::AnnealingParams;
use crate::resources::node::{ResourceSpec, ResourceTree};
use crate::resources::types::{Horizon, ResourceKind, StorageParams};

/// Top-level scenario configuration parsed from TOML.
///
/// All sections except `[system]` have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use a built-in preset via
/// [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Schedule horizon shape and start time.
    #[serde(default)]
    pub horizon: HorizonConfig,
    /// Annealing search parameters.
    #[serde(default)]
    pub annealing: AnnealingParams,
    /// Per-pass tariff context.
    #[serde(default)]
    pub tariffs: TariffContext,
    /// Nested resource-hierarchy description.
    pub system: ResourceSpec,
}

/// Schedule horizon parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    /// Number of schedule points (must be > 0).
    pub points: usize,
    /// Resolution of one point in minutes (must be > 0).
    pub resolution_min: u32,
    /// RFC 3339 start time for schedule labeling; now if omitted.
    pub start_time: Option<String>,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            points: 24,
            resolution_min: 60,
            start_time: None,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"horizon.points"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl ScenarioConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["single_storage", "campus"];

    /// Returns the single-storage preset: one 500 kW / 2000 kWh storage
    /// node optimized against a uniform unit energy price.
    pub fn single_storage() -> Self {
        Self {
            horizon: HorizonConfig {
                start_time: Some("2026-06-01T00:00:00Z".to_string()),
                ..HorizonConfig::default()
            },
            annealing: AnnealingParams::default(),
            tariffs: TariffContext {
                energy_price: Some(vec![1.0; 24]),
                ..TariffContext::default()
            },
            system: ResourceSpec {
                id: "ess".to_string(),
                kind: ResourceKind::EnergyStorage,
                nameplate_kw: 500.0,
                storage: Some(StorageParams {
                    max_soe_kwh: 2000.0,
                    min_soe_kwh: 0.0,
                    soe_kwh: 500.0,
                    eta_charge: 0.95,
                    eta_discharge: 0.95,
                    max_charge_kw: 500.0,
                    max_discharge_kw: 500.0,
                }),
                demand_forecast_kw: Vec::new(),
                objectives: vec![energy_cost_binding()],
                children: Vec::new(),
            },
        }
    }

    /// Returns the campus preset: an aggregate system with storage, solar,
    /// fixed load, and a shiftable-load placeholder, optimized against a
    /// time-of-use price, a demand charge, and a ramp penalty.
    pub fn campus() -> Self {
        let solar_forecast = vec![
            0.0, 0.0, 0.0, 0.0, 0.0, -5.769, -93.4666, -316.934, -544.388, -716.663, -822.318,
            -888.916, -898.478, -839.905, -706.972, -512.013, -265.994, -74.6933, -2.0346, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ];
        let load_forecast = vec![
            142.4973, 142.4973, 142.4973, 145.9894, 160.094, 289.5996, 339.7752, 572.17, 658.6025,
            647.2883, 650.1958, 639.7053, 658.044, 661.158, 660.3772, 673.1098, 640.9227,
            523.3306, 542.7008, 499.3727, 357.9398, 160.0936, 145.9894, 142.4973,
        ];
        // time-of-use price: night / shoulder / afternoon peak
        let mut energy_price = vec![0.08; 24];
        for p in energy_price.iter_mut().take(12).skip(7) {
            *p = 0.12;
        }
        for p in energy_price.iter_mut().take(20).skip(12) {
            *p = 0.18;
        }
        for p in energy_price.iter_mut().take(22).skip(20) {
            *p = 0.12;
        }

        Self {
            horizon: HorizonConfig {
                start_time: Some("2026-06-01T00:00:00Z".to_string()),
                ..HorizonConfig::default()
            },
            annealing: AnnealingParams::default(),
            tariffs: TariffContext {
                demand_charge_threshold_kw: Some(250.0),
                energy_price: Some(energy_price),
                load_shape_target_kw: None,
            },
            system: ResourceSpec {
                id: "system".to_string(),
                kind: ResourceKind::AggregateSystem,
                nameplate_kw: 0.0,
                storage: None,
                demand_forecast_kw: Vec::new(),
                objectives: vec![energy_cost_binding(), demand_charge_binding(), ramp_binding()],
                children: vec![
                    ResourceSpec {
                        id: "ess".to_string(),
                        kind: ResourceKind::EnergyStorage,
                        nameplate_kw: 500.0,
                        storage: Some(StorageParams {
                            max_soe_kwh: 2000.0,
                            min_soe_kwh: 0.0,
                            soe_kwh: 500.0,
                            eta_charge: 0.95,
                            eta_discharge: 0.95,
                            max_charge_kw: 500.0,
                            max_discharge_kw: 500.0,
                        }),
                        demand_forecast_kw: Vec::new(),
                        objectives: Vec::new(),
                        children: Vec::new(),
                    },
                    ResourceSpec {
                        id: "solar".to_string(),
                        kind: ResourceKind::SolarGeneration,
                        nameplate_kw: 1000.0,
                        storage: None,
                        demand_forecast_kw: solar_forecast,
                        objectives: Vec::new(),
                        children: Vec::new(),
                    },
                    ResourceSpec {
                        id: "load".to_string(),
                        kind: ResourceKind::FixedLoad,
                        nameplate_kw: 1000.0,
                        storage: None,
                        demand_forecast_kw: load_forecast,
                        objectives: Vec::new(),
                        children: Vec::new(),
                    },
                    ResourceSpec {
                        id: "shiftable".to_string(),
                        kind: ResourceKind::ShiftableLoad,
                        nameplate_kw: 0.0,
                        storage: None,
                        demand_forecast_kw: Vec::new(),
                        objectives: Vec::new(),
                        children: Vec::new(),
                    },
                ],
            },
        }
    }

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "single_storage" => Ok(Self::single_storage()),
            "campus" => Ok(Self::campus()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// The schedule horizon described by this scenario.
    ///
    /// # Panics
    ///
    /// Panics if the horizon fields are invalid; call
    /// [`ScenarioConfig::validate`] first on untrusted input.
    pub fn build_horizon(&self) -> Horizon {
        Horizon::new(self.horizon.points, self.horizon.resolution_min)
    }

    /// Constructs the resource tree described by this scenario.
    ///
    /// # Panics
    ///
    /// Panics on invalid resource fields; call
    /// [`ScenarioConfig::validate`] first on untrusted input.
    pub fn build_tree(&self) -> ResourceTree {
        ResourceTree::from_spec(&self.system, self.build_horizon())
    }

    /// Builds the schedule-labeling timestamp vector, starting at the
    /// configured start time or now.
    pub fn build_timestamps(&self) -> Vec<DateTime<Utc>> {
        let start = self
            .horizon
            .start_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        self.build_horizon().timestamps(start)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let h = &self.horizon;
        if h.points == 0 {
            errors.push(ConfigError {
                field: "horizon.points".into(),
                message: "must be > 0".into(),
            });
        }
        if h.resolution_min == 0 {
            errors.push(ConfigError {
                field: "horizon.resolution_min".into(),
                message: "must be > 0".into(),
            });
        }
        if let Some(start) = &h.start_time {
            if DateTime::parse_from_rfc3339(start).is_err() {
                errors.push(ConfigError {
                    field: "horizon.start_time".into(),
                    message: format!("\"{start}\" is not a valid RFC 3339 timestamp"),
                });
            }
        }

        if let Err(e) = self.annealing.validate() {
            errors.push(ConfigError {
                field: "annealing".into(),
                message: e.to_string(),
            });
        }

        if let Some(price) = &self.tariffs.energy_price {
            if price.len() != h.points {
                errors.push(ConfigError {
                    field: "tariffs.energy_price".into(),
                    message: format!("has {} points, horizon has {}", price.len(), h.points),
                });
            }
        }
        if let Some(target) = &self.tariffs.load_shape_target_kw {
            if target.len() != h.points {
                errors.push(ConfigError {
                    field: "tariffs.load_shape_target_kw".into(),
                    message: format!("has {} points, horizon has {}", target.len(), h.points),
                });
            }
        }

        let mut seen_ids = HashSet::new();
        validate_resource(&self.system, "system", h.points, &mut seen_ids, &mut errors);

        errors
    }
}

fn validate_resource(
    spec: &ResourceSpec,
    field: &str,
    points: usize,
    seen_ids: &mut HashSet<String>,
    errors: &mut Vec<ConfigError>,
) {
    if spec.id.is_empty() {
        errors.push(ConfigError {
            field: format!("{field}.id"),
            message: "must not be empty".into(),
        });
    } else if !seen_ids.insert(spec.id.clone()) {
        errors.push(ConfigError {
            field: format!("{field}.id"),
            message: format!("duplicate resource id \"{}\"", spec.id),
        });
    }

    if spec.nameplate_kw < 0.0 {
        errors.push(ConfigError {
            field: format!("{field}.nameplate_kw"),
            message: "must be >= 0".into(),
        });
    }
    if !(spec.demand_forecast_kw.is_empty() || spec.demand_forecast_kw.len() == points) {
        errors.push(ConfigError {
            field: format!("{field}.demand_forecast_kw"),
            message: format!(
                "has {} points, horizon has {points}",
                spec.demand_forecast_kw.len()
            ),
        });
    }

    match (&spec.kind, &spec.storage) {
        (ResourceKind::EnergyStorage, None) => errors.push(ConfigError {
            field: format!("{field}.storage"),
            message: "energy_storage requires storage parameters".into(),
        }),
        (ResourceKind::EnergyStorage, Some(s)) => {
            if s.min_soe_kwh > s.max_soe_kwh {
                errors.push(ConfigError {
                    field: format!("{field}.storage.min_soe_kwh"),
                    message: "must be <= max_soe_kwh".into(),
                });
            }
            if s.soe_kwh < s.min_soe_kwh || s.soe_kwh > s.max_soe_kwh {
                errors.push(ConfigError {
                    field: format!("{field}.storage.soe_kwh"),
                    message: "must be within [min_soe_kwh, max_soe_kwh]".into(),
                });
            }
            for (name, eta) in [("eta_charge", s.eta_charge), ("eta_discharge", s.eta_discharge)]
            {
                if !(eta > 0.0 && eta <= 1.0) {
                    errors.push(ConfigError {
                        field: format!("{field}.storage.{name}"),
                        message: "must be in (0, 1]".into(),
                    });
                }
            }
            if s.max_charge_kw < 0.0 || s.max_discharge_kw < 0.0 {
                errors.push(ConfigError {
                    field: format!("{field}.storage.max_charge_kw"),
                    message: "power limits must be >= 0".into(),
                });
            }
        }
        (_, Some(_)) => errors.push(ConfigError {
            field: format!("{field}.storage"),
            message: "only energy_storage nodes carry storage parameters".into(),
        }),
        (_, None) => {}
    }

    for (i, child) in spec.children.iter().enumerate() {
        validate_resource(
            child,
            &format!("{field}.children[{i}]"),
            points,
            seen_ids,
            errors,
        );
    }
}

fn energy_cost_binding() -> ObjectiveConfig {
    ObjectiveConfig::EnergyCost {
        price: None,
        extra: Default::default(),
    }
}

fn demand_charge_binding() -> ObjectiveConfig {
    ObjectiveConfig::DemandCharge {
        threshold_kw: None,
        rate_per_kw: None,
        extra: Default::default(),
    }
}

fn ramp_binding() -> ObjectiveConfig {
    ObjectiveConfig::Ramp {
        cost_per_kw: None,
        extra: Default::default(),
    }
}
