//! Storage state-of-energy feasibility projection.
//!
//! Maps a requested charge/discharge profile onto one the storage plant can
//! physically execute: power limits, SOE bounds, and efficiency losses.

use tracing::warn;

use super::types::StorageParams;

/// Tolerance applied to SOE bound checks (kWh).
pub const SOE_TOLERANCE_KWH: f32 = 0.001;

/// Result of projecting a single timestep.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedStep {
    /// Power command after limiting (kW, same sign as the request).
    pub accepted_kw: f32,
    /// Change in stored energy over the step, after losses (kWh).
    pub delta_energy_kwh: f32,
    /// State of energy after executing the accepted command (kWh).
    pub new_soe_kwh: f32,
}

/// Result of projecting a whole trajectory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionOutcome {
    /// Index of the first bound violation, if any correction was applied.
    pub corrected_from: Option<usize>,
    /// Largest remaining bound excursion after correction (kWh, >= 0).
    pub residual_kwh: f32,
}

impl ProjectionOutcome {
    /// Whether the projection had to modify the requested profile.
    pub fn corrected(&self) -> bool {
        self.corrected_from.is_some()
    }
}

impl StorageParams {
    /// Change in stored energy for an unconstrained power command over one
    /// timestep, accounting for efficiency losses.
    pub fn delta_energy_kwh(&self, power_kw: f32, dt_hours: f32) -> f32 {
        if power_kw >= 0.0 {
            power_kw * dt_hours * self.eta_charge
        } else {
            power_kw * dt_hours / self.eta_discharge
        }
    }

    /// Limits a single power request against power and SOE constraints.
    ///
    /// Charging requests (>= 0) are capped by `max_charge_kw` and by the
    /// energy headroom to `max_soe_kwh`; discharging requests are capped by
    /// `max_discharge_kw` and by the energy available above `min_soe_kwh`.
    pub fn project_step(&self, requested_kw: f32, soe_kwh: f32, dt_hours: f32) -> ProjectedStep {
        if requested_kw >= 0.0 {
            // Charging: headroom is grid-side energy before hitting max SOE
            let headroom_kwh = (self.max_soe_kwh - soe_kwh) / self.eta_charge;
            let accepted_kw = requested_kw
                .min(self.max_charge_kw)
                .min((headroom_kwh / dt_hours).max(0.0));
            let delta_energy_kwh = accepted_kw * dt_hours * self.eta_charge;
            ProjectedStep {
                accepted_kw,
                delta_energy_kwh,
                new_soe_kwh: soe_kwh + delta_energy_kwh,
            }
        } else {
            // Discharging: headroom is deliverable energy above min SOE
            let headroom_kwh = (soe_kwh - self.min_soe_kwh) * self.eta_discharge;
            let accepted_kw = requested_kw
                .max(-self.max_discharge_kw)
                .max(-(headroom_kwh / dt_hours).max(0.0));
            let delta_energy_kwh = accepted_kw * dt_hours / self.eta_discharge;
            ProjectedStep {
                accepted_kw,
                delta_energy_kwh,
                new_soe_kwh: soe_kwh + delta_energy_kwh,
            }
        }
    }

    /// Projects a whole trajectory onto the storage operating envelope.
    ///
    /// First computes the tentative SOE trajectory implied by the unmodified
    /// power sequence. If every point stays within `[min_soe_kwh,
    /// max_soe_kwh]` (within [`SOE_TOLERANCE_KWH`]) the arrays are filled
    /// with that trajectory and the powers are left untouched. Otherwise the
    /// trajectory is re-walked point by point from the first violating
    /// index, limiting each step with [`StorageParams::project_step`] and
    /// propagating the corrected SOE forward; points before the first
    /// violation keep their tentative values.
    ///
    /// A residual excursion that survives the correction is logged and
    /// reported, not fatal: the best-effort values are kept.
    ///
    /// # Panics
    ///
    /// Panics if the three arrays differ in length.
    pub fn project(
        &self,
        demand_kw: &mut [f32],
        energy_kwh: &mut [f32],
        delta_kwh: &mut [f32],
        dt_hours: f32,
    ) -> ProjectionOutcome {
        assert_eq!(demand_kw.len(), energy_kwh.len());
        assert_eq!(demand_kw.len(), delta_kwh.len());

        // Tentative trajectory from the unmodified power sequence
        let mut soe = self.soe_kwh;
        let mut first_violation = None;
        for (i, &power) in demand_kw.iter().enumerate() {
            let delta = self.delta_energy_kwh(power, dt_hours);
            soe += delta;
            energy_kwh[i] = soe;
            delta_kwh[i] = delta;
            if first_violation.is_none()
                && (soe > self.max_soe_kwh + SOE_TOLERANCE_KWH
                    || soe < self.min_soe_kwh - SOE_TOLERANCE_KWH)
            {
                first_violation = Some(i);
            }
        }

        let Some(start) = first_violation else {
            return ProjectionOutcome::default();
        };

        // Re-walk from the first violation, limiting each step
        let mut soe = if start == 0 {
            self.soe_kwh
        } else {
            energy_kwh[start - 1]
        };
        for i in start..demand_kw.len() {
            let step = self.project_step(demand_kw[i], soe, dt_hours);
            demand_kw[i] = step.accepted_kw;
            delta_kwh[i] = step.delta_energy_kwh;
            energy_kwh[i] = step.new_soe_kwh;
            soe = step.new_soe_kwh;
        }

        let mut residual_kwh = 0.0_f32;
        for &e in energy_kwh.iter() {
            let excursion = (e - self.max_soe_kwh).max(self.min_soe_kwh - e);
            residual_kwh = residual_kwh.max(excursion);
        }
        residual_kwh = residual_kwh.max(0.0);
        if residual_kwh > SOE_TOLERANCE_KWH {
            warn!(
                residual_kwh,
                max_soe_kwh = self.max_soe_kwh,
                min_soe_kwh = self.min_soe_kwh,
                "SOE bound excursion remains after trajectory correction"
            );
        }

        ProjectionOutcome {
            corrected_from: Some(start),
            residual_kwh,
        }
    }
}
