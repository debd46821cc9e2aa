//! Cross-village energy pooling for a single shared timestep.

use serde::Serialize;

use super::types::DispatchRecord;

/// State of charge at or above which a village's surplus joins the pool.
pub const DEFAULT_NEAR_FULL_SOC: f64 = 0.95;

/// Absolute slack on the near-full comparison; SOC folds carry float error.
const SOC_TOLERANCE: f64 = 1e-9;

/// Aggregate pool figures for one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolStep {
    /// Timestep index within the run.
    pub timestep: usize,
    /// Surplus offered by near-full villages (kW).
    pub pool_surplus_kw: f64,
    /// Sum of all village deficits (kW).
    pub pool_deficit_kw: f64,
    /// Total handed out to deficit villages (kW).
    pub distributed_kw: f64,
}

/// Redistributes pooled surplus to villages in deficit.
///
/// Villages are visited in the order of the snapshot slice. Each village's
/// grant is `min(deficit, remaining_surplus * deficit / pool_deficit)`, where
/// `remaining_surplus` shrinks after every grant while `pool_deficit` stays at
/// the original total. Villages visited late can therefore receive less than
/// their proportional share of the original surplus.
#[derive(Debug, Clone, Copy)]
pub struct EnergyPoolCoordinator {
    near_full_soc: f64,
}

impl Default for EnergyPoolCoordinator {
    fn default() -> Self {
        Self {
            near_full_soc: DEFAULT_NEAR_FULL_SOC,
        }
    }
}

impl EnergyPoolCoordinator {
    /// Creates a coordinator pooling surplus from villages at or above `near_full_soc`.
    pub fn new(near_full_soc: f64) -> Self {
        Self { near_full_soc }
    }

    /// SOC threshold for joining the pool.
    pub fn near_full_soc(&self) -> f64 {
        self.near_full_soc
    }

    /// Surplus this record contributes to the pool (zero unless near full).
    pub fn pooled_surplus_kw(&self, record: &DispatchRecord) -> f64 {
        if record.soc_frac() + SOC_TOLERANCE >= self.near_full_soc {
            record.surplus_kw()
        } else {
            0.0
        }
    }

    /// Finalizes pool fields for every village at one timestep.
    ///
    /// `snapshot` holds one local record per village, already arranged in
    /// iteration order. Records are updated in place.
    pub fn share(&self, timestep: usize, snapshot: &mut [DispatchRecord]) -> PoolStep {
        let pool_surplus_kw: f64 = snapshot.iter().map(|r| self.pooled_surplus_kw(r)).sum();
        let pool_deficit_kw: f64 = snapshot.iter().map(DispatchRecord::deficit_kw).sum();

        if pool_surplus_kw <= 0.0 || pool_deficit_kw <= 0.0 {
            for record in snapshot.iter_mut() {
                record.clear_pool_share();
            }
            return PoolStep {
                timestep,
                pool_surplus_kw,
                pool_deficit_kw,
                distributed_kw: 0.0,
            };
        }

        let mut remaining_kw = pool_surplus_kw;
        for record in snapshot.iter_mut() {
            let need_kw = record.deficit_kw();
            if need_kw <= 0.0 {
                record.clear_pool_share();
                continue;
            }
            let receive_kw = need_kw.min(remaining_kw * (need_kw / pool_deficit_kw));
            record.apply_pool_share(receive_kw);
            remaining_kw -= receive_kw;
        }

        PoolStep {
            timestep,
            pool_surplus_kw,
            pool_deficit_kw,
            distributed_kw: pool_surplus_kw - remaining_kw,
        }
    }
}
