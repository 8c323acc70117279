// model.rs - The SDW determinant Monte Carlo simulation: state, sweeps and reporting

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::action::BosonAction;
use crate::checkerboard::CMat;
use crate::error::{Result, SdwError};
use crate::field::PhiField;
use crate::global_moves::{
    attempt_global_shift, attempt_timeslice_rescale, attempt_wolff_cluster_update, or_no_data, GlobalMoveStats,
    MoveContext,
};
use crate::green::{shifted_green, GreenEngine, SliceVisitor};
use crate::lattice::PeriodicSquareLattice;
use crate::local_update::LocalUpdater;
use crate::measure::SdwMeasurements;
use crate::metadata::MetadataMap;
use crate::observables::Observables;
use crate::params::{ModelParams, UpdateMethod};
use crate::propagator::{band_hoppings, Hopping, FLAVORS};
use crate::proposals::Proposer;
use crate::transfer::Transfer;
use crate::utils::rng::RngWrapper;

/// Everything needed to continue a simulation exactly where it stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub params: ModelParams,
    pub field: PhiField,
    pub green: GreenEngine,
    pub proposer: Proposer,
    pub updater: LocalUpdater,
    pub stats: GlobalMoveStats,
    pub rng: RngWrapper,
    pub performed_sweeps: usize,
}

/// Per-slice work of one sweep: local updates, rescale moves, adaptation, measurement.
struct SliceWork<'a> {
    params: &'a ModelParams,
    action: BosonAction<'a>,
    hopping: &'a Hopping,
    lattice: &'a PeriodicSquareLattice,
    proposer: &'a mut Proposer,
    updater: &'a mut LocalUpdater,
    stats: &'a mut GlobalMoveStats,
    rng: &'a mut RngWrapper,
    measurements: Option<&'a mut SdwMeasurements>,
    performed_sweeps: usize,
    adapt: bool,
}

impl SliceVisitor for SliceWork<'_> {
    fn visit_slice(&mut self, k: usize, green: &mut CMat, field: &mut PhiField) -> Result<()> {
        let kind = self.proposer.move_kind(self.performed_sweeps);
        for _ in 0..self.params.repeat_update_in_slice {
            self.updater.update_slice(k, green, field, &self.action, &*self.proposer, kind, self.rng)?;
        }
        if self.params.rescale && self.performed_sweeps % self.params.rescale_interval == 0 {
            attempt_timeslice_rescale(
                &self.action,
                k,
                green,
                field,
                self.params.rescale_growth_factor,
                self.rng,
                self.stats,
            )?;
        }
        if self.adapt {
            self.proposer.record_acceptance(self.updater.last_acc_ratio, self.performed_sweeps);
        }
        if let Some(meas) = self.measurements.as_deref_mut() {
            meas.measure_slice(k, &shifted_green(self.hopping, green), field, self.lattice);
        }
        Ok(())
    }
}

/// Determinant QMC of two fermion bands coupled to an O(3) order-parameter field.
#[derive(Debug, Clone)]
pub struct DetSdw {
    params: ModelParams,
    lattice: PeriodicSquareLattice,
    hopping: Hopping,
    field: PhiField,
    green: GreenEngine,
    proposer: Proposer,
    updater: LocalUpdater,
    stats: GlobalMoveStats,
    rng: RngWrapper,
    performed_sweeps: usize,
    measurements: SdwMeasurements,
}

impl DetSdw {
    /// Fresh simulation with a random initial field and a stable G at slice m.
    pub fn new(params: ModelParams, seed: u64) -> Result<Self> {
        let mut rng = RngWrapper::new(seed);
        let field = PhiField::random(params.n(), params.m, params.dtau, &mut rng);
        Self::with_field(params, field, rng)
    }

    /// Simulation starting from a given field configuration.
    pub fn with_field(params: ModelParams, field: PhiField, rng: RngWrapper) -> Result<Self> {
        let n = params.n();
        if field.n() != n || field.m() != params.m {
            return Err(SdwError::Inconsistent(format!(
                "field of size {}x{} does not match N = {n}, m = {}",
                field.n(),
                field.m(),
                params.m
            )));
        }
        let green = GreenEngine::new(FLAVORS * n, params.m, params.s);
        let state = ModelState {
            proposer: Proposer::new(params.spin_proposal_method, params.acc_ratio, params.adapt_scale_variance),
            updater: LocalUpdater::new(params.update_method, params.delay_steps),
            stats: GlobalMoveStats::default(),
            params,
            field,
            green,
            rng,
            performed_sweeps: 0,
        };
        let mut model = Self::from_state(state)?;
        model.recompute_green()?;
        Ok(model)
    }

    /// Rebuild the derived structures (lattice, propagators) around a saved state.
    pub fn from_state(state: ModelState) -> Result<Self> {
        let ModelState { params, field, green, proposer, updater, stats, rng, performed_sweeps } = state;
        let lattice = PeriodicSquareLattice::new(params.l);
        let hopping = Hopping::new(&params, &lattice)?;
        let measurements = SdwMeasurements::new(params.l, params.m, params.dtau, params.bc, band_hoppings(&params));
        let model = Self {
            params,
            lattice,
            hopping,
            field,
            green,
            proposer,
            updater,
            stats,
            rng,
            performed_sweeps,
            measurements,
        };
        model.consistency_check()?;
        Ok(model)
    }

    pub fn state(&self) -> ModelState {
        ModelState {
            params: self.params.clone(),
            field: self.field.clone(),
            green: self.green.clone(),
            proposer: self.proposer.clone(),
            updater: self.updater.clone(),
            stats: self.stats.clone(),
            rng: self.rng.clone(),
            performed_sweeps: self.performed_sweeps,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn lattice(&self) -> &PeriodicSquareLattice {
        &self.lattice
    }

    pub fn hopping(&self) -> &Hopping {
        &self.hopping
    }

    pub fn field(&self) -> &PhiField {
        &self.field
    }

    pub fn green(&self) -> &GreenEngine {
        &self.green
    }

    pub fn proposer(&self) -> &Proposer {
        &self.proposer
    }

    pub fn updater(&self) -> &LocalUpdater {
        &self.updater
    }

    pub fn stats(&self) -> &GlobalMoveStats {
        &self.stats
    }

    pub fn performed_sweeps(&self) -> usize {
        self.performed_sweeps
    }

    pub fn action(&self) -> BosonAction<'_> {
        BosonAction::new(&self.lattice, self.params.m, self.params.dtau, self.params.r)
    }

    /// Stable G at slice m from the current field.
    pub fn recompute_green(&mut self) -> Result<()> {
        self.green.recompute_from_scratch(&Transfer::new(&self.hopping, &self.field))
    }

    /// G at the engine's current slice, rebuilt from scratch; the stored G is untouched.
    pub fn green_from_scratch(&self) -> Result<CMat> {
        self.green.compute_green_at(&Transfer::new(&self.hopping, &self.field), self.green.slice())
    }

    /// Measurement sweep; returns the sweep's observables if `take_measurements`.
    pub fn sweep(&mut self, take_measurements: bool) -> Result<Option<Observables>> {
        self.sweep_impl(take_measurements, false)
    }

    /// Sweep with step-size adaptation and no measurements.
    pub fn sweep_thermalization(&mut self) -> Result<()> {
        self.sweep_impl(false, true).map(|_| ())
    }

    fn sweep_impl(&mut self, take_measurements: bool, adapt: bool) -> Result<Option<Observables>> {
        if take_measurements {
            self.measurements.reset();
        }
        let Self {
            params,
            lattice,
            hopping,
            field,
            green,
            proposer,
            updater,
            stats,
            rng,
            performed_sweeps,
            measurements,
        } = self;
        let action = BosonAction::new(lattice, params.m, params.dtau, params.r);

        let mut work = SliceWork {
            params,
            action,
            hopping,
            lattice,
            proposer,
            updater,
            stats,
            rng,
            measurements: take_measurements.then_some(&mut *measurements),
            performed_sweeps: *performed_sweeps,
            adapt,
        };
        green.sweep(hopping, field, &mut work)?;

        if !green.green().iter().all(|v| v.re.is_finite() && v.im.is_finite()) {
            return Err(SdwError::Inconsistent(format!(
                "non-finite Green's function after sweep {}; decrease s",
                *performed_sweeps
            )));
        }

        let observables = take_measurements.then(|| measurements.finish(field));

        if (params.global_shift || params.wolff_cluster_update) && (*performed_sweeps + 1) % params.global_update_interval == 0
        {
            let ctx = MoveContext { hopping, action };
            if params.global_shift {
                attempt_global_shift(&ctx, field, green, proposer.phi_delta, rng, stats)?;
            }
            if params.wolff_cluster_update {
                attempt_wolff_cluster_update(&ctx, field, green, rng, stats)?;
            }
        }

        *performed_sweeps += 1;
        Ok(observables)
    }

    /// Report the adapted step sizes and move statistics at the end of thermalization.
    pub fn thermalization_over(&self) {
        info!("thermalization over after {} sweeps", self.performed_sweeps);
        self.proposer.log_step_sizes();
        info!(
            "local acceptance: {} of {} proposals",
            self.updater.accepted, self.updater.attempted
        );
        if self.params.rescale {
            info!("timeslice rescale acceptance ratio = {}", or_no_data(self.stats.rescale_acc_ratio()));
        }
        if self.params.global_shift {
            info!("global shift acceptance ratio = {}", or_no_data(self.stats.shift_acc_ratio()));
        }
        if self.params.wolff_cluster_update {
            if self.stats.accepted_wolff == 0 {
                warn!("no Wolff cluster update accepted yet");
            }
            info!(
                "Wolff cluster update acceptance ratio = {}, average accepted size = {}",
                or_no_data(self.stats.wolff_acc_ratio()),
                or_no_data(self.stats.average_accepted_cluster_size())
            );
        }
    }

    /// The cached cosh/sinh factors must match φ.
    pub fn consistency_check(&self) -> Result<()> {
        self.field.consistency_check()
    }

    pub fn metadata(&self) -> MetadataMap {
        let p = &self.params;
        let mut meta = MetadataMap::new();
        meta.insert("model", "sdw");
        meta.insert("checkerboard", p.uses_checkerboard());
        if p.uses_checkerboard() {
            meta.insert("checkerboardMethod", p.checkerboard.as_str());
        }
        meta.insert("updateMethod", p.update_method.as_str());
        if p.update_method == UpdateMethod::Delayed {
            meta.insert("delaySteps", p.delay_steps);
        }
        meta.insert("spinProposalMethod", p.spin_proposal_method.as_str());
        meta.insert("adaptScaleDelta", p.adapt_scale_variance);
        meta.insert("bc", p.bc);
        meta.insert("targetAccRatioLocal", p.acc_ratio);
        meta.insert("phiDelta", self.proposer.phi_delta);
        meta.insert("angleDelta", self.proposer.angle.value);
        meta.insert("scaleDelta", self.proposer.scale.value);
        meta.insert("r", p.r);
        meta.insert("txhor", p.txhor);
        meta.insert("txver", p.txver);
        meta.insert("tyhor", p.tyhor);
        meta.insert("tyver", p.tyver);
        meta.insert("mu", p.mu);
        meta.insert("L", p.l);
        meta.insert("d", 2);
        meta.insert("N", p.n());
        meta.insert("beta", p.beta);
        meta.insert("m", p.m);
        meta.insert("dtau", p.dtau);
        meta.insert("s", p.s);
        meta.insert("rescale", p.rescale);
        if p.rescale {
            meta.insert("rescaleInterval", p.rescale_interval);
            meta.insert("rescaleGrowthFactor", p.rescale_growth_factor);
            meta.insert("timesliceRescaleAccRatio", or_no_data(self.stats.rescale_acc_ratio()));
        }
        meta.insert("globalShift", p.global_shift);
        meta.insert("wolffClusterUpdate", p.wolff_cluster_update);
        meta.insert("globalMoveInterval", p.global_update_interval);
        if p.global_shift {
            meta.insert("globalShiftAccRatio", or_no_data(self.stats.shift_acc_ratio()));
        }
        if p.wolff_cluster_update {
            meta.insert("wolffClusterUpdateAccRatio", or_no_data(self.stats.wolff_acc_ratio()));
            meta.insert(
                "averageAcceptedWolffClusterSize",
                or_no_data(self.stats.average_accepted_cluster_size()),
            );
        }
        meta.insert("repeatUpdateInSlice", p.repeat_update_in_slice);
        meta
    }
}
