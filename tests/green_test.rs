// Green's function engine: wrapping, stabilized sweeps and consistency with scratch evaluation

mod common;

use common::{max_abs, max_abs_diff, model_params};
use detsdw::checkerboard::CMat;
use detsdw::error::Result;
use detsdw::field::{add, PhiField};
use detsdw::green::{GreenEngine, SliceVisitor, SweepDirection};
use detsdw::lattice::PeriodicSquareLattice;
use detsdw::local_update::woodbury_update;
use detsdw::params::ModelParams;
use detsdw::propagator::Hopping;
use detsdw::transfer::{delta_matrix, Transfer};
use detsdw::udv::DenseProduct;
use detsdw::utils::rng::RngWrapper;

fn setup(extra: &[(&str, &str)]) -> (ModelParams, Hopping, PhiField) {
    let params = model_params(4, 8, 1.0, extra);
    let lattice = PeriodicSquareLattice::new(params.l);
    let hopping = Hopping::new(&params, &lattice).unwrap();
    let mut rng = RngWrapper::new(0xDEADBEEF);
    let field = PhiField::random(params.n(), params.m, params.dtau, &mut rng);
    (params, hopping, field)
}

fn assert_close(a: &CMat, b: &CMat, rel: f64, what: &str) {
    let diff = max_abs_diff(a, b);
    assert!(diff < rel * max_abs(b), "{what}: deviation {diff:.3e}");
}

/// Records the visited slices and leaves G alone.
#[derive(Default)]
struct Recorder {
    visited: Vec<usize>,
}

impl SliceVisitor for Recorder {
    fn visit_slice(&mut self, k: usize, _green: &mut CMat, _field: &mut PhiField) -> Result<()> {
        self.visited.push(k);
        Ok(())
    }
}

/// Changes the field at one site per slice and keeps G in step.
struct Mutator {
    rng: RngWrapper,
}

impl SliceVisitor for Mutator {
    fn visit_slice(&mut self, k: usize, green: &mut CMat, field: &mut PhiField) -> Result<()> {
        let site = self.rng.rand_int(0, field.n() - 1);
        let old = *field.get(site, k);
        let shift = [self.rng.rand_range(-0.3, 0.3), self.rng.rand_range(-0.3, 0.3), self.rng.rand_range(-0.3, 0.3)];
        let new = add(&old, &shift);
        woodbury_update(green, site, &delta_matrix(field.dtau(), &old, &new))?;
        field.set(site, k, new);
        Ok(())
    }
}

#[test]
fn test_recompute_and_wrap_down() {
    let (params, hopping, field) = setup(&[("s", "4")]);
    let transfer = Transfer::new(&hopping, &field);
    let mut engine: GreenEngine = GreenEngine::new(4 * params.n(), params.m, params.s);
    engine.recompute_from_scratch(&transfer).unwrap();
    assert_eq!(engine.slice(), params.m);
    assert_eq!(engine.next_direction(), SweepDirection::Down);

    let at_m = engine.compute_green_at(&transfer, params.m).unwrap();
    assert_close(engine.green(), &at_m, 1e-10, "G(m) after recompute");

    // slice 0 and slice m are the same physical slice
    let at_0 = engine.compute_green_at(&transfer, 0).unwrap();
    assert_close(&at_0, &at_m, 1e-8, "G(0) vs G(m)");

    engine.wrap_down(&transfer, params.m);
    assert_eq!(engine.slice(), params.m - 1);
    let expected = engine.compute_green_at(&transfer, params.m - 1).unwrap();
    assert_close(engine.green(), &expected, 1e-8, "wrapped G(m-1)");

    engine.wrap_up(&transfer, params.m);
    assert_close(engine.green(), &at_m, 1e-8, "wrapped back to G(m)");
}

#[test]
fn test_sweeps_visit_every_slice_and_stay_consistent() {
    let (params, hopping, mut field) = setup(&[("s", "2")]);
    let mut engine: GreenEngine = GreenEngine::new(4 * params.n(), params.m, params.s);
    engine.recompute_from_scratch(&Transfer::new(&hopping, &field)).unwrap();

    let mut down = Recorder::default();
    engine.sweep(&hopping, &mut field, &mut down).unwrap();
    assert_eq!(down.visited, (1..=params.m).rev().collect::<Vec<_>>());
    assert_eq!(engine.slice(), 0);
    assert_eq!(engine.next_direction(), SweepDirection::Up);
    let expected = engine.compute_green_at(&Transfer::new(&hopping, &field), 0).unwrap();
    assert_close(engine.green(), &expected, 1e-8, "G after down sweep");

    let mut up = Recorder::default();
    engine.sweep(&hopping, &mut field, &mut up).unwrap();
    assert_eq!(up.visited, (1..=params.m).collect::<Vec<_>>());
    assert_eq!(engine.slice(), params.m);
    assert_eq!(engine.next_direction(), SweepDirection::Down);
    let expected = engine.compute_green_at(&Transfer::new(&hopping, &field), params.m).unwrap();
    assert_close(engine.green(), &expected, 1e-8, "G after up sweep");
}

#[test]
fn test_dense_and_udv_engines_agree() {
    let (params, hopping, mut field) = setup(&[("s", "4")]);
    let dim = 4 * params.n();
    let mut stable: GreenEngine = GreenEngine::new(dim, params.m, params.s);
    let mut dense: GreenEngine<DenseProduct> = GreenEngine::new(dim, params.m, params.s);
    stable.recompute_from_scratch(&Transfer::new(&hopping, &field)).unwrap();
    dense.recompute_from_scratch(&Transfer::new(&hopping, &field)).unwrap();
    assert_close(dense.green(), stable.green(), 1e-8, "recomputed G");

    stable.sweep(&hopping, &mut field, &mut Recorder::default()).unwrap();
    dense.sweep(&hopping, &mut field, &mut Recorder::default()).unwrap();
    assert_close(dense.green(), stable.green(), 1e-8, "G after a sweep");
}

#[test]
fn test_updates_during_sweeps_keep_green_consistent() {
    let (params, hopping, mut field) = setup(&[("s", "4")]);
    let mut engine: GreenEngine = GreenEngine::new(4 * params.n(), params.m, params.s);
    engine.recompute_from_scratch(&Transfer::new(&hopping, &field)).unwrap();
    let original = field.clone();

    let mut mutator = Mutator { rng: RngWrapper::new(42) };
    engine.sweep(&hopping, &mut field, &mut mutator).unwrap();
    assert_ne!(field, original);
    let expected = engine.compute_green_at(&Transfer::new(&hopping, &field), 0).unwrap();
    assert_close(engine.green(), &expected, 1e-6, "G after updating down sweep");

    engine.sweep(&hopping, &mut field, &mut mutator).unwrap();
    let expected = engine.compute_green_at(&Transfer::new(&hopping, &field), params.m).unwrap();
    assert_close(engine.green(), &expected, 1e-6, "G after updating up sweep");
    field.consistency_check().unwrap();
}

#[test]
fn test_checkerboard_engine_is_consistent() {
    let (params, hopping, mut field) = setup(&[("s", "4"), ("checkerboard", "true"), ("checkerboardMethod", "assaad_berg")]);
    assert!(hopping.checkerboard().is_ok());
    let mut engine: GreenEngine = GreenEngine::new(4 * params.n(), params.m, params.s);
    engine.recompute_from_scratch(&Transfer::new(&hopping, &field)).unwrap();
    let mut mutator = Mutator { rng: RngWrapper::new(3) };
    engine.sweep(&hopping, &mut field, &mut mutator).unwrap();
    let expected = engine.compute_green_at(&Transfer::new(&hopping, &field), 0).unwrap();
    assert_close(engine.green(), &expected, 1e-6, "checkerboard G after sweep");
}
