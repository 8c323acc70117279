// Single-site updates against a dense reference G' = G·[I + D(I - G)]^{-1}

mod common;

use common::{identity, max_abs, max_abs_diff, model_params};
use detsdw::action::BosonAction;
use detsdw::checkerboard::CMat;
use detsdw::field::{add, PhiField};
use detsdw::green::GreenEngine;
use detsdw::lattice::PeriodicSquareLattice;
use detsdw::local_update::{
    det_ratio, iterative_update, pivots, woodbury_update, DelayedUpdates, LocalUpdater,
};
use detsdw::params::{ModelParams, UpdateMethod};
use detsdw::propagator::Hopping;
use detsdw::proposals::Proposer;
use detsdw::transfer::{delta_matrix, Mat4, Transfer};
use detsdw::utils::rng::RngWrapper;
use num_complex::Complex64;

struct Setup {
    params: ModelParams,
    lattice: PeriodicSquareLattice,
    hopping: Hopping,
    field: PhiField,
    g: CMat,
}

fn setup(extra: &[(&str, &str)]) -> Setup {
    let params = model_params(4, 8, 1.0, extra);
    let lattice = PeriodicSquareLattice::new(params.l);
    let hopping = Hopping::new(&params, &lattice).unwrap();
    let mut rng = RngWrapper::new(0xDEADBEEF);
    let field = PhiField::random(params.n(), params.m, params.dtau, &mut rng);
    let engine: GreenEngine = GreenEngine::new(4 * params.n(), params.m, params.s);
    let g = engine.compute_green_at(&Transfer::new(&hopping, &field), params.m).unwrap();
    Setup { params, lattice, hopping, field, g }
}

/// Straightforward O(dim³) version of one accepted change at `site`.
fn dense_update(g: &CMat, site: usize, delta: &Mat4) -> (CMat, Complex64) {
    let dim = g.nrows();
    let p = pivots(site, dim / 4);
    let mut d = CMat::zeros(dim, dim);
    for r in 0..4 {
        for c in 0..4 {
            d[(p[r], p[c])] = delta[(r, c)];
        }
    }
    let a = identity(dim) + &d * (identity(dim) - g);
    let det = a.clone().determinant();
    (g * a.try_inverse().unwrap(), det)
}

fn proposed_delta(s: &Setup, site: usize, shift: [f64; 3]) -> Mat4 {
    let old = *s.field.get(site, s.params.m);
    delta_matrix(s.params.dtau, &old, &add(&old, &shift))
}

#[test]
fn test_woodbury_matches_dense_update() {
    let s = setup(&[]);
    let site = 5;
    let delta = proposed_delta(&s, site, [0.3, -0.2, 0.4]);
    let (reference, ref_det) = dense_update(&s.g, site, &delta);

    let det = det_ratio(&s.g, site, &delta);
    assert!((det - ref_det).norm() < 1e-10 * ref_det.norm(), "det ratio {det} vs {ref_det}");

    let mut g = s.g.clone();
    woodbury_update(&mut g, site, &delta).unwrap();
    let diff = max_abs_diff(&g, &reference);
    assert!(diff < 1e-10 * max_abs(&reference), "woodbury deviates by {diff:.3e}");
}

#[test]
fn test_iterative_matches_dense_update() {
    let s = setup(&[]);
    let site = 11;
    let delta = proposed_delta(&s, site, [-0.5, 0.1, 0.25]);
    let (reference, ref_det) = dense_update(&s.g, site, &delta);

    let mut g = s.g.clone();
    let det = iterative_update(&mut g, site, &delta);
    assert!((det - ref_det).norm() < 1e-10 * ref_det.norm(), "det ratio {det} vs {ref_det}");
    let diff = max_abs_diff(&g, &reference);
    assert!(diff < 1e-10 * max_abs(&reference), "iterative update deviates by {diff:.3e}");
}

#[test]
fn test_delayed_matches_sequential_updates() {
    let s = setup(&[]);
    let n = s.params.n();
    let (s1, s2) = (3, 9);
    let d1 = proposed_delta(&s, s1, [0.2, 0.2, -0.1]);
    let d2 = proposed_delta(&s, s2, [-0.3, 0.0, 0.35]);

    let (after_first, _) = dense_update(&s.g, s1, &d1);
    let (reference, _) = dense_update(&after_first, s2, &d2);

    let mut g = s.g.clone();
    let mut delayed = DelayedUpdates::default();
    let p1 = pivots(s1, n);
    let rows = delayed.rows(&g, &p1);
    delayed.accept(&g, &p1, rows, &d1).unwrap();
    let p2 = pivots(s2, n);
    let rows = delayed.rows(&g, &p2);
    delayed.accept(&g, &p2, rows, &d2).unwrap();
    assert_eq!(delayed.len(), 2);
    // nothing is applied before the flush
    assert_eq!(g, s.g);

    delayed.flush(&mut g);
    assert!(delayed.is_empty());
    let diff = max_abs_diff(&g, &reference);
    assert!(diff < 1e-9 * max_abs(&reference), "delayed update deviates by {diff:.3e}");
}

#[test]
fn test_update_methods_agree_on_a_slice() {
    let base = setup(&[]);
    let action = BosonAction::new(&base.lattice, base.params.m, base.params.dtau, base.params.r);
    let proposer = Proposer::new(base.params.spin_proposal_method, 0.5, true);
    let k = base.params.m;

    let run = |method: UpdateMethod, delay: usize| {
        let mut field = base.field.clone();
        let mut g = base.g.clone();
        let mut rng = RngWrapper::new(0x5EED);
        let mut updater = LocalUpdater::new(method, delay);
        let kind = proposer.move_kind(0);
        let acc = updater.update_slice(k, &mut g, &mut field, &action, &proposer, kind, &mut rng).unwrap();
        (field, g, acc)
    };

    let (f_wb, g_wb, acc_wb) = run(UpdateMethod::Woodbury, 1);
    let (f_it, g_it, acc_it) = run(UpdateMethod::Iterative, 1);
    let (f_dl, g_dl, acc_dl) = run(UpdateMethod::Delayed, 4);

    assert!(acc_wb > 0.0, "no proposal accepted; test is vacuous");
    assert_eq!(f_wb, f_it);
    assert_eq!(f_wb, f_dl);
    assert_eq!(acc_wb, acc_it);
    assert_eq!(acc_wb, acc_dl);
    let scale = max_abs(&g_wb);
    assert!(max_abs_diff(&g_wb, &g_it) < 1e-8 * scale, "iterative differs from woodbury");
    assert!(max_abs_diff(&g_wb, &g_dl) < 1e-8 * scale, "delayed differs from woodbury");

    // G is still the Green's function of slice k for the updated field
    let engine: GreenEngine = GreenEngine::new(4 * base.params.n(), base.params.m, base.params.s);
    let fresh = engine.compute_green_at(&Transfer::new(&base.hopping, &f_wb), k).unwrap();
    let diff = max_abs_diff(&g_wb, &fresh);
    assert!(diff < 1e-6 * max_abs(&fresh), "updated G deviates from scratch by {diff:.3e}");
}

#[test]
fn test_rejected_proposals_leave_state_untouched() {
    let s = setup(&[]);
    let action = BosonAction::new(&s.lattice, s.params.m, s.params.dtau, s.params.r);
    let mut proposer = Proposer::new(s.params.spin_proposal_method, 0.5, true);
    // boxes this wide change the quartic term by orders of magnitude
    proposer.phi_delta = 50.0;

    let mut field = s.field.clone();
    let mut g = s.g.clone();
    let mut rng = RngWrapper::new(7);
    let mut updater = LocalUpdater::new(UpdateMethod::Woodbury, 1);
    let kind = proposer.move_kind(0);
    let acc = updater.update_slice(3, &mut g, &mut field, &action, &proposer, kind, &mut rng).unwrap();

    assert_eq!(acc, 0.0);
    assert_eq!(updater.accepted, 0);
    assert_eq!(updater.attempted, s.params.n() as u64);
    assert_eq!(field, s.field);
    assert_eq!(g, s.g);
}

#[test]
fn test_acceptance_trace_matches_dense_replay() {
    // L = 4, dτ = 0.1, box proposals: replay the same random stream with a
    // full action difference and dense determinants
    let s = setup(&[("beta", "0.8")]);
    assert!((s.params.dtau - 0.1).abs() < 1e-15);
    let action = BosonAction::new(&s.lattice, s.params.m, s.params.dtau, s.params.r);
    let proposer = Proposer::new(s.params.spin_proposal_method, 0.5, false);
    let kind = proposer.move_kind(0);
    let k = s.params.m;
    let passes = 4;

    let mut field = s.field.clone();
    let mut g = s.g.clone();
    let mut rng = RngWrapper::new(0x7EACE);
    let mut updater = LocalUpdater::new(UpdateMethod::Woodbury, 1);
    let mut accepted_per_pass = Vec::new();
    for _ in 0..passes {
        let before = field.clone();
        updater.update_slice(k, &mut g, &mut field, &action, &proposer, kind, &mut rng).unwrap();
        let changed = (0..s.params.n()).filter(|&i| field.get(i, k) != before.get(i, k)).count();
        accepted_per_pass.push(changed);
    }

    let mut ref_field = s.field.clone();
    let mut ref_g = s.g.clone();
    let mut ref_rng = RngWrapper::new(0x7EACE);
    let mut trace = Vec::new();
    for _ in 0..passes {
        for site in 0..s.params.n() {
            let old = *ref_field.get(site, k);
            let new = [
                old[0] + ref_rng.rand_range(-proposer.phi_delta, proposer.phi_delta),
                old[1] + ref_rng.rand_range(-proposer.phi_delta, proposer.phi_delta),
                old[2] + ref_rng.rand_range(-proposer.phi_delta, proposer.phi_delta),
            ];
            let mut trial = ref_field.clone();
            trial.set(site, k, new);
            let ds = action.total(&trial) - action.total(&ref_field);
            let (g_new, det) = dense_update(&ref_g, site, &delta_matrix(s.params.dtau, &old, &new));
            let prob = (-ds).exp() * det.re;
            let accept = prob > 1.0 || ref_rng.rand01() < prob;
            if accept {
                ref_field = trial;
                ref_g = g_new;
            }
            trace.push(accept);
        }
    }

    let n = s.params.n();
    let ref_per_pass: Vec<usize> = trace.chunks(n).map(|c| c.iter().filter(|&&a| a).count()).collect();
    assert_eq!(accepted_per_pass, ref_per_pass, "acceptance counts per pass differ");
    assert_eq!(updater.accepted as usize, trace.iter().filter(|&&a| a).count());
    assert!(trace.iter().any(|&a| a) && trace.iter().any(|&a| !a), "trace is all-or-nothing: {trace:?}");
    assert_eq!(field, ref_field, "accept/reject sequence diverged from the replay");
    assert_eq!(rng, ref_rng, "random streams consumed differently");
    let diff = max_abs_diff(&g, &ref_g);
    assert!(diff < 1e-9 * max_abs(&ref_g), "G deviates from the dense replay by {diff:.3e}");
}
