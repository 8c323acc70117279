// Error analysis, jackknife accumulators and the offline evaluation

mod common;

use detsdw::accumulator::{ObservableHandlers, ScalarHandler, VectorHandler};
use detsdw::error_analysis::{average, jackknife, jackknife_block_estimates, naive_error, tau_int, ErrorEstimates};
use detsdw::evaluation::{average_evaluations, EvalOptions, Evaluation, SystemSize};
use detsdw::observables::{Observables, TimeSeries};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

#[test]
fn test_jackknife_of_the_mean_matches_block_error() {
    let data = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0];
    let blocks = jackknife_block_estimates(&data, 4, |x| x);
    assert_eq!(blocks.len(), 4);
    assert!((blocks[0] - 3.0).abs() < 1e-15);
    let block_means = [1.0, 2.0, 3.0, 4.0];
    let expected = naive_error(&block_means, average(&block_means));
    assert!((jackknife(&blocks) - expected).abs() < 1e-14);

    assert_eq!(jackknife(&[2.0]), 0.0);
    // trailing samples that do not fill a block are ignored
    let uneven = jackknife_block_estimates(&[1.0, 2.0, 3.0, 4.0, 100.0], 2, |x| x);
    assert_eq!(uneven, vec![3.5, 1.5]);
}

#[test]
fn test_tau_int_detects_autocorrelation() {
    let mut rng = Pcg64::seed_from_u64(0xDEADBEEF);
    let white: Vec<f64> = (0..4000).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let tau_white = tau_int(&white);
    assert!(tau_white < 1.0, "uncorrelated data gave tau_int = {tau_white:.3}");

    let mut x = 0.0;
    let correlated: Vec<f64> = (0..20000)
        .map(|_| {
            x = 0.9 * x + rng.gen_range(-1.0..1.0);
            x
        })
        .collect();
    let tau_corr = tau_int(&correlated);
    // AR(1) with ρ = 0.9: τ = (1 + ρ) / (2(1 - ρ)) = 9.5
    assert!(tau_corr > 6.0 && tau_corr < 14.0, "AR(1) series gave tau_int = {tau_corr:.3}");

    let est = ErrorEstimates::from_series(&correlated, 10);
    assert!(est.n_eff < 20000.0);
    assert!(est.jack_error > naive_error(&correlated, est.mean), "blocking must see the correlations");
    assert_eq!(tau_int(&[1.0; 5]), 0.5);
}

#[test]
fn test_scalar_handler_blocks_by_sweep() {
    let mut h = ScalarHandler::new("energy", 8, 4, true);
    assert_eq!(h.evaluate(), None);
    for (sweep, v) in [1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0].into_iter().enumerate() {
        h.insert_value(v, sweep);
    }
    let (mean, err) = h.evaluate().unwrap();
    assert_eq!(h.count(), 8);
    assert!((mean - 2.5).abs() < 1e-15);
    let expected = jackknife(&jackknife_block_estimates(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0], 4, |x| x));
    assert!((err - expected).abs() < 1e-14);
    assert_eq!(h.series().unwrap().samples().len(), 8);

    // a single block falls back to the naive error of the stored series
    let mut single = ScalarHandler::new("x", 4, 1, true);
    for (sweep, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        single.insert_value(v, sweep);
    }
    let (_, err) = single.evaluate().unwrap();
    assert!((err - naive_error(&[1.0, 2.0, 3.0, 4.0], 2.5)).abs() < 1e-15);
}

#[test]
fn test_uneven_blocks_are_weighted_by_their_own_counts() {
    // 10 sweeps in 3 blocks: the last block holds sweeps 6..=9
    let mut constant = ScalarHandler::new("x", 10, 3, false);
    let mut ramp = ScalarHandler::new("y", 10, 3, false);
    for sweep in 0..10 {
        constant.insert_value(1.0, sweep);
        ramp.insert_value(sweep as f64, sweep);
    }
    assert_eq!(constant.evaluate(), Some((1.0, 0.0)));
    let (mean, err) = ramp.evaluate().unwrap();
    assert!((mean - 4.5).abs() < 1e-15);
    let expected = jackknife(&[42.0 / 7.0, 33.0 / 7.0, 15.0 / 6.0]);
    assert!((err - expected).abs() < 1e-14, "jackknife error {err:.6} vs {expected:.6}");

    // measuring every second sweep puts 3 values in the first block and 2 in the second
    let mut sparse = ScalarHandler::new("x", 10, 2, false);
    let mut vector = VectorHandler::new("v", "site", 2, 10, 2);
    for sweep in (0..10).step_by(2) {
        sparse.insert_value(1.0, sweep);
        vector.insert_value(&[1.0, 2.0], sweep);
    }
    assert_eq!(sparse.evaluate(), Some((1.0, 0.0)));
    assert_eq!(vector.evaluate(), Some((vec![1.0, 2.0], vec![0.0, 0.0])));
}

#[test]
fn test_handlers_collect_observables_by_name() {
    let mut handlers = ObservableHandlers::new(4, 2, false);
    for sweep in 0..4 {
        let mut obs = Observables::default();
        obs.scalar("a", sweep as f64);
        obs.scalar("b", 1.0);
        obs.vector("v", "site", vec![sweep as f64, 2.0]);
        handlers.insert(&obs, sweep);
    }
    let results = handlers.scalar_results();
    assert_eq!(results["a"].0, 1.5);
    assert_eq!(results["b"], (1.0, 0.0));
    assert_eq!(handlers.vectors().len(), 1);
    let (mean, _) = handlers.vectors()[0].evaluate().unwrap();
    assert_eq!(mean, vec![1.5, 2.0]);
    assert!(handlers.scalar("a").unwrap().series().is_none());
}

#[test]
fn test_series_selection() {
    let samples: Vec<f64> = (0..10).map(f64::from).collect();
    let opts = EvalOptions { discard: 2, read: 5, subsample: 2, ..EvalOptions::default() };
    assert_eq!(opts.select(&samples), vec![2.0, 4.0, 6.0]);
    let all = EvalOptions::default();
    assert_eq!(all.select(&samples).len(), 10);
    let past_end = EvalOptions { discard: 20, ..EvalOptions::default() };
    assert!(past_end.select(&samples).is_empty());
    assert!(EvalOptions { subsample: 0, ..EvalOptions::default() }.check().is_err());
}

#[test]
fn test_series_file_roundtrip() {
    let dir = common::scratch_dir("series");
    let path = dir.join("normPhi.series");
    let ts = TimeSeries::from_samples(vec![0.125, -3.5, 1e-9]);
    ts.write(&path).unwrap();
    let back = TimeSeries::read(&path).unwrap();
    assert_eq!(back.samples(), ts.samples());
    assert!((back.moment2() - ts.moment2()).abs() < 1e-15);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_order_parameter_cumulants() {
    let size = SystemSize { n: 16, m: 10, dtau: 0.1 };
    let data = [1.0, 2.0, 1.0, 2.0];
    let mut eval = Evaluation::new(2);
    eval.add_series("normMeanPhi", &data, &EvalOptions { jk_blocks: 2, ..EvalOptions::default() });
    eval.add_phi_derived(size);

    let (m1, m2, m4) = (1.5, 2.5, 8.5);
    let e = &eval.estimates;
    assert!((e["normMeanPhiSquared"] - m2).abs() < 1e-15);
    assert!((e["normMeanPhiFourth"] - m4).abs() < 1e-15);
    assert!((e["phiBinder"] - (1.0 - 3.0 * m4 / (5.0 * m2 * m2))).abs() < 1e-14);
    assert!((e["phiBinderRatio"] - m4 / (m2 * m2)).abs() < 1e-14);
    assert!((e["phiSusceptibilityPart"] - 16.0 * m2).abs() < 1e-12);
    assert!((e["phiSusceptibility"] - 16.0 * (m2 - m1 * m1)).abs() < 1e-12);
    // both blocks are identical, so every error vanishes
    assert!(eval.errors().values().all(|err| err.abs() < 1e-12));
    assert!(eval.tauints.contains_key("normMeanPhi"));
}

#[test]
fn test_boundary_condition_average_recomputes_cumulants() {
    let size = SystemSize { n: 4, m: 5, dtau: 0.2 };
    let opts = EvalOptions::default();
    let mut a = Evaluation::new(1);
    a.add_series("normMeanPhi", &[1.0, 1.0], &opts);
    a.add_phi_derived(size);
    let mut b = Evaluation::new(1);
    b.add_series("normMeanPhi", &[3.0, 3.0], &opts);
    b.add_phi_derived(size);

    let avg = average_evaluations(&[a, b], size).unwrap();
    let (m1, m2, m4) = (2.0, 5.0, 41.0);
    assert_eq!(avg.estimates["normMeanPhi"], m1);
    assert_eq!(avg.estimates["normMeanPhiSquared"], m2);
    assert_eq!(avg.estimates["normMeanPhiFourth"], m4);
    assert!((avg.estimates["phiSusceptibility"] - 4.0 * (m2 - m1 * m1)).abs() < 1e-12);
    assert!((avg.estimates["phiBinderRatio"] - m4 / (m2 * m2)).abs() < 1e-12);
    assert!(average_evaluations(&[], size).is_err());
}
