// Parameter parsing and validation

mod common;

use common::param_map;
use detsdw::error::SdwError;
use detsdw::params::{BoundaryCondition, CheckerboardMethod, McParams, ModelParams, ParamMap, SpinProposalMethod, UpdateMethod};

fn parse(extra: &[(&str, &str)]) -> Result<ModelParams, SdwError> {
    ModelParams::from_map(&param_map(4, 20, 2.0, extra))
}

#[test]
fn test_complete_parameter_set() {
    let params = parse(&[("bc", "apbc-xy"), ("spinProposalMethod", "rotate_then_scale")]).unwrap();
    assert_eq!(params.l, 4);
    assert_eq!(params.n(), 16);
    assert_eq!(params.m, 20);
    assert!((params.dtau - 0.1).abs() < 1e-15);
    assert_eq!(params.bc, BoundaryCondition::ApbcXY);
    assert_eq!(params.update_method, UpdateMethod::Woodbury);
    assert_eq!(params.spin_proposal_method, SpinProposalMethod::RotateThenScale);
    assert_eq!(params.checkerboard, CheckerboardMethod::None);
    assert!(!params.uses_checkerboard());
    assert!(params.adapt_scale_variance);
    assert_eq!(params.global_update_interval, 1);
    assert!(!params.wolff_cluster_update);
}

#[test]
fn test_missing_required_parameter() {
    let mut map = param_map(4, 20, 2.0, &[]);
    let mut stripped = ParamMap::new();
    for key in map.specified() {
        if key != "txver" {
            stripped.set(&key, map.get_str(&key).unwrap());
        }
    }
    match ModelParams::from_map(&stripped) {
        Err(SdwError::ParameterMissing(name)) => assert_eq!(name, "txver"),
        other => panic!("expected missing txver, got {other:?}"),
    }

    // neither m nor dtau
    map = param_map(4, 20, 2.0, &[]);
    let mut no_m = ParamMap::new();
    for key in map.specified().into_iter().filter(|k| k != "m") {
        no_m.set(&key, map.get_str(&key).unwrap());
    }
    assert!(matches!(ModelParams::from_map(&no_m), Err(SdwError::ParameterMissing(name)) if name == "m"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let wrong = |extra: &[(&str, &str)], name: &str| match parse(extra) {
        Err(SdwError::ParameterWrong { name: got, .. }) => assert_eq!(got, name, "{extra:?}"),
        other => panic!("{extra:?}: expected wrong {name}, got {other:?}"),
    };
    wrong(&[("bc", "open")], "bc");
    wrong(&[("updateMethod", "magic")], "updateMethod");
    wrong(&[("spinProposalMethod", "flip")], "spinProposalMethod");
    wrong(&[("L", "0")], "L");
    wrong(&[("beta", "-1")], "beta");
    wrong(&[("s", "3")], "s");
    wrong(&[("updateMethod", "delayed"), ("delaySteps", "17")], "delaySteps");
    wrong(&[("updateMethod", "delayed"), ("delaySteps", "0")], "delaySteps");
    wrong(&[("L", "5"), ("checkerboard", "true")], "L");
    wrong(&[("checkerboard", "true"), ("checkerboardMethod", "fancy")], "checkerboardMethod");
    wrong(&[("rescale", "maybe")], "rescale");
    wrong(&[("globalShift", "true"), ("globalUpdateInterval", "0")], "globalUpdateInterval");
    wrong(&[("repeatUpdateInSlice", "0")], "repeatUpdateInSlice");
    wrong(&[("repeatUpdateInSlice", "-2")], "repeatUpdateInSlice");
}

#[test]
fn test_delayed_updates_need_delay_steps() {
    assert!(matches!(
        parse(&[("updateMethod", "delayed")]),
        Err(SdwError::ParameterMissing(name)) if name == "delaySteps"
    ));
    let params = parse(&[("updateMethod", "delayed"), ("delaySteps", "16")]).unwrap();
    assert_eq!(params.delay_steps, 16);
}

#[test]
fn test_time_discretization() {
    // dtau instead of m
    let mut map = ParamMap::new();
    for key in param_map(4, 1, 2.0, &[]).specified() {
        if key != "m" {
            map.set(&key, param_map(4, 1, 2.0, &[]).get_str(&key).unwrap());
        }
    }
    map.set("dtau", 0.125);
    let params = ModelParams::from_map(&map).unwrap();
    assert_eq!(params.m, 16);
    assert!((params.dtau - 0.125).abs() < 1e-15);
    // largest divisor of m not above 10
    assert_eq!(params.s, 8);

    assert_eq!(parse(&[]).unwrap().s, 10);
    assert_eq!(ModelParams::from_map(&param_map(4, 7, 1.0, &[])).unwrap().s, 7);
    assert_eq!(ModelParams::from_map(&param_map(4, 13, 1.0, &[])).unwrap().s, 1);
    assert_eq!(parse(&[("s", "5")]).unwrap().s, 5);
}

#[test]
fn test_parameter_file_and_overrides() {
    let dir = common::scratch_dir("params");
    let path = dir.join("simulation.conf");
    std::fs::write(&path, "# SDW run\nL = 6\nbeta = 3 # inverse temperature\n\nbc=apbc-x\n").unwrap();
    let mut map = ParamMap::from_file(&path).unwrap();
    assert_eq!(map.get::<usize>("L").unwrap(), Some(6));
    assert_eq!(map.get_str("bc"), Some("apbc-x"));
    map.insert_assignment("L=8").unwrap();
    assert_eq!(map.require::<usize>("L").unwrap(), 8);
    assert!(matches!(map.insert_assignment("L8"), Err(SdwError::Parse { .. })));
    assert!(matches!(map.get::<usize>("bc"), Err(SdwError::ParameterWrong { .. })));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_monte_carlo_parameters() {
    let mut map = ParamMap::new();
    map.set("sweeps", 100);
    map.set("jkBlocks", 10);
    let mc = McParams::from_map(&map).unwrap();
    assert_eq!(mc.sweeps, 100);
    assert_eq!(mc.jk_blocks, 10);
    assert_eq!(mc.measure_interval, 1);

    map.set("jkBlocks", 200);
    assert!(matches!(McParams::from_map(&map), Err(SdwError::ParameterWrong { name, .. }) if name == "jkBlocks"));
    map.set("jkBlocks", 1);
    map.set("measureInterval", 0);
    assert!(matches!(McParams::from_map(&map), Err(SdwError::ParameterWrong { name, .. }) if name == "measureInterval"));
}
