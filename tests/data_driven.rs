use std::io::Write;
use std::path::PathBuf;

use gridcheck::case::BranchKind;
use gridcheck::scenarios::data_driven;
use gridcheck::{
    GridError, NetworkBuilder, NetworkConfig, NewtonRaphson, calc_sc, run_contingency,
    run_power_flow,
};

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/network_config.json")
}

const SMALL: &str = r#"{
    "name": "Tempfile Grid",
    "buses": [
        {"name": "MV", "vn_kv": 20},
        {"name": "LV", "vn_kv": 0.4},
        {"name": "LV End", "vn_kv": 0.4}
    ],
    "ext_grids": [{"name": "Grid", "bus": "MV", "vm_pu": 1.02, "s_sc_max_mva": 500, "rx_max": 0.1}],
    "transformers": [{"name": "T1", "hv_bus": "MV", "lv_bus": "LV", "std_type": "0.63 MVA 20/0.4 kV"}],
    "lines": [{"name": "Cable", "from_bus": "LV", "to_bus": "LV End", "length_km": 0.2, "std_type": "NAYY 4x150 SE"}],
    "loads": [{"name": "Shop", "bus": "LV End", "p_mw": 0.1, "q_mvar": 0.03}]
}"#;

#[test]
fn builds_and_solves_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SMALL.as_bytes()).unwrap();

    let built = data_driven(file.path()).unwrap();
    assert_eq!(built.network.name, "Tempfile Grid");
    assert_eq!(built.buses.resolve("LV End"), Some(2));

    let outcome = run_power_flow(&built.network).unwrap();
    assert!(outcome.converged);
    let res = outcome.results().unwrap();
    assert!(res.bus[2].vm_pu < res.bus[1].vm_pu);
}

#[test]
fn building_twice_gives_the_same_model() {
    let config = NetworkConfig::from_path(sample_config()).unwrap();
    let a = NetworkBuilder::from_config(&config).unwrap();
    let b = NetworkBuilder::from_config(&config).unwrap();
    assert_eq!(
        serde_json::to_value(&a.network).unwrap(),
        serde_json::to_value(&b.network).unwrap()
    );
    assert_eq!(a.buses, b.buses);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = data_driven(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, GridError::Io(_)));
}

#[test]
fn sample_network_converges() {
    let built = data_driven(sample_config()).unwrap();
    assert_eq!(built.network.buses.len(), 8);
    let outcome = run_power_flow(&built.network).unwrap();
    assert!(outcome.converged);
}

#[test]
fn contingency_covers_every_branch_once() {
    let net = data_driven(sample_config()).unwrap().network;
    let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
    assert_eq!(res.cases.len(), net.lines.len() + net.trafos.len());
    for line in &net.lines {
        let n = res
            .cases
            .iter()
            .filter(|c| c.element == BranchKind::Line && c.index == line.index)
            .count();
        assert_eq!(n, 1);
    }
    for trafo in &net.trafos {
        let case = res.case(BranchKind::Trafo, trafo.index).unwrap();
        assert_eq!(case.name, trafo.name);
    }
    // the sweep works on copies
    assert!(net.lines.iter().all(|l| l.in_service));
    assert!(net.trafos.iter().all(|t| t.in_service));

    // losing the main line leaves everything downstream unsupplied
    let main = res.case(BranchKind::Line, 0).unwrap();
    let bus = &main.results.as_ref().unwrap().bus;
    assert!(bus[0].vm_pu.is_finite());
    assert!(bus[1..].iter().all(|b| b.vm_pu.is_nan()));
}

#[test]
fn short_circuit_on_sample_network() {
    let built = data_driven(sample_config()).unwrap();
    let all = calc_sc(&built.network, None).unwrap();
    assert_eq!(all.bus.len(), 8);
    assert!(all.bus.iter().all(|b| b.ikss_ka.is_finite() && b.ikss_ka > 0.0));
    // 10 GVA at 220 kV
    let infeed = &all.bus[0];
    assert!((infeed.skss_mw - 10000.0).abs() / 10000.0 < 0.01);

    let bus = built.buses.require("11kV Feeder End", "test").unwrap();
    let one = calc_sc(&built.network, Some(bus)).unwrap();
    assert_eq!(one.fault_buses, vec![bus]);
    assert!((one.bus[0].ikss_ka - all.bus[bus].ikss_ka).abs() < 1e-9);
}
