//! Canned networks used by the command line scenarios and the tests.

use log::info;
use std::path::Path;

use crate::builder::{BuiltNetwork, NetworkBuilder};
use crate::case::Network;
use crate::config::NetworkConfig;
use crate::error::GridResult;
use crate::std_types::{LineType, TrafoType};

/// Default path of the JSON network used by the data-driven scenarios.
pub const DEFAULT_CONFIG_PATH: &str = "data/network_config.json";

/// A 20 kV bus feeding a short 0.4 kV cable through a distribution transformer.
pub fn simple_network() -> GridResult<Network> {
    let mut net = Network::new("Simple Network");

    let main_bus = net.create_bus("Main Bus", 20.0);
    let load_bus_1 = net.create_bus("Load Bus 1", 0.4);
    let load_bus_2 = net.create_bus("Load Bus 2", 0.4);

    net.create_ext_grid(main_bus, 1.02, 0.0, "External Grid")?;
    net.create_transformer(main_bus, load_bus_1, "0.4 MVA 20/0.4 kV", "Transformer")?;
    net.create_load(load_bus_1, 0.08, 0.04, "Load 1")?;
    net.create_load(load_bus_2, 0.07, 0.03, "Load 2")?;
    net.create_line(load_bus_1, load_bus_2, 0.1, "NAYY 4x50 SE", "Line")?;

    Ok(net)
}

/// Knobs of [`complex_network`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexNetworkParams {
    pub bus_voltage_pu: f64,
    pub residential_load_p_mw: f64,
    pub residential_load_q_mvar: f64,
    pub commercial_load_p_mw: f64,
    pub commercial_load_q_mvar: f64,
    pub solar_p_mw: f64,
    pub main_line_length_km: f64,
    pub feeder_section1_length_km: f64,
    pub feeder_section2_length_km: f64,
    pub trafo_terminal_station_sn_mva: f64,
    pub trafo_zone_substation_sn_mva: f64,
    pub network_name: String,
}

impl Default for ComplexNetworkParams {
    fn default() -> Self {
        Self {
            bus_voltage_pu: 1.02,
            residential_load_p_mw: 0.15,
            residential_load_q_mvar: 0.05,
            commercial_load_p_mw: 0.25,
            commercial_load_q_mvar: 0.1,
            solar_p_mw: 0.05,
            main_line_length_km: 50.0,
            feeder_section1_length_km: 2.5,
            feeder_section2_length_km: 1.5,
            trafo_terminal_station_sn_mva: 100.0,
            trafo_zone_substation_sn_mva: 25.0,
            network_name: "Simplified Melbourne Grid Section".to_string(),
        }
    }
}

fn line_type(c_nf_per_km: f64, r_ohm_per_km: f64, x_ohm_per_km: f64, max_i_ka: f64) -> LineType {
    LineType {
        r_ohm_per_km,
        x_ohm_per_km,
        c_nf_per_km,
        g_us_per_km: 0.0,
        max_i_ka,
    }
}

fn trafo_type(
    sn_mva: f64,
    (vn_hv_kv, vn_lv_kv): (f64, f64),
    (vk_percent, vkr_percent): (f64, f64),
    (pfe_kw, i0_percent): (f64, f64),
) -> TrafoType {
    TrafoType {
        sn_mva,
        vn_hv_kv,
        vn_lv_kv,
        vk_percent,
        vkr_percent,
        pfe_kw,
        i0_percent,
        shift_degree: 0.0,
        tap_step_percent: 0.0,
        tap_neutral: 0.0,
    }
}

/// 220 kV infeed down to two 0.4 kV customer buses, with rooftop solar.
pub fn complex_network(params: &ComplexNetworkParams) -> GridResult<Network> {
    let p = params;
    let mut net = Network::new(p.network_name.as_str());

    net.std_types
        .add_line("220kV_line", line_type(11.14, 0.066, 0.303, 0.795));
    net.std_types
        .add_line("11kV_line", line_type(10.0, 0.25, 0.35, 0.350));

    let terminal_type = format!("{} MVA 220/66 kV", p.trafo_terminal_station_sn_mva);
    let zone_type = format!("{} MVA 66/11 kV", p.trafo_zone_substation_sn_mva);
    net.std_types.add_trafo(
        terminal_type.clone(),
        trafo_type(p.trafo_terminal_station_sn_mva, (220.0, 66.0), (12.0, 0.26), (50.0, 0.06)),
    );
    net.std_types.add_trafo(
        zone_type.clone(),
        trafo_type(p.trafo_zone_substation_sn_mva, (66.0, 11.0), (10.0, 0.3), (20.0, 0.07)),
    );
    net.std_types.add_trafo(
        "0.4 MVA 11/0.4 kV",
        trafo_type(0.4, (11.0, 0.4), (4.0, 0.5), (1.0, 0.2)),
    );
    net.std_types.add_trafo(
        "0.63 MVA 11/0.4 kV",
        trafo_type(0.63, (11.0, 0.4), (5.0, 0.6), (1.5, 0.25)),
    );

    // Transmission and sub-transmission
    let infeed = net.create_bus("220kV Infeed (NEM)", 220.0);
    net.create_ext_grid(infeed, p.bus_voltage_pu, 0.0, "External Grid")?;
    let terminal = net.create_bus("220kV Terminal Station", 220.0);
    let subtrans = net.create_bus("66kV Sub-transmission", 66.0);
    net.create_line(
        infeed,
        terminal,
        p.main_line_length_km,
        "220kV_line",
        "Main Transmission Line",
    )?;
    net.create_transformer(terminal, subtrans, &terminal_type, "Terminal Station Trafo")?;

    // Medium voltage distribution
    let dist = net.create_bus("11kV Distribution Feeder Start", 11.0);
    net.create_transformer(subtrans, dist, &zone_type, "Zone Substation Trafo")?;
    let mid = net.create_bus("11kV Feeder Midpoint", 11.0);
    let end = net.create_bus("11kV Feeder End", 11.0);
    net.create_line(dist, mid, p.feeder_section1_length_km, "11kV_line", "Feeder Section 1")?;
    net.create_line(mid, end, p.feeder_section2_length_km, "11kV_line", "Feeder Section 2")?;

    // Low voltage customers
    let lv_1 = net.create_bus("LV Bus - Residential Area 1", 0.4);
    net.create_transformer(mid, lv_1, "0.4 MVA 11/0.4 kV", "Pole-top Trafo 1")?;
    let lv_2 = net.create_bus("LV Bus - Commercial Area", 0.4);
    net.create_transformer(end, lv_2, "0.63 MVA 11/0.4 kV", "Pad-mount Trafo 2")?;

    net.create_load(
        lv_1,
        p.residential_load_p_mw,
        p.residential_load_q_mvar,
        "Residential Load",
    )?;
    net.create_load(
        lv_2,
        p.commercial_load_p_mw,
        p.commercial_load_q_mvar,
        "Commercial Load",
    )?;
    net.create_sgen(lv_1, p.solar_p_mw, 0.0, "Rooftop Solar")?;

    Ok(net)
}

/// Builds the network described by a JSON configuration file.
pub fn data_driven(path: impl AsRef<Path>) -> GridResult<BuiltNetwork> {
    let path = path.as_ref();
    info!("Loading network configuration from {}", path.display());
    let config = NetworkConfig::from_path(path)?;
    NetworkBuilder::from_config(&config)
}

// IEEE 14-bus test case on a 100 MVA base.
// (from, to, r, x, b) in per unit
const CASE14_LINES: [(usize, usize, f64, f64, f64); 17] = [
    (1, 2, 0.01938, 0.05917, 0.0528),
    (1, 5, 0.05403, 0.22304, 0.0492),
    (2, 3, 0.04699, 0.19797, 0.0438),
    (2, 4, 0.05811, 0.17632, 0.0340),
    (2, 5, 0.05695, 0.17388, 0.0346),
    (3, 4, 0.06701, 0.17103, 0.0128),
    (4, 5, 0.01335, 0.04211, 0.0),
    (6, 11, 0.09498, 0.19890, 0.0),
    (6, 12, 0.12291, 0.25581, 0.0),
    (6, 13, 0.06615, 0.13027, 0.0),
    (7, 8, 0.0, 0.17615, 0.0),
    (7, 9, 0.0, 0.11001, 0.0),
    (9, 10, 0.03181, 0.08450, 0.0),
    (9, 14, 0.12711, 0.27038, 0.0),
    (10, 11, 0.08205, 0.19207, 0.0),
    (12, 13, 0.22092, 0.19988, 0.0),
    (13, 14, 0.17093, 0.34802, 0.0),
];

// (hv, lv, x, ratio)
const CASE14_TRAFOS: [(usize, usize, f64, f64); 3] = [
    (4, 7, 0.20912, 0.978),
    (4, 9, 0.55618, 0.969),
    (5, 6, 0.25202, 0.932),
];

// (bus, p_mw, q_mvar)
const CASE14_LOADS: [(usize, f64, f64); 11] = [
    (2, 21.7, 12.7),
    (3, 94.2, 19.0),
    (4, 47.8, -3.9),
    (5, 7.6, 1.6),
    (6, 11.2, 7.5),
    (9, 29.5, 16.6),
    (10, 9.0, 5.8),
    (11, 3.5, 1.8),
    (12, 6.1, 1.6),
    (13, 13.5, 5.8),
    (14, 14.9, 5.0),
];

// (bus, p_mw, vm_pu)
const CASE14_GENS: [(usize, f64, f64); 4] = [
    (2, 40.0, 1.045),
    (3, 0.0, 1.01),
    (6, 0.0, 1.07),
    (8, 0.0, 1.09),
];

// (bus, q_mvar) consumed at 1.0 pu
const CASE14_SHUNTS: [(usize, f64); 1] = [(9, -19.0)];

const CASE14_HV_KV: f64 = 135.0;
const CASE14_LV_KV: f64 = 14.0;

/// The IEEE 14-bus system. Buses 1 to 5 form the 135 kV grid, the rest sit
/// behind the three tap-changing transformers.
pub fn case14() -> GridResult<Network> {
    let mut net = Network::new("IEEE Case 14");
    net.sn_mva = 100.0;
    net.f_hz = 60.0;

    for i in 1..=14 {
        let vn_kv = if i <= 5 { CASE14_HV_KV } else { CASE14_LV_KV };
        net.create_bus(format!("Bus {}", i), vn_kv);
    }
    net.create_ext_grid(0, 1.06, 0.0, "External Grid")?;

    let omega = 2.0 * std::f64::consts::PI * net.f_hz;
    for (from, to, r, x, b) in CASE14_LINES {
        let vn_kv = net.buses[from - 1].vn_kv;
        let zb = vn_kv * vn_kv / net.sn_mva;
        let params = LineType {
            r_ohm_per_km: r * zb,
            x_ohm_per_km: x * zb,
            c_nf_per_km: b / zb / omega * 1e9,
            g_us_per_km: 0.0,
            max_i_ka: 99999.0,
        };
        net.create_line_from_parameters(
            from - 1,
            to - 1,
            1.0,
            "case14",
            params,
            format!("Line {}-{}", from, to),
        )?;
    }

    for (hv, lv, x, ratio) in CASE14_TRAFOS {
        let params = TrafoType {
            sn_mva: net.sn_mva,
            vn_hv_kv: CASE14_HV_KV,
            vn_lv_kv: CASE14_LV_KV,
            vk_percent: x * 100.0,
            vkr_percent: 0.0,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            shift_degree: 0.0,
            tap_step_percent: 1.0,
            tap_neutral: 0.0,
        };
        let index = net.create_transformer_from_parameters(
            hv - 1,
            lv - 1,
            "case14",
            params,
            format!("Trafo {}-{}", hv, lv),
        )?;
        net.trafos[index].tap_pos = (ratio - 1.0) * 100.0;
    }

    for (bus, p_mw, q_mvar) in CASE14_LOADS {
        net.create_load(bus - 1, p_mw, q_mvar, format!("Load {}", bus))?;
    }
    for (bus, p_mw, vm_pu) in CASE14_GENS {
        net.create_gen(bus - 1, p_mw, vm_pu, format!("Gen {}", bus))?;
    }
    for (bus, q_mvar) in CASE14_SHUNTS {
        net.create_shunt(bus - 1, 0.0, q_mvar, format!("Shunt {}", bus))?;
    }

    Ok(net)
}
