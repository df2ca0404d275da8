//! Turns a [`NetworkConfig`] into a [`Network`], resolving bus names.

use log::{debug, info};
use std::collections::HashMap;

use crate::case::Network;
use crate::config::NetworkConfig;
use crate::error::{GridError, GridResult};

/// Name -> bus index table filled while buses are created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusLookup {
    map: HashMap<String, usize>,
}

impl BusLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, index: usize) -> GridResult<()> {
        if self.map.contains_key(name) {
            return Err(GridError::DuplicateBus(name.to_string()));
        }
        self.map.insert(name.to_string(), index);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.map.get(name).copied()
    }

    /// Like [`BusLookup::resolve`] but turns a miss into an error naming `element`.
    pub fn require(&self, name: &str, element: &str) -> GridResult<usize> {
        self.resolve(name).ok_or_else(|| GridError::UnknownBus {
            name: name.to_string(),
            element: element.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BuiltNetwork {
    pub network: Network,
    pub buses: BusLookup,
}

pub struct NetworkBuilder;

impl NetworkBuilder {
    /// Builds a network, failing on the first unresolved bus or type name.
    pub fn from_config(config: &NetworkConfig) -> GridResult<BuiltNetwork> {
        let mut net = Network::new(config.name.clone());
        if !(config.sn_mva > 0.0 && config.sn_mva.is_finite()) {
            return Err(GridError::InvalidParameter {
                element: format!("network '{}'", config.name),
                reason: format!("sn_mva must be positive, got {}", config.sn_mva),
            });
        }
        net.sn_mva = config.sn_mva;
        if let Some(f_hz) = config.f_hz {
            net.f_hz = f_hz;
        }

        let mut buses = BusLookup::new();
        for def in &config.buses {
            if !(def.vn_kv > 0.0 && def.vn_kv.is_finite()) {
                return Err(GridError::InvalidParameter {
                    element: format!("bus '{}'", def.name),
                    reason: format!("vn_kv must be positive, got {}", def.vn_kv),
                });
            }
            let index = net.create_bus(def.name.clone(), def.vn_kv);
            buses.insert(&def.name, index)?;
        }
        debug!("Created {:>4} buses", buses.len());

        for def in &config.std_lines {
            net.std_types.add_line(def.name.clone(), def.data.clone());
        }
        for def in &config.std_trafos {
            net.std_types.add_trafo(def.name.clone(), def.data.clone());
        }

        for (i, def) in config.ext_grids.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("ExtGrid {}", i));
            let bus = buses.require(&def.bus, &format!("external grid '{}'", name))?;
            let index = net.create_ext_grid(bus, def.vm_pu, def.va_degree, name)?;
            let ext_grid = &mut net.ext_grids[index];
            ext_grid.s_sc_max_mva = def.s_sc_max_mva;
            ext_grid.s_sc_min_mva = def.s_sc_min_mva;
            ext_grid.rx_max = def.rx_max;
            ext_grid.rx_min = def.rx_min;
        }

        for (i, def) in config.lines.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("Line {}", i));
            let element = format!("line '{}'", name);
            let from_bus = buses.require(&def.from_bus, &element)?;
            let to_bus = buses.require(&def.to_bus, &element)?;
            let index = net.create_line(from_bus, to_bus, def.length_km, &def.std_type, name)?;
            net.set_line_rating(index, def.parallel, def.df)?;
        }

        for (i, def) in config.transformers.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("Trafo {}", i));
            let element = format!("transformer '{}'", name);
            let hv_bus = buses.require(&def.hv_bus, &element)?;
            let lv_bus = buses.require(&def.lv_bus, &element)?;
            let index = net.create_transformer(hv_bus, lv_bus, &def.std_type, name)?;
            if let Some(tap_pos) = def.tap_pos {
                net.trafos[index].tap_pos = tap_pos;
            }
        }

        for (i, def) in config.loads.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("Load {}", i));
            let bus = buses.require(&def.bus, &format!("load '{}'", name))?;
            let index = net.create_load(bus, def.p_mw, def.q_mvar, name)?;
            net.loads[index].scaling = def.scaling;
        }

        for (i, def) in config.sgens.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("SGen {}", i));
            let bus = buses.require(&def.bus, &format!("static generator '{}'", name))?;
            let index = net.create_sgen(bus, def.p_mw, def.q_mvar, name)?;
            let sgen = &mut net.sgens[index];
            sgen.sn_mva = def.sn_mva;
            sgen.k = def.k;
        }

        for (i, def) in config.gens.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("Gen {}", i));
            let bus = buses.require(&def.bus, &format!("generator '{}'", name))?;
            net.create_gen(bus, def.p_mw, def.vm_pu, name)?;
        }

        for (i, def) in config.shunts.iter().enumerate() {
            let name = def.name.clone().unwrap_or_else(|| format!("Shunt {}", i));
            let bus = buses.require(&def.bus, &format!("shunt '{}'", name))?;
            net.create_shunt(bus, def.p_mw, def.q_mvar, name)?;
        }

        info!(
            "Built network '{}': {} buses, {} lines, {} transformers",
            net.name,
            net.buses.len(),
            net.lines.len(),
            net.trafos.len()
        );

        Ok(BuiltNetwork {
            network: net,
            buses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> NetworkConfig {
        NetworkConfig::from_json_str(text).unwrap()
    }

    #[test]
    fn resolves_bus_names_to_indices() {
        let built = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "HV", "vn_kv": 20}, {"name": "LV", "vn_kv": 0.4}],
                "ext_grids": [{"bus": "HV", "vm_pu": 1.02}],
                "transformers": [{"hv_bus": "HV", "lv_bus": "LV", "std_type": "0.4 MVA 20/0.4 kV"}],
                "loads": [{"bus": "LV", "p_mw": 0.1, "q_mvar": 0.02}]
            }"#,
        ))
        .unwrap();
        assert_eq!(built.buses.resolve("LV"), Some(1));
        assert_eq!(built.buses.resolve("MV"), None);
        assert_eq!(built.network.trafos[0].hv_bus, 0);
        assert_eq!(built.network.trafos[0].lv_bus, 1);
        assert_eq!(built.network.loads[0].bus, 1);
        assert_eq!(built.network.ext_grids[0].vm_pu, 1.02);
    }

    #[test]
    fn unresolved_bus_names_offending_name() {
        let err = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 0.4}],
                "loads": [{"name": "L1", "bus": "Nowhere", "p_mw": 0.1}]
            }"#,
        ))
        .unwrap_err();
        match err {
            GridError::UnknownBus { name, element } => {
                assert_eq!(name, "Nowhere");
                assert_eq!(element, "load 'L1'");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unresolved_std_type_names_offending_name() {
        let err = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 11}, {"name": "B", "vn_kv": 11}],
                "lines": [{"from_bus": "A", "to_bus": "B", "length_km": 1, "std_type": "missing"}]
            }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GridError::UnknownStdType { ref name, .. } if name == "missing"));
    }

    #[test]
    fn duplicate_bus_names_are_rejected() {
        let err = NetworkBuilder::from_config(&config(
            r#"{"buses": [{"name": "A", "vn_kv": 11}, {"name": "A", "vn_kv": 0.4}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GridError::DuplicateBus(ref n) if n == "A"));
    }

    #[test]
    fn shunts_attach_to_named_bus() {
        let built = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 11}, {"name": "B", "vn_kv": 11}],
                "shunts": [{"bus": "B", "q_mvar": -0.5}]
            }"#,
        ))
        .unwrap();
        let shunt = &built.network.shunts[0];
        assert_eq!(shunt.bus, 1);
        assert_eq!((shunt.p_mw, shunt.q_mvar), (0.0, -0.5));
        assert_eq!(shunt.name, "Shunt 0");
    }

    #[test]
    fn line_without_parallel_systems_is_rejected() {
        let err = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 0.4}, {"name": "B", "vn_kv": 0.4}],
                "lines": [{"name": "L1", "from_bus": "A", "to_bus": "B", "length_km": 0.1,
                           "std_type": "NAYY 4x150 SE", "parallel": 0}]
            }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GridError::InvalidParameter { ref element, .. } if element == "line 'L1'"));
    }

    #[test]
    fn derating_outside_unit_interval_is_rejected() {
        for df in ["0", "-0.5", "1.5"] {
            let text = format!(
                r#"{{
                    "buses": [{{"name": "A", "vn_kv": 0.4}}, {{"name": "B", "vn_kv": 0.4}}],
                    "lines": [{{"from_bus": "A", "to_bus": "B", "length_km": 0.1,
                               "std_type": "NAYY 4x150 SE", "df": {}}}]
                }}"#,
                df
            );
            let err = NetworkBuilder::from_config(&config(&text)).unwrap_err();
            assert!(matches!(err, GridError::InvalidParameter { .. }), "df = {df}");
        }
    }

    #[test]
    fn line_rating_is_taken_from_config() {
        let built = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 0.4}, {"name": "B", "vn_kv": 0.4}],
                "lines": [{"from_bus": "A", "to_bus": "B", "length_km": 0.1,
                           "std_type": "NAYY 4x150 SE", "parallel": 2, "df": 0.8}]
            }"#,
        ))
        .unwrap();
        let line = &built.network.lines[0];
        assert!((line.rated_i_ka() - 0.27 * 2.0 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn non_positive_bases_are_rejected() {
        let err = NetworkBuilder::from_config(&config(
            r#"{"buses": [{"name": "A", "vn_kv": 0}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GridError::InvalidParameter { ref element, .. } if element == "bus 'A'"));

        let err = NetworkBuilder::from_config(&config(
            r#"{"sn_mva": -1, "buses": [{"name": "A", "vn_kv": 0.4}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, GridError::InvalidParameter { .. }));
    }

    #[test]
    fn config_types_are_available_to_branches() {
        let built = NetworkBuilder::from_config(&config(
            r#"{
                "buses": [{"name": "A", "vn_kv": 11}, {"name": "B", "vn_kv": 11}],
                "std_lines": [{"name": "11kV_line", "data": {"c_nf_per_km": 10, "r_ohm_per_km": 0.25, "x_ohm_per_km": 0.35, "max_i_ka": 0.35}}],
                "lines": [{"from_bus": "A", "to_bus": "B", "length_km": 2.5, "std_type": "11kV_line"}]
            }"#,
        ))
        .unwrap();
        assert_eq!(built.network.lines[0].params.r_ohm_per_km, 0.25);
        assert_eq!(built.network.lines[0].name, "Line 0");
    }
}
