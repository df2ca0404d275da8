use std::fs;
use std::path::Path;

use log::info;

use crate::case::*;
use crate::diagnostics::{VOLTAGE_MAX_PU, VOLTAGE_MIN_PU};
use crate::error::GridResult;
use crate::results::PowerFlowResults;

/// Renders the network topology as a Graphviz DOT graph.
///
/// Buses are nodes, lines and transformers are edges. Loads, static
/// generators, generators, shunts and external grids hang off their bus as
/// small extra nodes. When power flow results are given, bus labels carry the
/// voltage magnitude and buses outside the voltage band are drawn red.
pub fn network_to_dot(net: &Network, results: Option<&PowerFlowResults>) -> String {
    let mut out = String::new();
    out.push_str(&format!("graph \"{}\" {{\n", sanitize_label(&net.name)));
    out.push_str("  node [shape=circle, fontsize=10];\n");

    // === Buses ===
    for bus in &net.buses {
        let mut label = format!("{}\\n{} kV", sanitize_label(&bus.name), bus.vn_kv);
        let mut attrs = String::new();
        if let Some(res) = results.and_then(|r| r.bus.get(bus.index)) {
            label.push_str(&format!("\\n{:.4} pu", res.vm_pu));
            if res.vm_pu < VOLTAGE_MIN_PU || res.vm_pu > VOLTAGE_MAX_PU {
                attrs.push_str(", color=red");
            }
        }
        if !bus.in_service {
            attrs.push_str(", style=dashed");
        }
        out.push_str(&format!("  b{} [label=\"{}\"{}];\n", bus.index, label, attrs));
    }

    // === Lines ===
    for line in &net.lines {
        let style = if line.in_service { "solid" } else { "dashed" };
        out.push_str(&format!(
            "  b{} -- b{} [label=\"{}\", style={}];\n",
            line.from_bus,
            line.to_bus,
            sanitize_label(&line.name),
            style
        ));
    }

    // === Transformers ===
    for trafo in &net.trafos {
        let style = if trafo.in_service { "bold" } else { "dashed" };
        out.push_str(&format!(
            "  b{} -- b{} [label=\"{}\", style={}, color=blue];\n",
            trafo.hv_bus,
            trafo.lv_bus,
            sanitize_label(&trafo.name),
            style
        ));
    }

    // === Attached elements ===
    for ext_grid in &net.ext_grids {
        attach(&mut out, "eg", ext_grid.index, &ext_grid.name, "box", ext_grid.bus);
    }
    for load in &net.loads {
        attach(&mut out, "ld", load.index, &load.name, "invtriangle", load.bus);
    }
    for sgen in &net.sgens {
        attach(&mut out, "sg", sgen.index, &sgen.name, "diamond", sgen.bus);
    }
    for generator in &net.generators {
        attach(&mut out, "gn", generator.index, &generator.name, "doublecircle", generator.bus);
    }
    for shunt in &net.shunts {
        attach(&mut out, "sh", shunt.index, &shunt.name, "triangle", shunt.bus);
    }

    out.push('}');
    out.push('\n');
    out
}

fn attach(out: &mut String, prefix: &str, index: usize, name: &str, shape: &str, bus: usize) {
    out.push_str(&format!(
        "  {prefix}{index} [label=\"{}\", shape={shape}, fontsize=8];\n",
        sanitize_label(name)
    ));
    out.push_str(&format!("  {prefix}{index} -- b{bus} [style=dotted];\n"));
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

/// Writes the DOT rendering of `net` to `path`.
pub fn write_plot(
    net: &Network,
    results: Option<&PowerFlowResults>,
    path: impl AsRef<Path>,
) -> GridResult<()> {
    let path = path.as_ref();
    fs::write(path, network_to_dot(net, results))?;
    info!("Wrote topology of '{}' to {}", net.name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadflow::run_power_flow;

    fn net() -> Network {
        let mut net = Network::new("dot \"test\"");
        let a = net.create_bus("a", 20.0);
        let b = net.create_bus("b", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_transformer(a, b, "0.4 MVA 20/0.4 kV", "T1").unwrap();
        net.create_load(b, 0.1, 0.02, "load").unwrap();
        net
    }

    #[test]
    fn renders_nodes_and_edges() {
        let dot = network_to_dot(&net(), None);
        assert!(dot.starts_with("graph \"dot \\\"test\\\"\" {"));
        assert!(dot.contains("b0 [label=\"a\\n20 kV\"]"));
        assert!(dot.contains("b0 -- b1 [label=\"T1\", style=bold, color=blue]"));
        assert!(dot.contains("ld0 -- b1"));
        assert!(dot.contains("eg0 -- b0"));
        assert!(!dot.contains("sh0"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn shunt_hangs_off_its_bus() {
        let mut net = net();
        net.create_shunt(1, 0.0, -0.01, "cap").unwrap();
        let dot = network_to_dot(&net, None);
        assert!(dot.contains("sh0 [label=\"cap\", shape=triangle, fontsize=8]"));
        assert!(dot.contains("sh0 -- b1 [style=dotted]"));
    }

    #[test]
    fn results_add_voltages() {
        let net = net();
        let res = run_power_flow(&net).unwrap();
        let dot = network_to_dot(&net, res.results());
        assert!(dot.contains("\\n1.0000 pu"));
    }

    #[test]
    fn out_of_service_branch_is_dashed() {
        let mut net = net();
        net.trafos[0].in_service = false;
        assert!(network_to_dot(&net, None).contains("style=dashed, color=blue"));
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.dot");
        write_plot(&net(), None, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("T1"));
    }
}
