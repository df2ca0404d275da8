use nalgebra::DMatrix;
use num_complex::Complex64;
use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::case::{BranchKind, Line, Network, Transformer};
use crate::error::{GridError, GridResult};

/// Per-unit pi model of an in-service line or transformer.
///
/// The ideal transformer with complex ratio `tap` sits at the from side:
///
/// ```text
/// | If |   | Yff  Yft |   | Vf |
/// |    | = |          | * |    |
/// | It |   | Ytf  Ytt |   | Vt |
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BranchModel {
    pub kind: BranchKind,
    pub index: usize,
    pub from: usize,
    pub to: usize,
    pub y_series: Complex64,
    pub y_sh_from: Complex64,
    pub y_sh_to: Complex64,
    pub tap: Complex64,
}

impl BranchModel {
    pub fn y_ff(&self) -> Complex64 {
        (self.y_series + self.y_sh_from) / (self.tap * self.tap.conj())
    }

    pub fn y_ft(&self) -> Complex64 {
        -self.y_series / self.tap.conj()
    }

    pub fn y_tf(&self) -> Complex64 {
        -self.y_series / self.tap
    }

    pub fn y_tt(&self) -> Complex64 {
        self.y_series + self.y_sh_to
    }

    /// Currents injected into the branch at the from and to terminals.
    pub fn currents(&self, v_from: Complex64, v_to: Complex64) -> (Complex64, Complex64) {
        (
            self.y_ff() * v_from + self.y_ft() * v_to,
            self.y_tf() * v_from + self.y_tt() * v_to,
        )
    }
}

/// Base impedance in ohm of a bus on the system base.
pub fn z_base(vn_kv: f64, sn_mva: f64) -> f64 {
    vn_kv * vn_kv / sn_mva
}

/// Base current in kA of a bus on the system base.
pub fn i_base_ka(vn_kv: f64, sn_mva: f64) -> f64 {
    sn_mva / (3f64.sqrt() * vn_kv)
}

fn line_model(net: &Network, line: &Line, with_shunts: bool) -> GridResult<BranchModel> {
    let vn_kv = net.buses[line.from_bus].vn_kv;
    let zb = z_base(vn_kv, net.sn_mva);
    if line.parallel == 0 {
        return Err(GridError::InvalidParameter {
            element: format!("line '{}'", line.name),
            reason: "parallel must be at least 1".to_string(),
        });
    }
    let parallel = line.parallel as f64;

    let r = line.params.r_ohm_per_km * line.length_km / parallel;
    let x = line.params.x_ohm_per_km * line.length_km / parallel;
    if r == 0.0 && x == 0.0 {
        return Err(GridError::InvalidParameter {
            element: format!("line '{}'", line.name),
            reason: "zero series impedance".to_string(),
        });
    }
    let y_series = Complex64::new(1.0, 0.0) / (Complex64::new(r, x) / zb);

    let omega = 2.0 * PI * net.f_hz;
    let b = omega * line.params.c_nf_per_km * 1e-9 * line.length_km * parallel;
    let g = line.params.g_us_per_km * 1e-6 * line.length_km * parallel;
    let y_sh = if with_shunts {
        Complex64::new(g, b) * zb * 0.5
    } else {
        Complex64::new(0.0, 0.0)
    };

    Ok(BranchModel {
        kind: BranchKind::Line,
        index: line.index,
        from: line.from_bus,
        to: line.to_bus,
        y_series,
        y_sh_from: y_sh,
        y_sh_to: y_sh,
        tap: Complex64::new(1.0, 0.0),
    })
}

fn trafo_model(
    net: &Network,
    trafo: &Transformer,
    with_shift: bool,
    with_shunts: bool,
) -> GridResult<BranchModel> {
    let p = &trafo.params;
    let vn_hv_bus = net.buses[trafo.hv_bus].vn_kv;
    let vn_lv_bus = net.buses[trafo.lv_bus].vn_kv;
    let element = || format!("transformer '{}'", trafo.name);

    // impedances referred to the lv bus on the system base
    let lv_ratio = p.vn_lv_kv / vn_lv_bus;
    let scale = net.sn_mva / p.sn_mva * lv_ratio * lv_ratio;
    let z = p.vk_percent / 100.0 * scale;
    let r = p.vkr_percent / 100.0 * scale;
    if r > z {
        return Err(GridError::InvalidParameter {
            element: element(),
            reason: "vkr_percent exceeds vk_percent".to_string(),
        });
    }
    let x = (z * z - r * r).sqrt();
    let y_series = Complex64::new(1.0, 0.0) / Complex64::new(r, x);

    let y_m_abs = p.i0_percent / 100.0 / scale;
    let g_m = p.pfe_kw / 1000.0 / net.sn_mva / (lv_ratio * lv_ratio);
    let b_m = if y_m_abs > g_m {
        (y_m_abs * y_m_abs - g_m * g_m).sqrt()
    } else {
        0.0
    };
    let y_m = if with_shunts {
        Complex64::new(g_m, -b_m)
    } else {
        Complex64::new(0.0, 0.0)
    };

    let ratio = (p.vn_hv_kv / p.vn_lv_kv) / (vn_hv_bus / vn_lv_bus) * trafo.tap_ratio();
    if ratio <= 0.0 || !ratio.is_finite() {
        return Err(GridError::InvalidParameter {
            element: element(),
            reason: format!("invalid voltage ratio {}", ratio),
        });
    }
    let shift = if with_shift { p.shift_degree.to_radians() } else { 0.0 };

    Ok(BranchModel {
        kind: BranchKind::Trafo,
        index: trafo.index,
        from: trafo.hv_bus,
        to: trafo.lv_bus,
        y_series,
        y_sh_from: y_m * 0.5,
        y_sh_to: y_m * 0.5,
        tap: Complex64::from_polar(ratio, shift),
    })
}

/// Models of all in-service branches whose terminal buses are in service.
///
/// `with_shunts = false` drops line charging and transformer magnetizing
/// admittances, as the positive-sequence short-circuit model requires.
pub fn branch_models(
    net: &Network,
    with_shift: bool,
    with_shunts: bool,
) -> GridResult<Vec<BranchModel>> {
    let bus_ok = |b: usize| net.buses[b].in_service;
    let mut out = Vec::with_capacity(net.lines.len() + net.trafos.len());
    for line in &net.lines {
        if line.in_service && bus_ok(line.from_bus) && bus_ok(line.to_bus) {
            out.push(line_model(net, line, with_shunts)?);
        }
    }
    for trafo in &net.trafos {
        if trafo.in_service && bus_ok(trafo.hv_bus) && bus_ok(trafo.lv_bus) {
            out.push(trafo_model(net, trafo, with_shift, with_shunts)?);
        }
    }
    Ok(out)
}

/// Builds the dense bus admittance matrix.
pub fn make_ybus(n_bus: usize, branches: &[BranchModel]) -> DMatrix<Complex64> {
    let mut y_bus = DMatrix::<Complex64>::zeros(n_bus, n_bus);
    for br in branches {
        let (f, t) = (br.from, br.to);
        y_bus[(f, f)] += br.y_ff();
        y_bus[(f, t)] += br.y_ft();
        y_bus[(t, f)] += br.y_tf();
        y_bus[(t, t)] += br.y_tt();
    }
    y_bus
}

/// Marks every bus reachable from an in-service external grid.
pub fn energized_buses(net: &Network, branches: &[BranchModel]) -> Vec<bool> {
    let n = net.buses.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for br in branches {
        adjacency[br.from].push(br.to);
        adjacency[br.to].push(br.from);
    }

    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();
    for ext_grid in net.ext_grids.iter().filter(|e| e.in_service) {
        if net.buses[ext_grid.bus].in_service && !visited[ext_grid.bus] {
            visited[ext_grid.bus] = true;
            queue.push_back(ext_grid.bus);
        }
    }
    while let Some(bus) = queue.pop_front() {
        for &next in &adjacency[bus] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus() -> Network {
        let mut net = Network::new("two bus");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_line(a, b, 0.1, "NAYY 4x50 SE", "L").unwrap();
        net
    }

    #[test]
    fn line_series_admittance_in_per_unit() {
        let net = two_bus();
        let models = branch_models(&net, true, true).unwrap();
        // z = (0.0642 + j0.0083) ohm on a 0.16 ohm base
        let expected = Complex64::new(1.0, 0.0) / (Complex64::new(0.0642, 0.0083) / 0.16);
        assert!((models[0].y_series - expected).norm() < 1e-9);
    }

    #[test]
    fn ybus_rows_sum_to_shunts() {
        let net = two_bus();
        let models = branch_models(&net, true, true).unwrap();
        let y = make_ybus(2, &models);
        assert_eq!(y[(0, 1)], y[(1, 0)]);
        let row_sum = y[(0, 0)] + y[(0, 1)];
        assert!((row_sum - models[0].y_sh_from).norm() < 1e-9);
    }

    #[test]
    fn trafo_ratio_matches_bus_voltages() {
        let mut net = Network::new("t");
        let hv = net.create_bus("hv", 20.0);
        let lv = net.create_bus("lv", 0.4);
        net.create_transformer(hv, lv, "0.4 MVA 20/0.4 kV", "T").unwrap();
        let off = branch_models(&net, false, true).unwrap();
        assert!((off[0].tap - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        let on = branch_models(&net, true, true).unwrap();
        assert!((on[0].tap.arg().to_degrees() - 150.0).abs() < 1e-9);

        // vk = 6 % on 0.4 MVA, system base 1 MVA
        let z = (Complex64::new(1.0, 0.0) / off[0].y_series).norm();
        assert!((z - 0.06 / 0.4).abs() < 1e-9);
    }

    #[test]
    fn short_circuit_models_drop_shunts() {
        let mut net = Network::new("t");
        let hv = net.create_bus("hv", 20.0);
        let lv = net.create_bus("lv", 0.4);
        let far = net.create_bus("far", 20.0);
        net.create_transformer(hv, lv, "0.4 MVA 20/0.4 kV", "T").unwrap();
        net.create_line(hv, far, 10.0, "NA2XS2Y 1x95 RM/12/20 kV", "L").unwrap();

        let full = branch_models(&net, false, true).unwrap();
        assert!(full.iter().all(|m| m.y_sh_from.norm() > 0.0));

        let bare = branch_models(&net, false, false).unwrap();
        for (with, without) in full.iter().zip(&bare) {
            assert_eq!(without.y_sh_from, Complex64::new(0.0, 0.0));
            assert_eq!(without.y_sh_to, Complex64::new(0.0, 0.0));
            assert_eq!(with.y_series, without.y_series);
        }
    }

    #[test]
    fn zero_parallel_systems_are_rejected() {
        let mut net = two_bus();
        net.lines[0].parallel = 0;
        assert!(matches!(
            branch_models(&net, true, true),
            Err(GridError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn out_of_service_branch_splits_island() {
        let mut net = two_bus();
        net.lines[0].in_service = false;
        let models = branch_models(&net, true, true).unwrap();
        assert!(models.is_empty());
        assert_eq!(energized_buses(&net, &models), vec![true, false]);
    }
}
