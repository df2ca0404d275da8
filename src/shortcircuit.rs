//! Maximum symmetrical three-phase short-circuit currents (IEC 60909 style).
//!
//! The positive-sequence admittance matrix of the branches, without line
//! capacitances, magnetizing admittances or shunts, is extended by the source
//! admittance of every external grid and inverted. A fault at bus `k`
//! then draws `c / Zkk`; the voltage at any other bus during that fault is
//! `c (1 - Zik / Zkk)`, which gives the branch currents. Static generators
//! with a rated power and a `k` factor are current sources adding
//! `|sum_j Zkj Ij| / |Zkk|` on top of the grid contribution.

use log::{debug, info};
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::Serialize;
use std::fmt;

use crate::case::{BranchKind, Network};
use crate::error::{GridError, GridResult};
use crate::ybus::{BranchModel, branch_models, energized_buses, i_base_ka, make_ybus, z_base};

/// Voltage factor for maximum short-circuit currents.
pub const C_MAX: f64 = 1.1;

/// R/X of an external grid without `rx_max`.
pub const DEFAULT_RX: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScBusResult {
    pub index: usize,
    pub ikss_ka: f64,
    pub skss_mw: f64,
    pub rk_ohm: f64,
    pub xk_ohm: f64,
}

impl ScBusResult {
    fn undefined(index: usize) -> Self {
        Self {
            index,
            ikss_ka: f64::NAN,
            skss_mw: f64::NAN,
            rk_ohm: f64::NAN,
            xk_ohm: f64::NAN,
        }
    }
}

impl fmt::Display for ScBusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>10.6} {:>11.5} {:>10.6} {:>10.6}",
            self.index, self.ikss_ka, self.skss_mw, self.rk_ohm, self.xk_ohm
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScLineResult {
    pub index: usize,
    pub ikss_ka: f64,
    pub vm_from_pu: f64,
    pub vm_to_pu: f64,
}

impl fmt::Display for ScLineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>10.6} {:>10.6} {:>10.6}",
            self.index, self.ikss_ka, self.vm_from_pu, self.vm_to_pu
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScTrafoResult {
    pub index: usize,
    pub ikss_hv_ka: f64,
    pub ikss_lv_ka: f64,
    pub vm_hv_pu: f64,
    pub vm_lv_pu: f64,
}

impl fmt::Display for ScTrafoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>10.6} {:>10.6} {:>10.6} {:>10.6}",
            self.index, self.ikss_hv_ka, self.ikss_lv_ka, self.vm_hv_pu, self.vm_lv_pu
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortCircuitResults {
    /// Buses faulted in this run, in the order of the `bus` table.
    pub fault_buses: Vec<usize>,
    pub bus: Vec<ScBusResult>,
    pub line: Vec<ScLineResult>,
    pub trafo: Vec<ScTrafoResult>,
}

impl fmt::Display for ShortCircuitResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Bus Short-Circuit Results ===")?;
        writeln!(
            f,
            "{:>5} {:>10} {:>11} {:>10} {:>10}",
            "index", "ikss_ka", "skss_mw", "rk_ohm", "xk_ohm"
        )?;
        for row in &self.bus {
            writeln!(f, "{}", row)?;
        }

        writeln!(f, "\n=== Line Short-Circuit Results ===")?;
        writeln!(
            f,
            "{:>5} {:>10} {:>10} {:>10}",
            "index", "ikss_ka", "vm_from_pu", "vm_to_pu"
        )?;
        for row in &self.line {
            writeln!(f, "{}", row)?;
        }

        writeln!(f, "\n=== Transformer Short-Circuit Results ===")?;
        writeln!(
            f,
            "{:>5} {:>10} {:>10} {:>10} {:>10}",
            "index", "ikss_hv_ka", "ikss_lv_ka", "vm_hv_pu", "vm_lv_pu"
        )?;
        for row in &self.trafo {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

/// Source admittance of every in-service external grid, per unit on the system base.
fn source_admittances(net: &Network) -> GridResult<Vec<(usize, Complex64)>> {
    net.ext_grids
        .iter()
        .filter(|e| e.in_service && net.buses[e.bus].in_service)
        .map(|e| {
            let s_sc = e
                .s_sc_max_mva
                .filter(|s| *s > 0.0)
                .ok_or_else(|| GridError::MissingShortCircuitData(e.name.clone()))?;
            let rx = e.rx_max.unwrap_or(DEFAULT_RX);
            let z = C_MAX * net.sn_mva / s_sc;
            let x = z / (1.0 + rx * rx).sqrt();
            let r = rx * x;
            Ok((e.bus, Complex64::new(1.0, 0.0) / Complex64::new(r, x)))
        })
        .collect()
}

/// Per-unit current injections of converter-coupled static generators.
fn sgen_currents(net: &Network, n: usize) -> Vec<Complex64> {
    let mut i_inj = vec![Complex64::new(0.0, 0.0); n];
    for sgen in net.sgens.iter().filter(|s| s.in_service) {
        if let (Some(sn_mva), Some(k)) = (sgen.sn_mva, sgen.k) {
            i_inj[sgen.bus] += Complex64::new(k * sn_mva / net.sn_mva, 0.0);
        }
    }
    i_inj
}

/// Branch currents in kA at both ends and end voltages for a fault at `k`.
struct FaultBranch {
    i_from_ka: f64,
    i_to_ka: f64,
    vm_from: f64,
    vm_to: f64,
}

fn fault_flow(net: &Network, br: &BranchModel, v: &[Complex64]) -> FaultBranch {
    let (v_from, v_to) = (v[br.from], v[br.to]);
    let (i_from, i_to) = br.currents(v_from, v_to);
    FaultBranch {
        i_from_ka: i_from.norm() * i_base_ka(net.buses[br.from].vn_kv, net.sn_mva),
        i_to_ka: i_to.norm() * i_base_ka(net.buses[br.to].vn_kv, net.sn_mva),
        vm_from: v_from.norm(),
        vm_to: v_to.norm(),
    }
}

/// Computes fault currents at `bus`, or at every bus when `bus` is `None`.
///
/// Buses not connected to an external grid get NaN rows and are not faulted.
pub fn calc_sc(net: &Network, bus: Option<usize>) -> GridResult<ShortCircuitResults> {
    let n = net.buses.len();
    if let Some(b) = bus {
        if b >= n {
            return Err(GridError::BusOutOfRange(b));
        }
    }

    let sources = source_admittances(net)?;
    if sources.is_empty() {
        return Err(GridError::NoExternalGrid);
    }
    let branches = branch_models(net, false, false)?;
    let energized = energized_buses(net, &branches);

    // reduce to the supplied part of the grid
    let active: Vec<usize> = (0..n).filter(|&i| energized[i]).collect();
    let mut position = vec![None; n];
    for (pos, &i) in active.iter().enumerate() {
        position[i] = Some(pos);
    }

    let y_full = make_ybus(n, &branches);
    let mut y_sc = DMatrix::from_fn(active.len(), active.len(), |r, c| {
        y_full[(active[r], active[c])]
    });
    for (b, y) in &sources {
        if let Some(pos) = position[*b] {
            y_sc[(pos, pos)] += *y;
        }
    }
    let z_bus = y_sc
        .try_inverse()
        .ok_or_else(|| GridError::Numerical("singular short-circuit admittance matrix".to_string()))?;
    debug!("Impedance matrix of '{}': {} buses", net.name, active.len());

    let i_sgen = sgen_currents(net, n);

    let fault_buses: Vec<usize> = match bus {
        Some(b) => vec![b],
        None => (0..n).collect(),
    };

    let mut bus_rows = Vec::with_capacity(fault_buses.len());
    let mut line_best: Vec<Option<ScLineResult>> = vec![None; net.lines.len()];
    let mut trafo_best: Vec<Option<ScTrafoResult>> = vec![None; net.trafos.len()];

    for &k in &fault_buses {
        let Some(pk) = position[k] else {
            bus_rows.push(ScBusResult::undefined(k));
            continue;
        };
        let z_kk = z_bus[(pk, pk)];
        let vn_kv = net.buses[k].vn_kv;

        let grid_pu = C_MAX / z_kk.norm();
        let sgen_sum: Complex64 = active
            .iter()
            .enumerate()
            .map(|(pj, &j)| z_bus[(pk, pj)] * i_sgen[j])
            .sum();
        let sgen_pu = sgen_sum.norm() / z_kk.norm();

        let ikss_ka = (grid_pu + sgen_pu) * i_base_ka(vn_kv, net.sn_mva);
        let zb = z_base(vn_kv, net.sn_mva);
        bus_rows.push(ScBusResult {
            index: k,
            ikss_ka,
            skss_mw: 3f64.sqrt() * vn_kv * ikss_ka,
            rk_ohm: z_kk.re * zb,
            xk_ohm: z_kk.im * zb,
        });

        let mut v = vec![Complex64::new(0.0, 0.0); n];
        for (pi, &i) in active.iter().enumerate() {
            v[i] = (Complex64::new(1.0, 0.0) - z_bus[(pi, pk)] / z_kk) * C_MAX;
        }

        for br in branches.iter().filter(|br| energized[br.from] && energized[br.to]) {
            let flow = fault_flow(net, br, &v);
            match br.kind {
                BranchKind::Line => {
                    let ikss = flow.i_from_ka.max(flow.i_to_ka);
                    let best = &mut line_best[br.index];
                    if best.as_ref().is_none_or(|b| ikss > b.ikss_ka) {
                        *best = Some(ScLineResult {
                            index: br.index,
                            ikss_ka: ikss,
                            vm_from_pu: flow.vm_from,
                            vm_to_pu: flow.vm_to,
                        });
                    }
                }
                BranchKind::Trafo => {
                    let best = &mut trafo_best[br.index];
                    if best.as_ref().is_none_or(|b| flow.i_from_ka > b.ikss_hv_ka) {
                        *best = Some(ScTrafoResult {
                            index: br.index,
                            ikss_hv_ka: flow.i_from_ka,
                            ikss_lv_ka: flow.i_to_ka,
                            vm_hv_pu: flow.vm_from,
                            vm_lv_pu: flow.vm_to,
                        });
                    }
                }
            }
        }
    }

    let line = net
        .lines
        .iter()
        .zip(line_best)
        .map(|(l, best)| {
            best.unwrap_or_else(|| {
                let x = if l.in_service { f64::NAN } else { 0.0 };
                ScLineResult {
                    index: l.index,
                    ikss_ka: x,
                    vm_from_pu: f64::NAN,
                    vm_to_pu: f64::NAN,
                }
            })
        })
        .collect();
    let trafo = net
        .trafos
        .iter()
        .zip(trafo_best)
        .map(|(t, best)| {
            best.unwrap_or_else(|| {
                let x = if t.in_service { f64::NAN } else { 0.0 };
                ScTrafoResult {
                    index: t.index,
                    ikss_hv_ka: x,
                    ikss_lv_ka: x,
                    vm_hv_pu: f64::NAN,
                    vm_lv_pu: f64::NAN,
                }
            })
        })
        .collect();

    info!(
        "Short circuit on '{}': {} fault location(s)",
        net.name,
        fault_buses.len()
    );
    Ok(ShortCircuitResults {
        fault_buses,
        bus: bus_rows,
        line,
        trafo,
    })
}
