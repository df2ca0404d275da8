//! AC power flow.
//!
//! [`PowerFlowSolver`] is the seam between the network model and the numerical
//! engine. [`NewtonRaphson`] is the default engine: full polar Newton-Raphson
//! on a dense Jacobian, warm-started from a DC approximation whenever voltage
//! angles (and thus transformer phase shifts) are taken into account.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rsparse::data::Trpl;
use serde::Serialize;
use std::collections::HashMap;

use crate::case::{BranchKind, Network, Shunt};
use crate::error::{GridError, GridResult};
use crate::results::{
    BusResult, GenResult, InjectionResult, LineResult, PowerFlowResults, TrafoResult,
};
use crate::ybus::{BranchModel, branch_models, energized_buses, i_base_ka, make_ybus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusType {
    Slack, // slack, swing, Vd, reference bus
    PQ,    // load bus
    PV,    // generator bus
    OOS,   // out of service or not connected to any external grid
}

/// Whether transformer phase shifts and the DC warm start are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageAngles {
    /// On when any bus is above 70 kV.
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Largest acceptable P/Q mismatch in per unit.
    pub tolerance_pu: f64,
    pub max_iterations: usize,
    pub voltage_angles: VoltageAngles,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance_pu: 1e-8,
            max_iterations: 10,
            voltage_angles: VoltageAngles::Auto,
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance_pu = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_voltage_angles(mut self, mode: VoltageAngles) -> Self {
        self.voltage_angles = mode;
        self
    }

    pub fn angles_enabled(&self, net: &Network) -> bool {
        match self.voltage_angles {
            VoltageAngles::On => true,
            VoltageAngles::Off => false,
            VoltageAngles::Auto => net.buses.iter().any(|b| b.vn_kv > 70.0),
        }
    }
}

/// Outcome of one solve. `results` is present exactly when `converged` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub results: Option<PowerFlowResults>,
}

impl PowerFlowOutcome {
    pub fn not_converged(iterations: usize) -> Self {
        Self {
            converged: false,
            iterations,
            results: None,
        }
    }

    pub fn results(&self) -> Option<&PowerFlowResults> {
        self.results.as_ref()
    }
}

pub trait PowerFlowSolver {
    /// Solves the network. Structural problems are errors, non-convergence is not.
    fn solve(&self, net: &Network) -> GridResult<PowerFlowOutcome>;
}

#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    pub options: SolverOptions,
}

impl NewtonRaphson {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

/// Solves with the default Newton-Raphson settings.
pub fn run_power_flow(net: &Network) -> GridResult<PowerFlowOutcome> {
    NewtonRaphson::default().solve(net)
}

/// Everything the iteration needs, in per unit and indexed by bus.
struct PfSystem {
    bus_types: Vec<BusType>,
    s_spec: Vec<Complex64>,
    vm_init: Vec<f64>,
    va_init: Vec<f64>,
}

impl PfSystem {
    fn indices(&self, kind: BusType) -> Vec<usize> {
        (0..self.bus_types.len())
            .filter(|&i| self.bus_types[i] == kind)
            .collect()
    }
}

fn classify_buses(net: &Network, energized: &[bool]) -> GridResult<PfSystem> {
    let n = net.buses.len();
    let s_base = net.sn_mva;
    let mut bus_types: Vec<BusType> = energized
        .iter()
        .map(|&e| if e { BusType::PQ } else { BusType::OOS })
        .collect();
    let mut s_spec = vec![Complex64::new(0.0, 0.0); n];
    let mut vm_init = vec![1.0; n];
    let mut va_init = vec![0.0; n];

    let mut has_slack = false;
    for ext_grid in net.ext_grids.iter().filter(|e| e.in_service) {
        if !energized[ext_grid.bus] || bus_types[ext_grid.bus] == BusType::Slack {
            continue;
        }
        bus_types[ext_grid.bus] = BusType::Slack;
        vm_init[ext_grid.bus] = ext_grid.vm_pu;
        va_init[ext_grid.bus] = ext_grid.va_degree.to_radians();
        has_slack = true;
    }
    if !has_slack {
        return Err(GridError::NoExternalGrid);
    }

    for generator in net.generators.iter().filter(|g| g.in_service) {
        if !energized[generator.bus] {
            continue;
        }
        s_spec[generator.bus] += Complex64::new(generator.p_mw / s_base, 0.0);
        if bus_types[generator.bus] == BusType::PQ {
            bus_types[generator.bus] = BusType::PV;
            vm_init[generator.bus] = generator.vm_pu;
        }
    }
    for load in net.loads.iter().filter(|l| l.in_service) {
        s_spec[load.bus] -= Complex64::new(load.p_mw, load.q_mvar) * load.scaling / s_base;
    }
    for sgen in net.sgens.iter().filter(|s| s.in_service) {
        s_spec[sgen.bus] += Complex64::new(sgen.p_mw, sgen.q_mvar) * sgen.scaling / s_base;
    }

    Ok(PfSystem {
        bus_types,
        s_spec,
        vm_init,
        va_init,
    })
}

/// Per-unit admittance of a shunt; its consumption at 1.0 pu is `p_mw + j q_mvar`.
fn shunt_admittance(net: &Network, shunt: &Shunt) -> Complex64 {
    Complex64::new(shunt.p_mw, -shunt.q_mvar) / net.sn_mva
}

/// DC power flow angles used as the Newton-Raphson starting point.
///
/// Returns `None` when the susceptance matrix is singular.
fn dc_angles(branches: &[BranchModel], sys: &PfSystem) -> Option<Vec<f64>> {
    // bus index -> matrix index (slack and isolated buses excluded)
    let mut bus_map: HashMap<usize, usize> = HashMap::new();
    for (bus, kind) in sys.bus_types.iter().enumerate() {
        if matches!(kind, BusType::PQ | BusType::PV) {
            bus_map.insert(bus, bus_map.len());
        }
    }
    let n = bus_map.len();
    debug!("Found {:>6} non-slack buses", n);

    let mut theta = sys.va_init.clone();
    if n == 0 {
        return Some(theta);
    }

    let mut rhs = vec![0.0; n];
    for (&bus, &i) in &bus_map {
        rhs[i] = sys.s_spec[bus].re;
    }

    let mut b_prime = Trpl::<f64>::new();
    b_prime.m = n;
    b_prime.n = n;

    for br in branches {
        let x = (Complex64::new(1.0, 0.0) / br.y_series).im * br.tap.norm();
        if x.abs() < 1e-12 {
            continue;
        }
        let b = 1.0 / x;
        let shift = br.tap.arg();

        let from = bus_map.get(&br.from).copied();
        let to = bus_map.get(&br.to).copied();
        match (from, to) {
            (Some(i), Some(j)) => {
                b_prime.append(i, i, b);
                b_prime.append(j, j, b);
                b_prime.append(i, j, -b);
                b_prime.append(j, i, -b);
            }
            (Some(i), None) => {
                // to is slack
                b_prime.append(i, i, b);
                rhs[i] += b * sys.va_init[br.to];
            }
            (None, Some(j)) => {
                // from is slack
                b_prime.append(j, j, b);
                rhs[j] += b * sys.va_init[br.from];
            }
            (None, None) => {}
        }
        if let Some(i) = from {
            rhs[i] += b * shift;
        }
        if let Some(j) = to {
            rhs[j] -= b * shift;
        }
    }
    b_prime.sum_dupl();
    let dense = b_prime.to_sprs().to_dense();

    let b_mat = DMatrix::from_fn(n, n, |r, c| dense[r][c]);
    let solution = b_mat.lu().solve(&DVector::from_vec(rhs))?;
    for (&bus, &i) in &bus_map {
        theta[bus] = solution[i];
    }
    Some(theta)
}

impl PowerFlowSolver for NewtonRaphson {
    fn solve(&self, net: &Network) -> GridResult<PowerFlowOutcome> {
        let opts = &self.options;
        let with_angles = opts.angles_enabled(net);
        let branches = branch_models(net, with_angles, true)?;
        let n = net.buses.len();
        let mut y_bus = make_ybus(n, &branches);
        let energized = energized_buses(net, &branches);
        for shunt in net.shunts.iter().filter(|s| s.in_service && energized[s.bus]) {
            y_bus[(shunt.bus, shunt.bus)] += shunt_admittance(net, shunt);
        }
        let sys = classify_buses(net, &energized)?;

        let pv = sys.indices(BusType::PV);
        let pq = sys.indices(BusType::PQ);
        let pvpq: Vec<usize> = pv.iter().chain(pq.iter()).copied().collect();
        let n_pvpq = pvpq.len();
        let n_pq = pq.len();
        debug!(
            "Power flow '{}': {} PV, {} PQ, angles {}",
            net.name,
            pv.len(),
            n_pq,
            if with_angles { "on" } else { "off" }
        );

        let mut vm = sys.vm_init.clone();
        let mut va = if with_angles {
            dc_angles(&branches, &sys).unwrap_or_else(|| {
                warn!("DC initialisation failed, using flat start");
                sys.va_init.clone()
            })
        } else {
            sys.va_init.clone()
        };
        let active = |i: usize| sys.bus_types[i] != BusType::OOS;
        let polar = |vm: &[f64], va: &[f64]| -> DVector<Complex64> {
            DVector::from_fn(n, |i, _| {
                if active(i) {
                    Complex64::from_polar(vm[i], va[i])
                } else {
                    Complex64::new(0.0, 0.0)
                }
            })
        };

        let mut v = polar(&vm, &va);
        let mut converged = false;
        let mut iterations = 0;

        loop {
            let i_bus = &y_bus * &v;
            let mis: Vec<Complex64> = (0..n)
                .map(|i| v[i] * i_bus[i].conj() - sys.s_spec[i])
                .collect();

            let mut f = Vec::with_capacity(n_pvpq + n_pq);
            f.extend(pvpq.iter().map(|&i| mis[i].re));
            f.extend(pq.iter().map(|&i| mis[i].im));
            let norm = f.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
            debug!("iteration {:>3}: max mismatch {:.3e}", iterations, norm);

            if !norm.is_finite() {
                warn!("Power flow '{}' diverged (non-finite mismatch)", net.name);
                break;
            }
            if norm < opts.tolerance_pu {
                converged = true;
                break;
            }
            if iterations >= opts.max_iterations {
                break;
            }

            let jac = build_jacobian(&y_bus, &v, &i_bus, &pvpq, &pq);
            let rhs = DVector::from_iterator(f.len(), f.iter().map(|x| -x));
            let dx = match jac.lu().solve(&rhs) {
                Some(dx) => dx,
                None => {
                    warn!("Power flow '{}': singular Jacobian", net.name);
                    break;
                }
            };

            for (k, &i) in pvpq.iter().enumerate() {
                va[i] += dx[k];
            }
            for (k, &i) in pq.iter().enumerate() {
                vm[i] += dx[n_pvpq + k];
            }
            v = polar(&vm, &va);
            iterations += 1;
        }

        if !converged {
            info!(
                "Power flow '{}' did not converge after {} iterations",
                net.name, iterations
            );
            return Ok(PowerFlowOutcome::not_converged(iterations));
        }
        info!(
            "Power flow '{}' converged in {} iterations",
            net.name, iterations
        );

        let i_bus = &y_bus * &v;
        let results = build_results(net, &branches, &sys, &v, &i_bus);
        Ok(PowerFlowOutcome {
            converged: true,
            iterations,
            results: Some(results),
        })
    }
}

/// Jacobian of the mismatch vector with respect to [Va(pvpq), Vm(pq)].
fn build_jacobian(
    y_bus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
    i_bus: &DVector<Complex64>,
    pvpq: &[usize],
    pq: &[usize],
) -> DMatrix<f64> {
    let j = Complex64::new(0.0, 1.0);
    let unit = |k: usize| v[k] / v[k].norm();

    // dS_i / dVa_k = j V_i conj(delta_ik Ibus_i - Y_ik V_k)
    let ds_dva = |i: usize, k: usize| {
        let diag = if i == k { i_bus[i] } else { Complex64::new(0.0, 0.0) };
        j * v[i] * (diag - y_bus[(i, k)] * v[k]).conj()
    };
    // dS_i / dVm_k = V_i conj(Y_ik Vnorm_k) + delta_ik conj(Ibus_i) Vnorm_i
    let ds_dvm = |i: usize, k: usize| {
        let mut d = v[i] * (y_bus[(i, k)] * unit(k)).conj();
        if i == k {
            d += i_bus[i].conj() * unit(i);
        }
        d
    };

    let n_pvpq = pvpq.len();
    let dim = n_pvpq + pq.len();
    DMatrix::from_fn(dim, dim, |r, c| {
        let p_row = r < n_pvpq;
        let angle_col = c < n_pvpq;
        let i = if p_row { pvpq[r] } else { pq[r - n_pvpq] };
        let k = if angle_col { pvpq[c] } else { pq[c - n_pvpq] };
        let d = if angle_col { ds_dva(i, k) } else { ds_dvm(i, k) };
        if p_row { d.re } else { d.im }
    })
}

fn build_results(
    net: &Network,
    branches: &[BranchModel],
    sys: &PfSystem,
    v: &DVector<Complex64>,
    i_bus: &DVector<Complex64>,
) -> PowerFlowResults {
    let s_base = net.sn_mva;
    let n = net.buses.len();
    let active = |i: usize| sys.bus_types[i] != BusType::OOS;
    let s_inj: Vec<Complex64> = (0..n).map(|i| v[i] * i_bus[i].conj() * s_base).collect();

    // shunt consumption is inside s_inj, bus results count it as demand
    let shunt: Vec<InjectionResult> = net
        .shunts
        .iter()
        .map(|sh| {
            let s = if sh.in_service && active(sh.bus) {
                Complex64::new(sh.p_mw, sh.q_mvar) * v[sh.bus].norm_sqr()
            } else {
                Complex64::new(0.0, 0.0)
            };
            InjectionResult {
                index: sh.index,
                p_mw: s.re,
                q_mvar: s.im,
            }
        })
        .collect();
    let mut s_shunt = vec![Complex64::new(0.0, 0.0); n];
    for (sh, row) in net.shunts.iter().zip(&shunt) {
        s_shunt[sh.bus] += Complex64::new(row.p_mw, row.q_mvar);
    }

    let bus = (0..n)
        .map(|i| {
            if active(i) {
                BusResult {
                    index: i,
                    vm_pu: v[i].norm(),
                    va_degree: v[i].arg().to_degrees(),
                    p_mw: s_shunt[i].re - s_inj[i].re,
                    q_mvar: s_shunt[i].im - s_inj[i].im,
                }
            } else {
                BusResult::isolated(i)
            }
        })
        .collect::<Vec<_>>();

    // local demand and fixed injections per bus, in MW/MVAr
    let mut demand = vec![Complex64::new(0.0, 0.0); n];
    for load in net.loads.iter().filter(|l| l.in_service) {
        demand[load.bus] += Complex64::new(load.p_mw, load.q_mvar) * load.scaling;
    }
    for sgen in net.sgens.iter().filter(|s| s.in_service) {
        demand[sgen.bus] -= Complex64::new(sgen.p_mw, sgen.q_mvar) * sgen.scaling;
    }
    let mut gen_p = vec![0.0; n];
    let mut gens_at_bus = vec![0usize; n];
    for generator in net.generators.iter().filter(|g| g.in_service) {
        gen_p[generator.bus] += generator.p_mw;
        gens_at_bus[generator.bus] += 1;
    }

    let load = net
        .loads
        .iter()
        .map(|l| {
            let served = l.in_service && active(l.bus);
            InjectionResult {
                index: l.index,
                p_mw: if served { l.p_mw * l.scaling } else { 0.0 },
                q_mvar: if served { l.q_mvar * l.scaling } else { 0.0 },
            }
        })
        .collect();

    let sgen = net
        .sgens
        .iter()
        .map(|s| {
            let served = s.in_service && active(s.bus);
            InjectionResult {
                index: s.index,
                p_mw: if served { s.p_mw * s.scaling } else { 0.0 },
                q_mvar: if served { s.q_mvar * s.scaling } else { 0.0 },
            }
        })
        .collect();

    let generator = net
        .generators
        .iter()
        .map(|g| {
            if !g.in_service || !active(g.bus) {
                return GenResult {
                    index: g.index,
                    p_mw: if g.in_service { f64::NAN } else { 0.0 },
                    q_mvar: if g.in_service { f64::NAN } else { 0.0 },
                    va_degree: f64::NAN,
                    vm_pu: f64::NAN,
                };
            }
            // a generator sharing a bus with an external grid leaves the reactive balance to the grid
            let q_mvar = if sys.bus_types[g.bus] == BusType::PV {
                (s_inj[g.bus].im + demand[g.bus].im) / gens_at_bus[g.bus] as f64
            } else {
                0.0
            };
            GenResult {
                index: g.index,
                p_mw: g.p_mw,
                q_mvar,
                va_degree: v[g.bus].arg().to_degrees(),
                vm_pu: v[g.bus].norm(),
            }
        })
        .collect();

    let mut slack_share = vec![0usize; n];
    let slack_ext: Vec<bool> = net
        .ext_grids
        .iter()
        .map(|e| {
            let is_slack = e.in_service && sys.bus_types[e.bus] == BusType::Slack;
            if is_slack {
                slack_share[e.bus] += 1;
            }
            is_slack
        })
        .collect();
    let ext_grid = net
        .ext_grids
        .iter()
        .zip(&slack_ext)
        .map(|(e, &is_slack)| {
            if !is_slack {
                return InjectionResult {
                    index: e.index,
                    p_mw: 0.0,
                    q_mvar: 0.0,
                };
            }
            let share = slack_share[e.bus] as f64;
            let s = s_inj[e.bus] + demand[e.bus] - Complex64::new(gen_p[e.bus], 0.0);
            InjectionResult {
                index: e.index,
                p_mw: s.re / share,
                q_mvar: s.im / share,
            }
        })
        .collect();

    let mut line_model = vec![None; net.lines.len()];
    let mut trafo_model = vec![None; net.trafos.len()];
    for br in branches {
        match br.kind {
            BranchKind::Line => line_model[br.index] = Some(br),
            BranchKind::Trafo => trafo_model[br.index] = Some(br),
        }
    }

    let line = net
        .lines
        .iter()
        .map(|l| {
            let flow = line_model[l.index].and_then(|br| branch_flow(net, br, v, sys));
            let rated = l.rated_i_ka();
            match flow {
                Some(fl) => LineResult {
                    index: l.index,
                    p_from_mw: fl.s_from.re,
                    q_from_mvar: fl.s_from.im,
                    p_to_mw: fl.s_to.re,
                    q_to_mvar: fl.s_to.im,
                    pl_mw: fl.s_from.re + fl.s_to.re,
                    ql_mvar: fl.s_from.im + fl.s_to.im,
                    i_from_ka: fl.i_from_ka,
                    i_to_ka: fl.i_to_ka,
                    i_ka: fl.i_from_ka.max(fl.i_to_ka),
                    vm_from_pu: fl.v_from.norm(),
                    va_from_degree: fl.v_from.arg().to_degrees(),
                    vm_to_pu: fl.v_to.norm(),
                    va_to_degree: fl.v_to.arg().to_degrees(),
                    loading_percent: fl.i_from_ka.max(fl.i_to_ka) / rated * 100.0,
                },
                None => idle_line(l.index, l.in_service),
            }
        })
        .collect();

    let trafo = net
        .trafos
        .iter()
        .map(|t| {
            let flow = trafo_model[t.index].and_then(|br| branch_flow(net, br, v, sys));
            let rated_hv = i_base_ka(t.params.vn_hv_kv, t.params.sn_mva);
            let rated_lv = i_base_ka(t.params.vn_lv_kv, t.params.sn_mva);
            match flow {
                Some(fl) => TrafoResult {
                    index: t.index,
                    p_hv_mw: fl.s_from.re,
                    q_hv_mvar: fl.s_from.im,
                    p_lv_mw: fl.s_to.re,
                    q_lv_mvar: fl.s_to.im,
                    pl_mw: fl.s_from.re + fl.s_to.re,
                    ql_mvar: fl.s_from.im + fl.s_to.im,
                    i_hv_ka: fl.i_from_ka,
                    i_lv_ka: fl.i_to_ka,
                    vm_hv_pu: fl.v_from.norm(),
                    va_hv_degree: fl.v_from.arg().to_degrees(),
                    vm_lv_pu: fl.v_to.norm(),
                    va_lv_degree: fl.v_to.arg().to_degrees(),
                    shift_degree: trafo_model[t.index].map_or(0.0, |br| br.tap.arg().to_degrees()),
                    loading_percent: (fl.i_from_ka / rated_hv).max(fl.i_to_ka / rated_lv)
                        * 100.0,
                },
                None => idle_trafo(t.index, t.in_service),
            }
        })
        .collect();

    PowerFlowResults {
        bus,
        line,
        trafo,
        load,
        sgen,
        generator,
        ext_grid,
        shunt,
    }
}

struct BranchFlow {
    s_from: Complex64,
    s_to: Complex64,
    i_from_ka: f64,
    i_to_ka: f64,
    v_from: Complex64,
    v_to: Complex64,
}

/// Terminal flows in MW/MVAr and kA; `None` when the branch sits in an unsupplied island.
fn branch_flow(
    net: &Network,
    br: &BranchModel,
    v: &DVector<Complex64>,
    sys: &PfSystem,
) -> Option<BranchFlow> {
    if sys.bus_types[br.from] == BusType::OOS || sys.bus_types[br.to] == BusType::OOS {
        return None;
    }
    let (v_from, v_to) = (v[br.from], v[br.to]);
    let (i_from, i_to) = br.currents(v_from, v_to);
    Some(BranchFlow {
        s_from: v_from * i_from.conj() * net.sn_mva,
        s_to: v_to * i_to.conj() * net.sn_mva,
        i_from_ka: i_from.norm() * i_base_ka(net.buses[br.from].vn_kv, net.sn_mva),
        i_to_ka: i_to.norm() * i_base_ka(net.buses[br.to].vn_kv, net.sn_mva),
        v_from,
        v_to,
    })
}

/// Out-of-service branches carry nothing; in-service branches in dead islands are undefined.
fn idle_line(index: usize, in_service: bool) -> LineResult {
    let x = if in_service { f64::NAN } else { 0.0 };
    LineResult {
        index,
        p_from_mw: x,
        q_from_mvar: x,
        p_to_mw: x,
        q_to_mvar: x,
        pl_mw: x,
        ql_mvar: x,
        i_from_ka: x,
        i_to_ka: x,
        i_ka: x,
        vm_from_pu: f64::NAN,
        va_from_degree: f64::NAN,
        vm_to_pu: f64::NAN,
        va_to_degree: f64::NAN,
        loading_percent: x,
    }
}

fn idle_trafo(index: usize, in_service: bool) -> TrafoResult {
    let x = if in_service { f64::NAN } else { 0.0 };
    TrafoResult {
        index,
        p_hv_mw: x,
        q_hv_mvar: x,
        p_lv_mw: x,
        q_lv_mvar: x,
        pl_mw: x,
        ql_mvar: x,
        i_hv_ka: x,
        i_lv_ka: x,
        vm_hv_pu: f64::NAN,
        va_hv_degree: f64::NAN,
        vm_lv_pu: f64::NAN,
        va_lv_degree: f64::NAN,
        shift_degree: 0.0,
        loading_percent: x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder() -> Network {
        let mut net = Network::new("feeder");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_line(a, b, 0.1, "NAYY 4x50 SE", "L").unwrap();
        net.create_load(b, 0.05, 0.01, "load").unwrap();
        net
    }

    #[test]
    fn two_bus_feeder_converges_with_voltage_drop() {
        let net = feeder();
        let outcome = run_power_flow(&net).unwrap();
        assert!(outcome.converged);
        let res = outcome.results().unwrap();
        assert!((res.bus[0].vm_pu - 1.0).abs() < 1e-9);
        assert!(res.bus[1].vm_pu < 1.0 && res.bus[1].vm_pu > 0.95);

        // power balance: grid supplies load plus losses
        let grid = &res.ext_grid[0];
        assert!((grid.p_mw - 0.05 - res.line[0].pl_mw).abs() < 1e-7);
        assert!(res.line[0].pl_mw > 0.0);
        assert!(res.line[0].loading_percent > 0.0);
    }

    #[test]
    fn capacitor_raises_voltage_and_supplies_reactive_power() {
        let plain = run_power_flow(&feeder()).unwrap();
        let mut net = feeder();
        net.create_shunt(1, 0.0, -0.02, "cap").unwrap();
        let outcome = run_power_flow(&net).unwrap();
        assert!(outcome.converged);
        let res = outcome.results().unwrap();
        assert!(res.bus[1].vm_pu > plain.results().unwrap().bus[1].vm_pu);

        // constant admittance: Q scales with the voltage squared
        let vm = res.bus[1].vm_pu;
        assert!((res.shunt[0].q_mvar + 0.02 * vm * vm).abs() < 1e-12);
        assert!((res.bus[1].q_mvar - 0.01 - res.shunt[0].q_mvar).abs() < 1e-7);

        let grid = &res.ext_grid[0];
        assert!((grid.q_mvar - 0.01 - res.shunt[0].q_mvar - res.line[0].ql_mvar).abs() < 1e-7);
    }

    #[test]
    fn missing_external_grid_is_an_error() {
        let mut net = feeder();
        net.ext_grids[0].in_service = false;
        assert!(matches!(run_power_flow(&net), Err(GridError::NoExternalGrid)));
    }

    #[test]
    fn unsupplied_island_reports_nan() {
        let mut net = feeder();
        net.lines[0].in_service = false;
        let outcome = run_power_flow(&net).unwrap();
        assert!(outcome.converged);
        let res = outcome.results().unwrap();
        assert!(res.bus[1].vm_pu.is_nan());
        assert_eq!(res.line[0].loading_percent, 0.0);
        assert_eq!(res.load[0].p_mw, 0.0);
    }

    #[test]
    fn hopeless_case_does_not_converge() {
        let mut net = feeder();
        net.loads[0].p_mw = 50.0;
        let outcome = NewtonRaphson::new(SolverOptions::new().with_max_iterations(5))
            .solve(&net)
            .unwrap();
        assert!(!outcome.converged);
        assert!(outcome.results().is_none());
    }

    #[test]
    fn auto_angles_follow_voltage_level() {
        let net = feeder();
        assert!(!SolverOptions::default().angles_enabled(&net));
        let mut hv = Network::new("hv");
        hv.create_bus("a", 110.0);
        assert!(SolverOptions::default().angles_enabled(&hv));
    }

    #[test]
    fn phase_shift_appears_across_transformer() {
        let mut net = Network::new("shift");
        let hv = net.create_bus("hv", 20.0);
        let lv = net.create_bus("lv", 0.4);
        net.create_ext_grid(hv, 1.0, 0.0, "grid").unwrap();
        net.create_transformer(hv, lv, "0.4 MVA 20/0.4 kV", "T").unwrap();
        net.create_load(lv, 0.1, 0.02, "load").unwrap();

        let solver = NewtonRaphson::new(SolverOptions::new().with_voltage_angles(VoltageAngles::On));
        let outcome = solver.solve(&net).unwrap();
        assert!(outcome.converged);
        let va = outcome.results().unwrap().bus[lv].va_degree;
        // Dyn5: the lv side lags by 150 degrees
        assert!((va + 150.0).abs() < 2.0, "va = {va}");
    }
}
