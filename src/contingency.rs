//! N-1 contingency sweep over lines and transformers.

use log::{debug, info, warn};
use serde::Serialize;

use crate::case::{BranchKind, Network};
use crate::diagnostics::LOADING_VIOLATION_PERCENT;
use crate::error::GridResult;
use crate::loadflow::{PowerFlowOutcome, PowerFlowSolver};
use crate::results::PowerFlowResults;

/// Result of one single-element outage. `results` is `None` when the case
/// did not converge or the solver rejected it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContingencyCase {
    pub element: BranchKind,
    pub index: usize,
    pub name: String,
    pub converged: bool,
    pub results: Option<PowerFlowResults>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusSummary {
    pub index: usize,
    pub min_vm_pu: f64,
    pub max_vm_pu: f64,
}

/// Loading envelope of one branch over the base case and all outages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSummary {
    pub index: usize,
    pub min_loading_percent: f64,
    pub max_loading_percent: f64,
    /// True when taking this branch out overloads another branch.
    pub causes_overloading: bool,
    /// Outage responsible for `max_loading_percent`; `None` means the base case.
    pub cause_element: Option<BranchKind>,
    pub cause_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContingencyResults {
    pub base: PowerFlowOutcome,
    pub cases: Vec<ContingencyCase>,
    pub bus: Vec<BusSummary>,
    pub line: Vec<BranchSummary>,
    pub trafo: Vec<BranchSummary>,
}

impl ContingencyResults {
    pub fn case(&self, element: BranchKind, index: usize) -> Option<&ContingencyCase> {
        self.cases
            .iter()
            .find(|c| c.element == element && c.index == index)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ContingencyCase> {
        self.cases.iter().filter(|c| c.results.is_none())
    }
}

/// Running min/max that ignores NaN.
#[derive(Debug, Clone, Copy)]
struct Envelope {
    min: f64,
    max: f64,
    cause: Option<(BranchKind, usize)>,
}

impl Envelope {
    fn new() -> Self {
        Self {
            min: f64::NAN,
            max: f64::NAN,
            cause: None,
        }
    }

    fn update(&mut self, value: f64, cause: Option<(BranchKind, usize)>) {
        if value.is_nan() {
            return;
        }
        if self.min.is_nan() || value < self.min {
            self.min = value;
        }
        if self.max.is_nan() || value > self.max {
            self.max = value;
            self.cause = cause;
        }
    }
}

fn overloads_any(res: &PowerFlowResults) -> bool {
    res.line
        .iter()
        .map(|l| l.loading_percent)
        .chain(res.trafo.iter().map(|t| t.loading_percent))
        .any(|loading| loading > LOADING_VIOLATION_PERCENT)
}

/// Solves one outage on a fresh copy of `net`.
fn run_case<S: PowerFlowSolver + ?Sized>(
    net: &Network,
    solver: &S,
    element: BranchKind,
    index: usize,
    name: &str,
) -> ContingencyCase {
    let mut outaged = net.clone();
    let outcome = outaged
        .set_branch_in_service(element, index, false)
        .and_then(|_| solver.solve(&outaged));

    let (converged, results) = match outcome {
        Ok(outcome) => (outcome.converged, outcome.results),
        Err(err) => {
            warn!("Contingency {} '{}' failed: {}", element, name, err);
            (false, None)
        }
    };
    debug!(
        "Contingency {} {:>3} '{}': {}",
        element,
        index,
        name,
        if converged { "converged" } else { "no result" }
    );
    ContingencyCase {
        element,
        index,
        name: name.to_string(),
        converged,
        results: if converged { results } else { None },
    }
}

/// Takes every line and transformer out of service, one at a time, and
/// re-solves. A case that fails is recorded without results and the sweep
/// carries on. Errors are only returned for the base case.
pub fn run_contingency<S: PowerFlowSolver + ?Sized>(
    net: &Network,
    solver: &S,
) -> GridResult<ContingencyResults> {
    let base = solver.solve(net)?;
    if !base.converged {
        warn!("Base case of '{}' did not converge", net.name);
    }

    let cases: Vec<ContingencyCase> = net
        .branches()
        .iter()
        .map(|br| run_case(net, solver, br.kind, br.index, br.name))
        .collect();

    let mut bus_env = vec![Envelope::new(); net.buses.len()];
    let mut line_env = vec![Envelope::new(); net.lines.len()];
    let mut trafo_env = vec![Envelope::new(); net.trafos.len()];

    let mut fold = |res: &PowerFlowResults, cause: Option<(BranchKind, usize)>| {
        for (env, b) in bus_env.iter_mut().zip(&res.bus) {
            env.update(b.vm_pu, cause);
        }
        for (env, l) in line_env.iter_mut().zip(&res.line) {
            env.update(l.loading_percent, cause);
        }
        for (env, t) in trafo_env.iter_mut().zip(&res.trafo) {
            env.update(t.loading_percent, cause);
        }
    };

    if let Some(res) = base.results() {
        fold(res, None);
    }
    for case in &cases {
        if let Some(res) = &case.results {
            fold(res, Some((case.element, case.index)));
        }
    }

    let causes_overloading = |kind: BranchKind, index: usize| {
        cases
            .iter()
            .find(|c| c.element == kind && c.index == index)
            .and_then(|c| c.results.as_ref())
            .is_some_and(overloads_any)
    };
    let summarize = |kind: BranchKind, envs: &[Envelope]| -> Vec<BranchSummary> {
        envs.iter()
            .enumerate()
            .map(|(index, env)| BranchSummary {
                index,
                min_loading_percent: env.min,
                max_loading_percent: env.max,
                causes_overloading: causes_overloading(kind, index),
                cause_element: env.cause.map(|(k, _)| k),
                cause_index: env.cause.map(|(_, i)| i),
            })
            .collect()
    };

    let line = summarize(BranchKind::Line, &line_env);
    let trafo = summarize(BranchKind::Trafo, &trafo_env);
    let bus = bus_env
        .iter()
        .enumerate()
        .map(|(index, env)| BusSummary {
            index,
            min_vm_pu: env.min,
            max_vm_pu: env.max,
        })
        .collect();

    let failed = cases.iter().filter(|c| c.results.is_none()).count();
    info!(
        "Contingency sweep of '{}': {} cases, {} without results",
        net.name,
        cases.len(),
        failed
    );

    Ok(ContingencyResults {
        base,
        cases,
        bus,
        line,
        trafo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;
    use crate::loadflow::NewtonRaphson;

    /// Three buses in a ring with one load, so any single line can be lost.
    fn ring() -> Network {
        let mut net = Network::new("ring");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        let c = net.create_bus("c", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_line(a, b, 0.1, "NAYY 4x150 SE", "ab").unwrap();
        net.create_line(b, c, 0.1, "NAYY 4x150 SE", "bc").unwrap();
        net.create_line(c, a, 0.1, "NAYY 4x150 SE", "ca").unwrap();
        net.create_load(b, 0.08, 0.02, "load").unwrap();
        net
    }

    #[test]
    fn one_case_per_branch() {
        let net = ring();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        assert_eq!(res.cases.len(), 3);
        let names: Vec<_> = res.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ab", "bc", "ca"]);
        assert!(res.cases.iter().all(|c| c.converged));
    }

    #[test]
    fn cases_are_independent() {
        let net = ring();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        assert!(net.lines.iter().all(|l| l.in_service));
        for case in &res.cases {
            let lines = &case.results.as_ref().unwrap().line;
            for l in lines {
                if l.index == case.index {
                    assert_eq!(l.loading_percent, 0.0);
                } else {
                    assert!(l.loading_percent > 0.0);
                }
            }
        }
    }

    #[test]
    fn losing_the_feeding_line_raises_the_other_path() {
        let net = ring();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        let base_ab = res.base.results().unwrap().line[0].loading_percent;
        // with ab out, bc carries the whole load
        let bc = &res.line[1];
        assert!(bc.max_loading_percent > base_ab);
        assert_eq!(bc.cause_element, Some(BranchKind::Line));
        assert_eq!(bc.cause_index, Some(0));
        assert_eq!(res.line[0].min_loading_percent, 0.0);
        assert!(res.bus[1].min_vm_pu < res.bus[1].max_vm_pu);
    }

    /// Refuses any network with line `1` out of service.
    struct PickySolver;

    impl PowerFlowSolver for PickySolver {
        fn solve(&self, net: &Network) -> GridResult<PowerFlowOutcome> {
            if !net.lines[1].in_service {
                return Err(GridError::Numerical("refused".to_string()));
            }
            NewtonRaphson::default().solve(net)
        }
    }

    #[test]
    fn failing_case_does_not_stop_the_sweep() {
        let net = ring();
        let res = run_contingency(&net, &PickySolver).unwrap();
        assert_eq!(res.cases.len(), 3);
        assert!(res.case(BranchKind::Line, 1).unwrap().results.is_none());
        assert!(res.case(BranchKind::Line, 2).unwrap().results.is_some());
        assert_eq!(res.failed().count(), 1);
    }

    #[test]
    fn radial_outage_leaves_isolated_bus_out_of_envelope() {
        let mut net = Network::new("radial");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_line(a, b, 0.1, "NAYY 4x50 SE", "ab").unwrap();
        net.create_load(b, 0.05, 0.0, "load").unwrap();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        let case = res.case(BranchKind::Line, 0).unwrap();
        assert!(case.results.as_ref().unwrap().bus[1].vm_pu.is_nan());
        // only the base case contributes a voltage for bus b
        assert_eq!(res.bus[1].min_vm_pu, res.bus[1].max_vm_pu);
        assert!(res.bus[1].min_vm_pu.is_finite());
    }

    #[test]
    fn detects_outage_causing_overload() {
        let mut net = Network::new("parallel");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        net.create_ext_grid(a, 1.0, 0.0, "grid").unwrap();
        net.create_line(a, b, 0.05, "NAYY 4x150 SE", "one").unwrap();
        net.create_line(a, b, 0.05, "NAYY 4x150 SE", "two").unwrap();
        // 0.3 kA in total against a 0.27 kA rating per line
        net.create_load(b, 0.2, 0.05, "load").unwrap();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        assert!(res.line.iter().all(|l| l.causes_overloading));
        assert!(res.line[0].max_loading_percent > 100.0);
        assert_eq!(res.line[0].cause_index, Some(1));
    }
}
