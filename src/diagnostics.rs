//! Threshold checks over power flow results.
//!
//! Every tiered check goes through [`classify`]: a value above the violation
//! threshold is a [`Tier::Violation`], a value above the warning threshold is a
//! [`Tier::Warning`], anything else (including NaN from unsupplied islands) is
//! [`Tier::Ok`]. Only the elements of the worst tier found are reported, so
//! warnings disappear from a check as soon as one violation exists.

use log::{debug, info};
use serde::Serialize;
use std::fmt;

use crate::case::{BranchKind, Network};
use crate::loadflow::PowerFlowOutcome;
use crate::results::PowerFlowResults;

pub const VOLTAGE_MIN_PU: f64 = 0.95;
pub const VOLTAGE_MAX_PU: f64 = 1.05;
pub const LOADING_WARNING_PERCENT: f64 = 80.0;
pub const LOADING_VIOLATION_PERCENT: f64 = 100.0;
pub const ANGLE_WARNING_DEGREE: f64 = 20.0;
pub const ANGLE_VIOLATION_DEGREE: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Ok,
    Warning,
    Violation,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Ok => write!(f, "OK"),
            Tier::Warning => write!(f, "WARNING"),
            Tier::Violation => write!(f, "VIOLATION"),
        }
    }
}

pub fn classify(value: f64, warning: f64, violation: f64) -> Tier {
    if value > violation {
        Tier::Violation
    } else if value > warning {
        Tier::Warning
    } else {
        Tier::Ok
    }
}

/// Worst tier over a set of values.
pub fn classify_all<I>(values: I, warning: f64, violation: f64) -> Tier
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .map(|v| classify(v, warning, violation))
        .max()
        .unwrap_or(Tier::Ok)
}

/// Absolute angle difference in degrees, wrapped into [0, 180].
pub fn angle_difference(from_degree: f64, to_degree: f64) -> f64 {
    ((from_degree - to_degree + 180.0).rem_euclid(360.0) - 180.0).abs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bus,
    Line,
    Trafo,
}

impl From<BranchKind> for ElementKind {
    fn from(kind: BranchKind) -> Self {
        match kind {
            BranchKind::Line => ElementKind::Line,
            BranchKind::Trafo => ElementKind::Trafo,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Bus => write!(f, "bus"),
            ElementKind::Line => write!(f, "line"),
            ElementKind::Trafo => write!(f, "trafo"),
        }
    }
}

/// One element reported by a check, with the value that got it flagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flagged {
    pub kind: ElementKind,
    pub index: usize,
    pub name: String,
    pub value: f64,
}

impl fmt::Display for Flagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<5} {:>5} {:<32} {:>11.5}",
            self.kind.to_string(),
            self.index,
            self.name,
            self.value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredCheck {
    pub warning_threshold: f64,
    pub violation_threshold: f64,
    pub worst: Tier,
    /// Elements of the worst tier only; empty when `worst` is OK.
    pub flagged: Vec<Flagged>,
}

impl TieredCheck {
    pub fn evaluate(candidates: Vec<Flagged>, warning: f64, violation: f64) -> Self {
        let worst = classify_all(candidates.iter().map(|c| c.value), warning, violation);
        let flagged = if worst == Tier::Ok {
            Vec::new()
        } else {
            candidates
                .into_iter()
                .filter(|c| classify(c.value, warning, violation) == worst)
                .collect()
        };
        Self {
            warning_threshold: warning,
            violation_threshold: violation,
            worst,
            flagged,
        }
    }

    pub fn warnings(&self) -> &[Flagged] {
        if self.worst == Tier::Warning { &self.flagged } else { &[] }
    }

    pub fn violations(&self) -> &[Flagged] {
        if self.worst == Tier::Violation { &self.flagged } else { &[] }
    }
}

/// Two-tier voltage band check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageCheck {
    pub min_pu: f64,
    pub max_pu: f64,
    pub violations: Vec<Flagged>,
}

impl VoltageCheck {
    pub fn worst(&self) -> Tier {
        if self.violations.is_empty() { Tier::Ok } else { Tier::Violation }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSet {
    pub bus_voltage: VoltageCheck,
    pub line_loading: TieredCheck,
    pub trafo_loading: TieredCheck,
    pub angle_difference: TieredCheck,
}

impl CheckSet {
    pub fn worst(&self) -> Tier {
        [
            self.bus_voltage.worst(),
            self.line_loading.worst,
            self.trafo_loading.worst,
            self.angle_difference.worst,
        ]
        .into_iter()
        .max()
        .unwrap_or(Tier::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Checks {
    /// The power flow did not converge, so there is nothing to check.
    Skipped,
    Completed(CheckSet),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub scenario: String,
    pub converged: bool,
    pub iterations: usize,
    pub checks: Checks,
}

impl DiagnosticReport {
    pub fn check_set(&self) -> Option<&CheckSet> {
        match &self.checks {
            Checks::Completed(set) => Some(set),
            Checks::Skipped => None,
        }
    }
}

pub fn check_bus_voltage(net: &Network, res: &PowerFlowResults) -> VoltageCheck {
    let violations = res
        .bus
        .iter()
        .filter(|b| b.vm_pu < VOLTAGE_MIN_PU || b.vm_pu > VOLTAGE_MAX_PU)
        .map(|b| Flagged {
            kind: ElementKind::Bus,
            index: b.index,
            name: net.bus_name(b.index).to_string(),
            value: b.vm_pu,
        })
        .collect();
    VoltageCheck {
        min_pu: VOLTAGE_MIN_PU,
        max_pu: VOLTAGE_MAX_PU,
        violations,
    }
}

pub fn check_line_loading(net: &Network, res: &PowerFlowResults) -> TieredCheck {
    let candidates = res
        .line
        .iter()
        .map(|l| Flagged {
            kind: ElementKind::Line,
            index: l.index,
            name: net.lines[l.index].name.clone(),
            value: l.loading_percent,
        })
        .collect();
    TieredCheck::evaluate(candidates, LOADING_WARNING_PERCENT, LOADING_VIOLATION_PERCENT)
}

pub fn check_trafo_loading(net: &Network, res: &PowerFlowResults) -> TieredCheck {
    let candidates = res
        .trafo
        .iter()
        .map(|t| Flagged {
            kind: ElementKind::Trafo,
            index: t.index,
            name: net.trafos[t.index].name.clone(),
            value: t.loading_percent,
        })
        .collect();
    TieredCheck::evaluate(candidates, LOADING_WARNING_PERCENT, LOADING_VIOLATION_PERCENT)
}

/// Angle difference across every in-service branch.
///
/// Transformer angles are compared after removing the phase shift the solver
/// applied, so a vector group alone never trips the check.
pub fn check_angle_difference(net: &Network, res: &PowerFlowResults) -> TieredCheck {
    let candidates = net
        .branches()
        .into_iter()
        .filter(|br| br.in_service)
        .map(|br| {
            let shift = match br.kind {
                BranchKind::Line => 0.0,
                BranchKind::Trafo => res.trafo[br.index].shift_degree,
            };
            let va_from = res.bus[br.from_bus].va_degree - shift;
            let va_to = res.bus[br.to_bus].va_degree;
            Flagged {
                kind: br.kind.into(),
                index: br.index,
                name: br.name.to_string(),
                value: angle_difference(va_from, va_to),
            }
        })
        .collect();
    TieredCheck::evaluate(candidates, ANGLE_WARNING_DEGREE, ANGLE_VIOLATION_DEGREE)
}

pub fn run_checks(net: &Network, res: &PowerFlowResults) -> CheckSet {
    CheckSet {
        bus_voltage: check_bus_voltage(net, res),
        line_loading: check_line_loading(net, res),
        trafo_loading: check_trafo_loading(net, res),
        angle_difference: check_angle_difference(net, res),
    }
}

/// Runs every check, or marks them skipped when the power flow did not converge.
pub fn diagnose(scenario: &str, net: &Network, outcome: &PowerFlowOutcome) -> DiagnosticReport {
    let checks = match outcome.results() {
        Some(res) if outcome.converged => {
            let set = run_checks(net, res);
            info!("Diagnostics for '{}': worst tier {}", scenario, set.worst());
            Checks::Completed(set)
        }
        _ => {
            debug!("Diagnostics for '{}' skipped: no converged results", scenario);
            Checks::Skipped
        }
    };
    DiagnosticReport {
        scenario: scenario.to_string(),
        converged: outcome.converged,
        iterations: outcome.iterations,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{BusResult, LineResult};

    fn flagged(index: usize, value: f64) -> Flagged {
        Flagged {
            kind: ElementKind::Line,
            index,
            name: format!("L{index}"),
            value,
        }
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(80.0, 80.0, 100.0), Tier::Ok);
        assert_eq!(classify(80.0001, 80.0, 100.0), Tier::Warning);
        assert_eq!(classify(100.0, 80.0, 100.0), Tier::Warning);
        assert_eq!(classify(100.5, 80.0, 100.0), Tier::Violation);
        assert_eq!(classify(f64::NAN, 80.0, 100.0), Tier::Ok);
    }

    #[test]
    fn classify_all_takes_worst() {
        assert_eq!(classify_all([10.0, 85.0, 50.0], 80.0, 100.0), Tier::Warning);
        assert_eq!(classify_all(Vec::<f64>::new(), 80.0, 100.0), Tier::Ok);
    }

    #[test]
    fn warnings_only_when_nothing_overloaded() {
        let check = TieredCheck::evaluate(
            vec![flagged(0, 50.0), flagged(1, 90.0), flagged(2, 100.0)],
            80.0,
            100.0,
        );
        assert_eq!(check.worst, Tier::Warning);
        let idx: Vec<_> = check.warnings().iter().map(|f| f.index).collect();
        assert_eq!(idx, vec![1, 2]);
        assert!(check.violations().is_empty());
    }

    #[test]
    fn violation_suppresses_warnings() {
        let check = TieredCheck::evaluate(
            vec![flagged(0, 90.0), flagged(1, 120.0), flagged(2, 85.0)],
            80.0,
            100.0,
        );
        assert_eq!(check.worst, Tier::Violation);
        assert!(check.warnings().is_empty());
        let idx: Vec<_> = check.violations().iter().map(|f| f.index).collect();
        assert_eq!(idx, vec![1]);
    }

    #[test]
    fn low_loading_flags_nothing() {
        let check = TieredCheck::evaluate(vec![flagged(0, 10.0), flagged(1, 80.0)], 80.0, 100.0);
        assert_eq!(check.worst, Tier::Ok);
        assert!(check.flagged.is_empty());
    }

    #[test]
    fn angle_difference_is_symmetric() {
        for (a, b) in [(0.0, 25.0), (-10.0, 12.5), (170.0, -170.0), (-150.0, 0.0)] {
            assert_eq!(angle_difference(a, b), angle_difference(b, a));
        }
        assert!((angle_difference(170.0, -170.0) - 20.0).abs() < 1e-9);
        assert!((angle_difference(5.0, -20.0) - 25.0).abs() < 1e-12);
    }

    fn bus_row(index: usize, vm_pu: f64, va_degree: f64) -> BusResult {
        BusResult {
            index,
            vm_pu,
            va_degree,
            p_mw: 0.0,
            q_mvar: 0.0,
        }
    }

    fn line_row(index: usize, loading_percent: f64) -> LineResult {
        LineResult {
            index,
            p_from_mw: 0.0,
            q_from_mvar: 0.0,
            p_to_mw: 0.0,
            q_to_mvar: 0.0,
            pl_mw: 0.0,
            ql_mvar: 0.0,
            i_from_ka: 0.0,
            i_to_ka: 0.0,
            i_ka: 0.0,
            vm_from_pu: 1.0,
            va_from_degree: 0.0,
            vm_to_pu: 1.0,
            va_to_degree: 0.0,
            loading_percent,
        }
    }

    fn three_bus_line_net() -> Network {
        let mut net = Network::new("checks");
        let a = net.create_bus("a", 0.4);
        let b = net.create_bus("b", 0.4);
        let c = net.create_bus("c", 0.4);
        net.create_line(a, b, 0.1, "NAYY 4x50 SE", "ab").unwrap();
        net.create_line(b, c, 0.1, "NAYY 4x50 SE", "bc").unwrap();
        net
    }

    fn results(bus: Vec<BusResult>, line: Vec<LineResult>) -> PowerFlowResults {
        PowerFlowResults {
            bus,
            line,
            trafo: Vec::new(),
            load: Vec::new(),
            sgen: Vec::new(),
            generator: Vec::new(),
            ext_grid: Vec::new(),
            shunt: Vec::new(),
        }
    }

    #[test]
    fn voltage_band_is_inclusive() {
        let net = three_bus_line_net();
        let res = results(
            vec![bus_row(0, 0.95, 0.0), bus_row(1, 1.05, 0.0), bus_row(2, 0.9499, 0.0)],
            vec![],
        );
        let check = check_bus_voltage(&net, &res);
        assert_eq!(check.violations.len(), 1);
        assert_eq!(check.violations[0].index, 2);
        assert_eq!(check.violations[0].name, "c");
    }

    #[test]
    fn isolated_bus_is_not_a_violation() {
        let net = three_bus_line_net();
        let res = results(
            vec![bus_row(0, 1.0, 0.0), bus_row(1, 1.0, 0.0), BusResult::isolated(2)],
            vec![],
        );
        assert!(check_bus_voltage(&net, &res).violations.is_empty());
    }

    #[test]
    fn angle_check_uses_bus_angles() {
        let net = three_bus_line_net();
        let res = results(
            vec![bus_row(0, 1.0, 0.0), bus_row(1, 1.0, -22.0), bus_row(2, 1.0, -40.0)],
            vec![line_row(0, 10.0), line_row(1, 10.0)],
        );
        let check = check_angle_difference(&net, &res);
        // ab = 22 (warning), bc = 18 (ok)
        assert_eq!(check.worst, Tier::Warning);
        assert_eq!(check.flagged.len(), 1);
        assert_eq!(check.flagged[0].name, "ab");
    }

    #[test]
    fn skipped_when_not_converged() {
        let net = three_bus_line_net();
        let report = diagnose("x", &net, &PowerFlowOutcome::not_converged(10));
        assert_eq!(report.checks, Checks::Skipped);
        assert!(report.check_set().is_none());
        assert!(!report.converged);
    }
}
