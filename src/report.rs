//! Text and JSON rendering of scenario runs.

use serde::Serialize;
use std::fmt;

use crate::case::Network;
use crate::contingency::{BranchSummary, ContingencyResults};
use crate::diagnostics::{CheckSet, Checks, DiagnosticReport, Flagged, TieredCheck, Tier};
use crate::error::GridResult;
use crate::loadflow::PowerFlowOutcome;
use crate::shortcircuit::ShortCircuitResults;

fn banner(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{:=^54}", title)
}

fn flagged_table(f: &mut fmt::Formatter<'_>, rows: &[Flagged], value: &str) -> fmt::Result {
    writeln!(f, "{:<5} {:>5} {:<32} {:>11}", "kind", "index", "name", value)?;
    for row in rows {
        writeln!(f, "{}", row)?;
    }
    writeln!(f)
}

/// Full diagnosis of one scenario: network data, power flow tables and checks.
pub struct Diagnosis<'a> {
    pub net: &'a Network,
    pub outcome: &'a PowerFlowOutcome,
    pub report: &'a DiagnosticReport,
}

impl Diagnosis<'_> {
    fn tiered(
        f: &mut fmt::Formatter<'_>,
        check: &TieredCheck,
        what: &str,
        unit: &str,
        value: &str,
    ) -> fmt::Result {
        match check.worst {
            Tier::Violation => {
                writeln!(
                    f,
                    "{} above {}{} detected:",
                    what, check.violation_threshold, unit
                )?;
                flagged_table(f, &check.flagged, value)
            }
            Tier::Warning => {
                writeln!(
                    f,
                    "{} between {} and {}{} (warning):",
                    what, check.warning_threshold, check.violation_threshold, unit
                )?;
                flagged_table(f, &check.flagged, value)
            }
            Tier::Ok => writeln!(
                f,
                "All {} are within the acceptable range (<= {}{}).\n",
                what.to_lowercase(),
                check.warning_threshold,
                unit
            ),
        }
    }

    fn checks(f: &mut fmt::Formatter<'_>, set: &CheckSet) -> fmt::Result {
        banner(f, "BUS VOLTAGE CHECK")?;
        writeln!(f)?;
        if set.bus_voltage.violations.is_empty() {
            writeln!(
                f,
                "All bus voltages are within the acceptable range ({}-{} pu).\n",
                set.bus_voltage.min_pu, set.bus_voltage.max_pu
            )?;
        } else {
            writeln!(
                f,
                "Voltage violations detected (<{}|>{}):",
                set.bus_voltage.min_pu, set.bus_voltage.max_pu
            )?;
            flagged_table(f, &set.bus_voltage.violations, "vm_pu")?;
        }

        banner(f, "LINE LOADING CHECK")?;
        writeln!(f)?;
        Self::tiered(f, &set.line_loading, "Line loadings", "%", "loading_%")?;

        banner(f, "TRANSFORMER LOADING CHECK")?;
        writeln!(f)?;
        Self::tiered(f, &set.trafo_loading, "Transformer loadings", "%", "loading_%")?;

        banner(f, "VOLTAGE ANGLE CHECK")?;
        writeln!(f)?;
        Self::tiered(
            f,
            &set.angle_difference,
            "Voltage angle differences",
            " degrees",
            "angle_diff",
        )
    }
}

impl fmt::Display for Diagnosis<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        banner(f, "RUNNING DIAGNOSTICS")?;
        writeln!(f, "\nRunning diagnostics for {}...\n", self.report.scenario)?;

        banner(f, "POWER FLOW CHECK")?;
        writeln!(f)?;
        let set = match (&self.report.checks, self.outcome.results()) {
            (Checks::Completed(set), Some(results)) => {
                writeln!(
                    f,
                    "Power flow converged successfully in {} iterations.\n",
                    self.report.iterations
                )?;
                banner(f, "NETWORK INFORMATION")?;
                writeln!(f, "\n{}", self.net)?;
                banner(f, "POWER FLOW RESULTS")?;
                writeln!(f, "\n{}", results)?;
                set
            }
            _ => {
                return writeln!(
                    f,
                    "Power flow did not converge after {} iterations, skipping further checks.",
                    self.report.iterations
                );
            }
        };

        Self::checks(f, set)?;
        writeln!(
            f,
            "Diagnosis finished, worst finding: {}.",
            set.worst()
        )
    }
}

/// Per-category tables of an N-1 sweep.
pub struct ContingencyTables<'a> {
    pub net: &'a Network,
    pub results: &'a ContingencyResults,
}

impl ContingencyTables<'_> {
    fn branch_table(
        f: &mut fmt::Formatter<'_>,
        rows: &[BranchSummary],
        name_of: impl Fn(usize) -> String,
    ) -> fmt::Result {
        writeln!(
            f,
            "{:>5} {:<28} {:>9} {:>9} {:>11} {:>10}",
            "index", "name", "min_%", "max_%", "overloads", "cause"
        )?;
        for row in rows {
            let cause = match (row.cause_element, row.cause_index) {
                (Some(kind), Some(index)) => format!("{} {}", kind, index),
                _ => "base".to_string(),
            };
            writeln!(
                f,
                "{:>5} {:<28} {:>9.3} {:>9.3} {:>11} {:>10}",
                row.index,
                name_of(row.index),
                row.min_loading_percent,
                row.max_loading_percent,
                row.causes_overloading,
                cause
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ContingencyTables<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let res = self.results;
        banner(f, "RUNNING CONTINGENCY ANALYSIS")?;
        writeln!(f)?;

        for case in res.failed() {
            writeln!(
                f,
                "Outage of {} {} '{}' gave no result.",
                case.element, case.index, case.name
            )?;
        }

        if res.bus.is_empty() {
            writeln!(f, "No bus contingency results to display.")?;
        } else {
            writeln!(f, "Bus Contingency Results:")?;
            writeln!(f, "{:>5} {:<32} {:>10} {:>10}", "index", "name", "min_vm_pu", "max_vm_pu")?;
            for row in &res.bus {
                writeln!(
                    f,
                    "{:>5} {:<32} {:>10.6} {:>10.6}",
                    row.index,
                    self.net.bus_name(row.index),
                    row.min_vm_pu,
                    row.max_vm_pu
                )?;
            }
        }

        if res.line.is_empty() {
            writeln!(f, "\nNo line contingency results to display.")?;
        } else {
            writeln!(f, "\nLine Contingency Results:")?;
            Self::branch_table(f, &res.line, |i| self.net.lines[i].name.clone())?;
        }

        if res.trafo.is_empty() {
            writeln!(f, "\nNo transformer contingency results to display.")?;
        } else {
            writeln!(f, "\nTransformer Contingency Results:")?;
            Self::branch_table(f, &res.trafo, |i| self.net.trafos[i].name.clone())?;
        }
        Ok(())
    }
}

/// Short-circuit tables under their section banner.
pub struct ShortCircuitTables<'a> {
    pub results: &'a ShortCircuitResults,
}

impl fmt::Display for ShortCircuitTables<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        banner(f, "RUNNING SHORT-CIRCUIT ANALYSIS")?;
        writeln!(f)?;
        write!(f, "{}", self.results)
    }
}

/// Everything one scenario run produced, as emitted by `--format json`.
#[derive(Debug, Serialize)]
pub struct ScenarioOutput<'a> {
    pub scenario: &'a str,
    pub network: &'a Network,
    pub power_flow: &'a PowerFlowOutcome,
    pub diagnostics: &'a DiagnosticReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contingency: Option<&'a ContingencyResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_circuit: Option<&'a ShortCircuitResults>,
}

/// Pretty-printed JSON. NaN values (unsupplied elements) become `null`.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> GridResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contingency::run_contingency;
    use crate::diagnostics::diagnose;
    use crate::loadflow::{NewtonRaphson, PowerFlowSolver, run_power_flow};

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
    fn converged_run_lists_every_check() {
        let net = feeder();
        let outcome = run_power_flow(&net).unwrap();
        let report = diagnose("Feeder", &net, &outcome);
        let text = Diagnosis {
            net: &net,
            outcome: &outcome,
            report: &report,
        }
        .to_string();
        assert!(text.contains("Running diagnostics for Feeder"));
        assert!(text.contains("BUS VOLTAGE CHECK"));
        assert!(text.contains("VOLTAGE ANGLE CHECK"));
        assert!(text.contains("=== Bus Results ==="));
    }

    #[test]
    fn diverged_run_only_reports_failure() {
        let mut net = feeder();
        net.loads[0].p_mw = 50.0;
        let outcome = NewtonRaphson::default().solve(&net).unwrap();
        let report = diagnose("Heavy", &net, &outcome);
        let text = Diagnosis {
            net: &net,
            outcome: &outcome,
            report: &report,
        }
        .to_string();
        assert!(text.contains("did not converge"));
        assert!(!text.contains("BUS VOLTAGE CHECK"));
        assert!(!text.contains("=== Bus Results ==="));
    }

    #[test]
    fn contingency_tables_name_elements() {
        let net = feeder();
        let res = run_contingency(&net, &NewtonRaphson::default()).unwrap();
        let text = ContingencyTables {
            net: &net,
            results: &res,
        }
        .to_string();
        assert!(text.contains("Line Contingency Results:"));
        assert!(text.contains("No transformer contingency results to display."));
    }

    #[test]
    fn json_turns_nan_into_null() {
        let mut net = feeder();
        net.lines[0].in_service = false;
        let outcome = run_power_flow(&net).unwrap();
        let json = to_json(&outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["results"]["bus"][1]["vm_pu"].is_null());
        assert_eq!(value["converged"], true);
    }

    #[test]
    fn skipped_checks_serialize_with_status() {
        let net = feeder();
        let report = diagnose("x", &net, &PowerFlowOutcome::not_converged(3));
        let value: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert_eq!(value["checks"]["status"], "skipped");
    }
}
