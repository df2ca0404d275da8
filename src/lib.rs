//! Build a power grid from code or a JSON description, solve the AC power
//! flow and grade the result against voltage, loading and angle limits.
//! N-1 contingency sweeps and short-circuit currents run on the same model.

pub mod builder;
pub mod case;
pub mod config;
pub mod contingency;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod loadflow;
pub mod report;
pub mod results;
pub mod scenarios;
pub mod shortcircuit;
pub mod std_types;
pub mod ybus;

pub use builder::{BuiltNetwork, BusLookup, NetworkBuilder};
pub use case::{BranchKind, Network};
pub use config::NetworkConfig;
pub use contingency::{ContingencyResults, run_contingency};
pub use diagnostics::{DiagnosticReport, Tier, classify, classify_all, diagnose};
pub use error::{GridError, GridResult};
pub use export::{network_to_dot, write_plot};
pub use loadflow::{
    NewtonRaphson, PowerFlowOutcome, PowerFlowSolver, SolverOptions, VoltageAngles,
    run_power_flow,
};
pub use report::{Diagnosis, ScenarioOutput};
pub use results::PowerFlowResults;
pub use shortcircuit::{ShortCircuitResults, calc_sc};
