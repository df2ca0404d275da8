use serde::Serialize;
use std::fmt;

/// Per-bus power flow results. `p_mw`/`q_mvar` are net consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub index: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub p_mw: f64,
    pub q_mvar: f64,
}

impl BusResult {
    pub fn isolated(index: usize) -> Self {
        Self {
            index,
            vm_pu: f64::NAN,
            va_degree: f64::NAN,
            p_mw: f64::NAN,
            q_mvar: f64::NAN,
        }
    }
}

impl fmt::Display for BusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>10.6} {:>11.5} {:>11.6} {:>11.6}",
            self.index, self.vm_pu, self.va_degree, self.p_mw, self.q_mvar
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub index: usize,
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    pub i_from_ka: f64,
    pub i_to_ka: f64,
    pub i_ka: f64,
    pub vm_from_pu: f64,
    pub va_from_degree: f64,
    pub vm_to_pu: f64,
    pub va_to_degree: f64,
    pub loading_percent: f64,
}

impl fmt::Display for LineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>11.6} {:>11.6} {:>11.6} {:>11.6} {:>11.6} {:>9.5} {:>9.3}",
            self.index,
            self.p_from_mw,
            self.q_from_mvar,
            self.p_to_mw,
            self.q_to_mvar,
            self.pl_mw,
            self.i_ka,
            self.loading_percent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafoResult {
    pub index: usize,
    pub p_hv_mw: f64,
    pub q_hv_mvar: f64,
    pub p_lv_mw: f64,
    pub q_lv_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    pub i_hv_ka: f64,
    pub i_lv_ka: f64,
    pub vm_hv_pu: f64,
    pub va_hv_degree: f64,
    pub vm_lv_pu: f64,
    pub va_lv_degree: f64,
    /// Phase shift applied by the solver (zero when voltage angles are off).
    pub shift_degree: f64,
    pub loading_percent: f64,
}

impl fmt::Display for TrafoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>11.6} {:>11.6} {:>10.6} {:>10.6} {:>9.3}",
            self.index, self.pl_mw, self.ql_mvar, self.vm_hv_pu, self.vm_lv_pu, self.loading_percent
        )
    }
}

/// P/Q of a load, static generator, external grid or shunt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionResult {
    pub index: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
}

impl fmt::Display for InjectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {:>11.6} {:>11.6}", self.index, self.p_mw, self.q_mvar)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenResult {
    pub index: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub va_degree: f64,
    pub vm_pu: f64,
}

impl fmt::Display for GenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>11.6} {:>11.6} {:>11.5} {:>10.6}",
            self.index, self.p_mw, self.q_mvar, self.va_degree, self.vm_pu
        )
    }
}

/// Result tables of one converged power flow, indexed like the network's element lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowResults {
    pub bus: Vec<BusResult>,
    pub line: Vec<LineResult>,
    pub trafo: Vec<TrafoResult>,
    pub load: Vec<InjectionResult>,
    pub sgen: Vec<InjectionResult>,
    pub generator: Vec<GenResult>,
    pub ext_grid: Vec<InjectionResult>,
    pub shunt: Vec<InjectionResult>,
}

impl fmt::Display for PowerFlowResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Bus Results ===")?;
        writeln!(
            f,
            "{:>5} {:>10} {:>11} {:>11} {:>11}",
            "index", "vm_pu", "va_degree", "p_mw", "q_mvar"
        )?;
        for row in &self.bus {
            writeln!(f, "{}", row)?;
        }

        writeln!(f, "\n=== Line Results ===")?;
        writeln!(
            f,
            "{:>5} {:>11} {:>11} {:>11} {:>11} {:>11} {:>9} {:>9}",
            "index", "p_from_mw", "q_from_mvar", "p_to_mw", "q_to_mvar", "pl_mw", "i_ka", "loading_%"
        )?;
        for row in &self.line {
            writeln!(f, "{}", row)?;
        }

        writeln!(f, "\n=== Load Results ===")?;
        writeln!(f, "{:>5} {:>11} {:>11}", "index", "p_mw", "q_mvar")?;
        for row in &self.load {
            writeln!(f, "{}", row)?;
        }

        writeln!(f, "\n=== Transformer Results ===")?;
        writeln!(
            f,
            "{:>5} {:>11} {:>11} {:>10} {:>10} {:>9}",
            "index", "pl_mw", "ql_mvar", "vm_hv_pu", "vm_lv_pu", "loading_%"
        )?;
        for row in &self.trafo {
            writeln!(f, "{}", row)?;
        }

        if !self.sgen.is_empty() {
            writeln!(f, "\n=== Static Generator Results ===")?;
            writeln!(f, "{:>5} {:>11} {:>11}", "index", "p_mw", "q_mvar")?;
            for row in &self.sgen {
                writeln!(f, "{}", row)?;
            }
        }

        if !self.generator.is_empty() {
            writeln!(f, "\n=== Generator Results ===")?;
            writeln!(
                f,
                "{:>5} {:>11} {:>11} {:>11} {:>10}",
                "index", "p_mw", "q_mvar", "va_degree", "vm_pu"
            )?;
            for row in &self.generator {
                writeln!(f, "{}", row)?;
            }
        }

        if !self.shunt.is_empty() {
            writeln!(f, "\n=== Shunt Results ===")?;
            writeln!(f, "{:>5} {:>11} {:>11}", "index", "p_mw", "q_mvar")?;
            for row in &self.shunt {
                writeln!(f, "{}", row)?;
            }
        }

        writeln!(f, "\n=== External Grid Results ===")?;
        writeln!(f, "{:>5} {:>11} {:>11}", "index", "p_mw", "q_mvar")?;
        for row in &self.ext_grid {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}
