use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GridError, GridResult};
use crate::std_types::{LineType, StdTypeLibrary, TrafoType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub index: usize,
    pub name: String,
    pub vn_kv: f64,
    pub in_service: bool,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:>3} {:<32} {:>8.3} kV",
            self.index, self.name, self.vn_kv
        )
    }
}

/// Upstream network connection; its bus is a slack bus in the power flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtGrid {
    pub index: usize,
    pub name: String,
    pub bus: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub in_service: bool,

    // Short-circuit data
    pub s_sc_max_mva: Option<f64>,
    pub s_sc_min_mva: Option<f64>,
    pub rx_max: Option<f64>,
    pub rx_min: Option<f64>,
}

impl fmt::Display for ExtGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtGrid {:>3} {:<24} Bus {:>3}  Vm={:.4} pu  Va={:>8.3} deg",
            self.index, self.name, self.bus, self.vm_pu, self.va_degree
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub index: usize,
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub length_km: f64,
    pub std_type: String,
    pub params: LineType,
    pub parallel: u32,
    /// Derating factor applied to the thermal limit.
    pub df: f64,
    pub in_service: bool,
}

impl Line {
    /// Rated current of the line including parallel systems and derating.
    pub fn rated_i_ka(&self) -> f64 {
        self.params.max_i_ka * self.df * self.parallel as f64
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line {:>3} {:<24} From->To: {:>3} -> {:<3} {:>8.3} km  Type: {}",
            self.index, self.name, self.from_bus, self.to_bus, self.length_km, self.std_type
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub index: usize,
    pub name: String,
    pub hv_bus: usize,
    pub lv_bus: usize,
    pub std_type: String,
    pub params: TrafoType,
    pub tap_pos: f64,
    pub in_service: bool,
}

impl Transformer {
    /// Off-nominal ratio from the tap changer position (1.0 at neutral).
    pub fn tap_ratio(&self) -> f64 {
        1.0 + (self.tap_pos - self.params.tap_neutral) * self.params.tap_step_percent / 100.0
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Xfmr {:>3} {:<24} HV->LV: {:>3} -> {:<3} Tap={:.4}  Type: {}",
            self.index,
            self.name,
            self.hv_bus,
            self.lv_bus,
            self.tap_ratio(),
            self.std_type
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub index: usize,
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub scaling: f64,
    pub in_service: bool,
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Load {:>3} {:<24} Bus {:>3}  P={:>9.4} MW  Q={:>9.4} MVAR",
            self.index, self.name, self.bus, self.p_mw, self.q_mvar
        )
    }
}

/// Static generator: a fixed P/Q injection (PV panels, converters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticGen {
    pub index: usize,
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub scaling: f64,
    pub in_service: bool,

    // Short-circuit contribution
    pub sn_mva: Option<f64>,
    pub k: Option<f64>,
}

impl fmt::Display for StaticGen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SGen {:>3} {:<24} Bus {:>3}  P={:>9.4} MW  Q={:>9.4} MVAR",
            self.index, self.name, self.bus, self.p_mw, self.q_mvar
        )
    }
}

/// Voltage-controlled generator (PV bus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub index: usize,
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub vm_pu: f64,
    pub in_service: bool,
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gen {:>3} {:<24} Bus {:>3}  P={:>9.4} MW  Vset={:.4} pu",
            self.index, self.name, self.bus, self.p_mw, self.vm_pu
        )
    }
}

/// Fixed shunt such as a capacitor bank, a constant admittance at its bus.
///
/// `p_mw` and `q_mvar` are consumed at 1.0 pu; a capacitor has negative `q_mvar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shunt {
    pub index: usize,
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub in_service: bool,
}

impl fmt::Display for Shunt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Shunt {:>3} {:<24} Bus {:>3}  P={:>9.4} MW  Q={:>9.4} MVAR",
            self.index, self.name, self.bus, self.p_mw, self.q_mvar
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Line,
    Trafo,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::Line => write!(f, "line"),
            BranchKind::Trafo => write!(f, "trafo"),
        }
    }
}

/// Uniform view over lines and transformers.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRef<'a> {
    pub kind: BranchKind,
    pub index: usize,
    pub name: &'a str,
    pub from_bus: usize,
    pub to_bus: usize,
    pub in_service: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    /// System base power for per-unit conversion.
    pub sn_mva: f64,
    pub f_hz: f64,

    pub buses: Vec<Bus>,
    pub ext_grids: Vec<ExtGrid>,
    pub lines: Vec<Line>,
    pub trafos: Vec<Transformer>,
    pub loads: Vec<Load>,
    pub sgens: Vec<StaticGen>,
    pub generators: Vec<Generator>,
    #[serde(default)]
    pub shunts: Vec<Shunt>,

    #[serde(skip)]
    pub std_types: StdTypeLibrary,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Case: {}  Sbase: {} MVA  Frequency: {} Hz",
            self.name, self.sn_mva, self.f_hz
        )?;
        writeln!(
            f,
            "{} buses, {} external grids, {} lines, {} transformers, {} loads, {} static generators, {} generators\n",
            self.buses.len(),
            self.ext_grids.len(),
            self.lines.len(),
            self.trafos.len(),
            self.loads.len(),
            self.sgens.len(),
            self.generators.len(),
        )?;

        writeln!(f, "=== Buses ===")?;
        for bus in &self.buses {
            writeln!(f, "  {}", bus)?;
        }

        writeln!(f, "\n=== Lines ===")?;
        for line in &self.lines {
            writeln!(f, "  {}", line)?;
        }

        writeln!(f, "\n=== Loads ===")?;
        for load in &self.loads {
            writeln!(f, "  {}", load)?;
        }

        writeln!(f, "\n=== Transformers ===")?;
        for trafo in &self.trafos {
            writeln!(f, "  {}", trafo)?;
        }

        writeln!(f, "\n=== External Grids ===")?;
        for ext_grid in &self.ext_grids {
            writeln!(f, "  {}", ext_grid)?;
        }

        if !self.sgens.is_empty() {
            writeln!(f, "\n=== Static Generators ===")?;
            for sgen in &self.sgens {
                writeln!(f, "  {}", sgen)?;
            }
        }

        if !self.generators.is_empty() {
            writeln!(f, "\n=== Generators ===")?;
            for generator in &self.generators {
                writeln!(f, "  {}", generator)?;
            }
        }

        if !self.shunts.is_empty() {
            writeln!(f, "\n=== Shunts ===")?;
            for shunt in &self.shunts {
                writeln!(f, "  {}", shunt)?;
            }
        }

        Ok(())
    }
}

impl Network {
    /// Empty network on a 1 MVA base at 50 Hz, with the built-in type library.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sn_mva: 1.0,
            f_hz: 50.0,
            buses: Vec::new(),
            ext_grids: Vec::new(),
            lines: Vec::new(),
            trafos: Vec::new(),
            loads: Vec::new(),
            sgens: Vec::new(),
            generators: Vec::new(),
            shunts: Vec::new(),
            std_types: StdTypeLibrary::builtin(),
        }
    }

    fn check_bus(&self, bus: usize) -> GridResult<()> {
        if bus < self.buses.len() {
            Ok(())
        } else {
            Err(GridError::BusOutOfRange(bus))
        }
    }

    pub fn create_bus(&mut self, name: impl Into<String>, vn_kv: f64) -> usize {
        let index = self.buses.len();
        self.buses.push(Bus {
            index,
            name: name.into(),
            vn_kv,
            in_service: true,
        });
        index
    }

    pub fn create_ext_grid(
        &mut self,
        bus: usize,
        vm_pu: f64,
        va_degree: f64,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(bus)?;
        let index = self.ext_grids.len();
        self.ext_grids.push(ExtGrid {
            index,
            name: name.into(),
            bus,
            vm_pu,
            va_degree,
            in_service: true,
            s_sc_max_mva: None,
            s_sc_min_mva: None,
            rx_max: None,
            rx_min: None,
        });
        Ok(index)
    }

    /// Creates a line from a named standard type of this network's library.
    pub fn create_line(
        &mut self,
        from_bus: usize,
        to_bus: usize,
        length_km: f64,
        std_type: &str,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        let name = name.into();
        let params = self
            .std_types
            .line(std_type)
            .cloned()
            .ok_or_else(|| GridError::UnknownStdType {
                kind: "line",
                name: std_type.to_string(),
                element: format!("line '{}'", name),
            })?;
        self.create_line_from_parameters(from_bus, to_bus, length_km, std_type, params, name)
    }

    pub fn create_line_from_parameters(
        &mut self,
        from_bus: usize,
        to_bus: usize,
        length_km: f64,
        std_type: &str,
        params: LineType,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(from_bus)?;
        self.check_bus(to_bus)?;
        let name = name.into();
        if length_km <= 0.0 {
            return Err(GridError::InvalidParameter {
                element: format!("line '{}'", name),
                reason: format!("length_km must be positive, got {}", length_km),
            });
        }
        let index = self.lines.len();
        self.lines.push(Line {
            index,
            name,
            from_bus,
            to_bus,
            length_km,
            std_type: std_type.to_string(),
            params,
            parallel: 1,
            df: 1.0,
            in_service: true,
        });
        Ok(index)
    }

    /// Creates a transformer from a named standard type of this network's library.
    pub fn create_transformer(
        &mut self,
        hv_bus: usize,
        lv_bus: usize,
        std_type: &str,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        let name = name.into();
        let params = self
            .std_types
            .trafo(std_type)
            .cloned()
            .ok_or_else(|| GridError::UnknownStdType {
                kind: "trafo",
                name: std_type.to_string(),
                element: format!("transformer '{}'", name),
            })?;
        self.create_transformer_from_parameters(hv_bus, lv_bus, std_type, params, name)
    }

    pub fn create_transformer_from_parameters(
        &mut self,
        hv_bus: usize,
        lv_bus: usize,
        std_type: &str,
        params: TrafoType,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(hv_bus)?;
        self.check_bus(lv_bus)?;
        let name = name.into();
        if params.sn_mva <= 0.0 || params.vk_percent <= 0.0 {
            return Err(GridError::InvalidParameter {
                element: format!("transformer '{}'", name),
                reason: "sn_mva and vk_percent must be positive".to_string(),
            });
        }
        let index = self.trafos.len();
        self.trafos.push(Transformer {
            index,
            name,
            hv_bus,
            lv_bus,
            std_type: std_type.to_string(),
            tap_pos: params.tap_neutral,
            params,
            in_service: true,
        });
        Ok(index)
    }

    pub fn create_load(
        &mut self,
        bus: usize,
        p_mw: f64,
        q_mvar: f64,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(bus)?;
        let index = self.loads.len();
        self.loads.push(Load {
            index,
            name: name.into(),
            bus,
            p_mw,
            q_mvar,
            scaling: 1.0,
            in_service: true,
        });
        Ok(index)
    }

    pub fn create_sgen(
        &mut self,
        bus: usize,
        p_mw: f64,
        q_mvar: f64,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(bus)?;
        let index = self.sgens.len();
        self.sgens.push(StaticGen {
            index,
            name: name.into(),
            bus,
            p_mw,
            q_mvar,
            scaling: 1.0,
            in_service: true,
            sn_mva: None,
            k: None,
        });
        Ok(index)
    }

    pub fn create_gen(
        &mut self,
        bus: usize,
        p_mw: f64,
        vm_pu: f64,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(bus)?;
        let index = self.generators.len();
        self.generators.push(Generator {
            index,
            name: name.into(),
            bus,
            p_mw,
            vm_pu,
            in_service: true,
        });
        Ok(index)
    }

    pub fn create_shunt(
        &mut self,
        bus: usize,
        p_mw: f64,
        q_mvar: f64,
        name: impl Into<String>,
    ) -> GridResult<usize> {
        self.check_bus(bus)?;
        let index = self.shunts.len();
        self.shunts.push(Shunt {
            index,
            name: name.into(),
            bus,
            p_mw,
            q_mvar,
            in_service: true,
        });
        Ok(index)
    }

    /// Sets the number of parallel systems and the derating factor of a line.
    pub fn set_line_rating(&mut self, index: usize, parallel: u32, df: f64) -> GridResult<()> {
        let line = self
            .lines
            .get_mut(index)
            .ok_or_else(|| GridError::InvalidParameter {
                element: format!("line {}", index),
                reason: "no such element".to_string(),
            })?;
        if parallel == 0 {
            return Err(GridError::InvalidParameter {
                element: format!("line '{}'", line.name),
                reason: "parallel must be at least 1".to_string(),
            });
        }
        if !(df > 0.0 && df <= 1.0) {
            return Err(GridError::InvalidParameter {
                element: format!("line '{}'", line.name),
                reason: format!("df must be in (0, 1], got {}", df),
            });
        }
        line.parallel = parallel;
        line.df = df;
        Ok(())
    }

    /// Lines followed by transformers, in index order.
    pub fn branches(&self) -> Vec<BranchRef<'_>> {
        let lines = self.lines.iter().map(|line| BranchRef {
            kind: BranchKind::Line,
            index: line.index,
            name: &line.name,
            from_bus: line.from_bus,
            to_bus: line.to_bus,
            in_service: line.in_service,
        });
        let trafos = self.trafos.iter().map(|trafo| BranchRef {
            kind: BranchKind::Trafo,
            index: trafo.index,
            name: &trafo.name,
            from_bus: trafo.hv_bus,
            to_bus: trafo.lv_bus,
            in_service: trafo.in_service,
        });
        lines.chain(trafos).collect()
    }

    /// Takes a line or transformer out of service.
    pub fn set_branch_in_service(
        &mut self,
        kind: BranchKind,
        index: usize,
        in_service: bool,
    ) -> GridResult<()> {
        let slot = match kind {
            BranchKind::Line => self.lines.get_mut(index).map(|l| &mut l.in_service),
            BranchKind::Trafo => self.trafos.get_mut(index).map(|t| &mut t.in_service),
        };
        match slot {
            Some(flag) => {
                *flag = in_service;
                Ok(())
            }
            None => Err(GridError::InvalidParameter {
                element: format!("{} {}", kind, index),
                reason: "no such element".to_string(),
            }),
        }
    }

    pub fn bus_name(&self, bus: usize) -> &str {
        self.buses.get(bus).map(|b| b.name.as_str()).unwrap_or("?")
    }
}
