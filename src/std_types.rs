use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Electrical template for overhead lines and cables, per km.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineType {
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    #[serde(default)]
    pub c_nf_per_km: f64,
    #[serde(default)]
    pub g_us_per_km: f64,
    pub max_i_ka: f64,
}

/// Electrical template for two-winding transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoType {
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    #[serde(default)]
    pub pfe_kw: f64,
    #[serde(default)]
    pub i0_percent: f64,
    #[serde(default)]
    pub shift_degree: f64,
    #[serde(default)]
    pub tap_step_percent: f64,
    #[serde(default)]
    pub tap_neutral: f64,
}

/// Named catalog of line and transformer types.
///
/// [`StdTypeLibrary::builtin`] carries a handful of common types; a network
/// configuration can add entries or replace them by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdTypeLibrary {
    pub lines: BTreeMap<String, LineType>,
    pub trafos: BTreeMap<String, TrafoType>,
}

impl StdTypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut lib = Self::new();

        // Low voltage cables
        lib.add_line("NAYY 4x50 SE", line(0.642, 0.083, 210.0, 0.142));
        lib.add_line("NAYY 4x120 SE", line(0.225, 0.080, 264.0, 0.242));
        lib.add_line("NAYY 4x150 SE", line(0.208, 0.080, 261.0, 0.270));

        // Medium voltage cables
        lib.add_line("NA2XS2Y 1x95 RM/12/20 kV", line(0.313, 0.132, 216.0, 0.252));
        lib.add_line("NA2XS2Y 1x185 RM/12/20 kV", line(0.161, 0.117, 273.0, 0.362));

        // High voltage overhead lines
        lib.add_line("149-AL1/24-ST1A 110.0", line(0.194, 0.410, 8.75, 0.470));
        lib.add_line("243-AL1/39-ST1A 110.0", line(0.1188, 0.390, 9.0, 0.645));

        lib.add_trafo(
            "0.25 MVA 20/0.4 kV",
            trafo(0.25, 20.0, 0.4, 6.0, 1.44, 0.8, 0.32, 150.0, 2.5),
        );
        lib.add_trafo(
            "0.4 MVA 20/0.4 kV",
            trafo(0.4, 20.0, 0.4, 6.0, 1.425, 1.35, 0.3375, 150.0, 2.5),
        );
        lib.add_trafo(
            "0.63 MVA 20/0.4 kV",
            trafo(0.63, 20.0, 0.4, 6.0, 1.206, 1.65, 0.2619, 150.0, 2.5),
        );
        lib.add_trafo(
            "25 MVA 110/20 kV",
            trafo(25.0, 110.0, 20.0, 12.0, 0.41, 14.0, 0.07, 150.0, 1.5),
        );
        lib.add_trafo(
            "40 MVA 110/20 kV",
            trafo(40.0, 110.0, 20.0, 16.2, 0.34, 18.0, 0.05, 150.0, 1.5),
        );

        lib
    }

    /// Adds a line type, replacing any existing entry with the same name.
    pub fn add_line(&mut self, name: impl Into<String>, data: LineType) {
        self.lines.insert(name.into(), data);
    }

    /// Adds a transformer type, replacing any existing entry with the same name.
    pub fn add_trafo(&mut self, name: impl Into<String>, data: TrafoType) {
        self.trafos.insert(name.into(), data);
    }

    pub fn line(&self, name: &str) -> Option<&LineType> {
        self.lines.get(name)
    }

    pub fn trafo(&self, name: &str) -> Option<&TrafoType> {
        self.trafos.get(name)
    }
}

fn line(r_ohm_per_km: f64, x_ohm_per_km: f64, c_nf_per_km: f64, max_i_ka: f64) -> LineType {
    LineType {
        r_ohm_per_km,
        x_ohm_per_km,
        c_nf_per_km,
        g_us_per_km: 0.0,
        max_i_ka,
    }
}

#[allow(clippy::too_many_arguments)]
fn trafo(
    sn_mva: f64,
    vn_hv_kv: f64,
    vn_lv_kv: f64,
    vk_percent: f64,
    vkr_percent: f64,
    pfe_kw: f64,
    i0_percent: f64,
    shift_degree: f64,
    tap_step_percent: f64,
) -> TrafoType {
    TrafoType {
        sn_mva,
        vn_hv_kv,
        vn_lv_kv,
        vk_percent,
        vkr_percent,
        pfe_kw,
        i0_percent,
        shift_degree,
        tap_step_percent,
        tap_neutral: 0.0,
    }
}
