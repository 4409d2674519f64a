//! Per-variable reduction settings.
//!
//! The YAML file has one section per component:
//!
//! ```yaml
//! ocn:
//!   stream: pop.h
//!   reduce_dims: [nlat, nlon]
//!   tseries_op: average
//!   vars:
//!     FG_CO2:
//!       tseries_op: integrate
//!       unit_conv: 12.0e-3 g/mmol
//!       integral_display_units: PgC/yr
//! ```
//!
//! Variables without an entry take the component defaults.

use std::collections::BTreeMap;
use std::path::Path;

use cesm_common::{Component, ReduceOp, TseriesError, TseriesResult};
use serde::{Deserialize, Serialize};

/// Settings of one variable; all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarEntry {
    /// On-disk name, when it differs from the requested name.
    pub varname: Option<String>,
    pub reduce_dims: Option<Vec<String>>,
    #[serde(alias = "weight_op")]
    pub tseries_op: Option<String>,
    /// Unit factor multiplied into the variable's units, e.g. `12.0e-3 g/mmol`.
    pub unit_conv: Option<UnitConv>,
    pub display_units: Option<String>,
    pub integral_display_units: Option<String>,
}

/// A `unit_conv` value, written either as a number or a unit expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitConv {
    Number(f64),
    Expr(String),
}

impl std::fmt::Display for UnitConv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitConv::Number(n) => write!(f, "{}", n),
            UnitConv::Expr(s) => f.write_str(s),
        }
    }
}

/// Defaults and variable table of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpecs {
    pub stream: String,
    pub reduce_dims: Vec<String>,
    pub tseries_op: String,
    #[serde(default)]
    pub vars: BTreeMap<String, VarEntry>,
}

/// Settings of a variable after applying component defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVarSpec {
    pub name: String,
    pub resolved_name: String,
    pub reduce_dims: Vec<String>,
    pub op: ReduceOp,
    pub unit_conv: Option<String>,
    pub display_units: Option<String>,
    pub integral_display_units: Option<String>,
}

impl ResolvedVarSpec {
    /// Display units for the variable's reduction op.
    pub fn output_units(&self) -> Option<&str> {
        match self.op {
            ReduceOp::Integrate => self.integral_display_units.as_deref(),
            ReduceOp::Average => self.display_units.as_deref(),
        }
    }
}

/// Var-spec table for all components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarSpecs {
    components: BTreeMap<Component, ComponentSpecs>,
}

impl VarSpecs {
    pub fn from_yaml_str(text: &str) -> TseriesResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> TseriesResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn component(&self, component: Component) -> TseriesResult<&ComponentSpecs> {
        self.components
            .get(&component)
            .ok_or_else(|| TseriesError::Config(format!("no var specs for component={}", component)))
    }

    pub fn default_stream(&self, component: Component) -> TseriesResult<&str> {
        Ok(&self.component(component)?.stream)
    }

    /// Name of `varname` as it appears in files.
    pub fn resolved_name(&self, varname: &str, component: Component) -> TseriesResult<String> {
        let specs = self.component(component)?;
        Ok(specs
            .vars
            .get(varname)
            .and_then(|v| v.varname.clone())
            .unwrap_or_else(|| varname.to_string()))
    }

    /// Full settings of `varname`; an unknown op is rejected here.
    pub fn resolve(&self, varname: &str, component: Component) -> TseriesResult<ResolvedVarSpec> {
        let specs = self.component(component)?;
        let entry = specs.vars.get(varname).cloned().unwrap_or_default();
        let op_name = entry.tseries_op.as_deref().unwrap_or(&specs.tseries_op);
        Ok(ResolvedVarSpec {
            name: varname.to_string(),
            resolved_name: entry.varname.clone().unwrap_or_else(|| varname.to_string()),
            reduce_dims: entry.reduce_dims.clone().unwrap_or_else(|| specs.reduce_dims.clone()),
            op: ReduceOp::parse_for(op_name, &format!("varname={}", varname))?,
            unit_conv: entry.unit_conv.as_ref().map(|u| u.to_string()),
            display_units: entry.display_units,
            integral_display_units: entry.integral_display_units,
        })
    }
}
