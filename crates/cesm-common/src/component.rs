//! Model components, output frequencies and reduction operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TseriesError;

/// A CESM model component, each with its own grid and region catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Atm,
    Ocn,
    Ice,
    Lnd,
}

impl Component {
    pub const ALL: [Component; 4] = [Component::Atm, Component::Ocn, Component::Ice, Component::Lnd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Atm => "atm",
            Component::Ocn => "ocn",
            Component::Ice => "ice",
            Component::Lnd => "lnd",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = TseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atm" => Ok(Component::Atm),
            "ocn" => Ok(Component::Ocn),
            "ice" => Ok(Component::Ice),
            "lnd" => Ok(Component::Lnd),
            other => Err(TseriesError::UnrecognizedComponent(other.to_string())),
        }
    }
}

/// Temporal resolution of a cached time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Mon,
    Ann,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Mon => "mon",
            Frequency::Ann => "ann",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = TseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mon" => Ok(Frequency::Mon),
            "ann" => Ok(Frequency::Ann),
            other => Err(TseriesError::UnsupportedFrequency(other.to_string())),
        }
    }
}

/// Spatial reduction applied to a weighted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    /// Sum of value times weight.
    Integrate,
    /// Sum of value times weight divided by the sum of weight over non-missing cells.
    Average,
}

impl ReduceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReduceOp::Integrate => "integrate",
            ReduceOp::Average => "average",
        }
    }

    /// Parse an op name, reporting the variable it was requested for on failure.
    pub fn parse_for(s: &str, context: &str) -> Result<Self, TseriesError> {
        match s {
            "integrate" => Ok(ReduceOp::Integrate),
            "average" => Ok(ReduceOp::Average),
            other => Err(TseriesError::unrecognized_operation(
                format!("tseries_op={}", other),
                context,
            )),
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_parse() {
        for c in Component::ALL {
            assert_eq!(c.as_str().parse::<Component>().unwrap(), c);
        }
        let err = "glc".parse::<Component>().unwrap_err();
        assert!(matches!(err, TseriesError::UnrecognizedComponent(ref s) if s == "glc"));
    }

    #[test]
    fn test_frequency_rejects_daily() {
        assert_eq!("ann".parse::<Frequency>().unwrap(), Frequency::Ann);
        assert!(matches!(
            "day".parse::<Frequency>(),
            Err(TseriesError::UnsupportedFrequency(_))
        ));
    }

    #[test]
    fn test_reduce_op_parse_for() {
        assert_eq!(ReduceOp::parse_for("average", "x").unwrap(), ReduceOp::Average);
        let err = ReduceOp::parse_for("max", "varname=TEMP").unwrap_err();
        assert!(err.to_string().contains("tseries_op=max"));
        assert!(err.to_string().contains("varname=TEMP"));
    }
}
