//! Time coordinate helpers: decoding, bounds and midpoints.

use cesm_common::time::{midpoint_decoded, midpoint_encoded, year_plus_frac};
use cesm_common::{Calendar, CfDatetime, TimeUnits, TseriesError, TseriesResult};
use ndarray::{ArrayD, IxDyn};

use crate::dataset::Dataset;

pub const TIME: &str = "time";

/// How bound midpoints are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MidpointMode {
    /// Average the encoded offsets.
    #[default]
    Encoded,
    /// Decode both bounds, take the calendar midpoint, re-encode.
    Decoded,
}

/// Calendar of the time coordinate; CF defaults to `standard`.
pub fn time_calendar(ds: &Dataset, time_name: &str) -> TseriesResult<Calendar> {
    match ds.var(time_name)?.attr_str("calendar") {
        Some(cal) => cal.parse(),
        None => Ok(Calendar::Standard),
    }
}

pub fn time_units(ds: &Dataset, time_name: &str) -> TseriesResult<TimeUnits> {
    let time = ds.var(time_name)?;
    let units = time
        .units()
        .ok_or_else(|| TseriesError::missing_attribute(time_name, "units"))?;
    TimeUnits::parse(units, time_calendar(ds, time_name)?)
}

/// Name of the bounds variable, if the time coordinate has one.
pub fn bounds_name(ds: &Dataset, time_name: &str) -> Option<String> {
    ds.get(time_name)?.attr_str("bounds").map(str::to_string)
}

/// Bounds as `(lower, upper)` pairs in time order.
pub fn bounds_pairs(ds: &Dataset, time_name: &str) -> TseriesResult<Vec<(f64, f64)>> {
    let name = bounds_name(ds, time_name).ok_or_else(|| TseriesError::missing_attribute(time_name, "bounds"))?;
    let bounds = ds.var(&name)?;
    if bounds.ndim() != 2 || !bounds.has_dim(time_name) {
        return Err(TseriesError::InvalidFormat(format!(
            "bounds variable '{}' must be ({}, d2), found ({})",
            name,
            time_name,
            bounds.dims.join(", ")
        )));
    }
    let other = bounds
        .dims
        .iter()
        .find(|d| d.as_str() != time_name)
        .cloned()
        .unwrap_or_default();
    let ordered = bounds.transpose(&[time_name, other.as_str()])?;
    let values = ordered.values()?;
    if values.shape()[1] != 2 {
        return Err(TseriesError::dimension_mismatch(name, 2, values.shape()[1]));
    }
    Ok(values.outer_iter().map(|row| (row[0], row[1])).collect())
}

pub fn decode_times(ds: &Dataset, time_name: &str) -> TseriesResult<Vec<CfDatetime>> {
    let units = time_units(ds, time_name)?;
    ds.var(time_name)?
        .values()?
        .iter()
        .map(|&v| units.decode(v))
        .collect()
}

/// Reset the time coordinate to the midpoint of its bounds.
///
/// Datasets without a `bounds` attribute on time are returned unchanged.
/// Attributes and encoding of the time variable are kept.
pub fn time_set_mid(ds: &Dataset, time_name: &str, mode: MidpointMode) -> TseriesResult<Dataset> {
    if bounds_name(ds, time_name).is_none() {
        return Ok(ds.clone());
    }
    let pairs = bounds_pairs(ds, time_name)?;
    let mids = match mode {
        MidpointMode::Encoded => pairs.iter().map(|&(l, u)| midpoint_encoded(l, u)).collect::<Vec<_>>(),
        MidpointMode::Decoded => {
            let units = time_units(ds, time_name)?;
            pairs
                .iter()
                .map(|&(l, u)| {
                    let mid = midpoint_decoded(&units.decode(l)?, &units.decode(u)?)?;
                    units.encode(&mid)
                })
                .collect::<TseriesResult<Vec<_>>>()?
        }
    };

    let mut out = ds.clone();
    let time = ds.var(time_name)?;
    let data = ArrayD::from_shape_vec(IxDyn(&[mids.len()]), mids)
        .map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;
    out.insert(time_name, time.with_data(&[time_name], data)?)?;
    Ok(out)
}

/// Time axis as year plus fraction of year.
pub fn year_plus_frac_axis(ds: &Dataset, time_name: &str) -> TseriesResult<Vec<f64>> {
    decode_times(ds, time_name)?
        .iter()
        .map(year_plus_frac)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;

    fn with_bounds(bounds: Vec<f64>, nominal: Vec<f64>) -> Dataset {
        let n = nominal.len();
        Dataset::new()
            .with_var(
                "time",
                Variable::from_values("time", nominal)
                    .with_attr("units", "days since 0001-01-01")
                    .with_attr("calendar", "noleap")
                    .with_attr("bounds", "time_bound"),
            )
            .unwrap()
            .with_var("time_bound", Variable::from_vec(&["time", "d2"], &[n, 2], bounds).unwrap())
            .unwrap()
    }

    #[test]
    fn test_encoded_midpoints() {
        // CESM stamps monthly output at the end of the interval
        let ds = with_bounds(vec![0.0, 31.0, 31.0, 59.0], vec![31.0, 59.0]);
        let mid = time_set_mid(&ds, TIME, MidpointMode::Encoded).unwrap();
        let t = mid.var("time").unwrap();
        assert_eq!(t.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![15.5, 45.0]);
        assert_eq!(t.attr_str("calendar"), Some("noleap"));
    }

    #[test]
    fn test_decoded_matches_encoded_for_day_units() {
        let ds = with_bounds(vec![0.0, 31.0, 31.0, 59.0], vec![31.0, 59.0]);
        let a = time_set_mid(&ds, TIME, MidpointMode::Encoded).unwrap();
        let b = time_set_mid(&ds, TIME, MidpointMode::Decoded).unwrap();
        let av = a.var("time").unwrap().values().unwrap().clone();
        let bv = b.var("time").unwrap().values().unwrap().clone();
        for (x, y) in av.iter().zip(bv.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bounds_transposed_storage() {
        let ds = Dataset::new()
            .with_var(
                "time",
                Variable::from_values("time", vec![31.0, 59.0])
                    .with_attr("units", "days since 0001-01-01")
                    .with_attr("bounds", "tb"),
            )
            .unwrap()
            .with_var("tb", Variable::from_vec(&["d2", "time"], &[2, 2], vec![0.0, 31.0, 31.0, 59.0]).unwrap())
            .unwrap();
        assert_eq!(bounds_pairs(&ds, TIME).unwrap(), vec![(0.0, 31.0), (31.0, 59.0)]);
    }

    #[test]
    fn test_no_bounds_is_identity() {
        let ds = Dataset::new()
            .with_var("time", Variable::from_values("time", vec![1.0]))
            .unwrap();
        assert_eq!(time_set_mid(&ds, TIME, MidpointMode::Encoded).unwrap(), ds);
    }

    #[test]
    fn test_year_plus_frac_axis() {
        let ds = with_bounds(vec![0.0, 365.0], vec![182.5]);
        let yrs = year_plus_frac_axis(&ds, TIME).unwrap();
        assert!((yrs[0] - 1.5).abs() < 1e-12);
    }
}
