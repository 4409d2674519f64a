//! Arithmetic aligned by dimension name.

use cesm_common::{TseriesError, TseriesResult};
use ndarray::{ArrayD, Axis, IxDyn};

use crate::variable::Variable;

/// Broadcast `var` to `dims` with lengths `sizes`.
///
/// Every dimension of `var` must appear in `dims` with the same length.
pub fn broadcast_to<S: AsRef<str>>(var: &Variable, dims: &[S], sizes: &[usize]) -> TseriesResult<ArrayD<f64>> {
    let values = var.values()?;
    let positions = var
        .dims
        .iter()
        .map(|d| {
            dims.iter().position(|o| o.as_ref() == d).ok_or_else(|| {
                TseriesError::InvalidFormat(format!("cannot broadcast over missing dimension '{}'", d))
            })
        })
        .collect::<TseriesResult<Vec<_>>>()?;

    // order var's axes as they appear in the target
    let mut perm: Vec<usize> = (0..positions.len()).collect();
    perm.sort_by_key(|&i| positions[i]);
    let ordered = values.view().permuted_axes(perm.as_slice());

    let mut shape = vec![1usize; dims.len()];
    for (axis, &i) in perm.iter().enumerate() {
        let target = positions[i];
        let len = ordered.shape()[axis];
        if len != sizes[target] {
            return Err(TseriesError::DimensionMismatch {
                variable: dims[target].as_ref().to_string(),
                expected: sizes[target],
                found: len,
            });
        }
        shape[target] = len;
    }

    let reshaped = ordered
        .as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(&shape))
        .map_err(|e| TseriesError::InvalidFormat(format!("broadcast reshape: {}", e)))?;
    let out = reshaped
        .broadcast(IxDyn(sizes))
        .ok_or_else(|| TseriesError::InvalidFormat(format!("cannot broadcast {:?} to {:?}", shape, sizes)))?
        .to_owned();
    Ok(out)
}

/// Union of the dimensions of `a` and `b`: `a`'s first, then `b`'s extras.
pub fn union_dims(a: &Variable, b: &Variable) -> TseriesResult<(Vec<String>, Vec<usize>)> {
    let mut dims = a.dims.clone();
    let mut sizes = a.shape();
    for (d, len) in b.dims.iter().zip(b.shape()) {
        match a.dim_size(d) {
            Some(existing) if existing != len => {
                return Err(TseriesError::DimensionMismatch {
                    variable: d.clone(),
                    expected: existing,
                    found: len,
                })
            }
            Some(_) => {}
            None => {
                dims.push(d.clone());
                sizes.push(len);
            }
        }
    }
    Ok((dims, sizes))
}

/// Element-wise product aligned by dimension name. NaN propagates.
pub fn broadcast_mul(a: &Variable, b: &Variable) -> TseriesResult<Variable> {
    let (dims, sizes) = union_dims(a, b)?;
    let lhs = broadcast_to(a, &dims, &sizes)?;
    let rhs = broadcast_to(b, &dims, &sizes)?;
    Variable::new(&dims, lhs * rhs)
}

/// 1.0 where the value is present, 0.0 where it is NaN.
pub fn notnull(values: &ArrayD<f64>) -> ArrayD<f64> {
    values.mapv(|v| if v.is_nan() { 0.0 } else { 1.0 })
}

/// Sum over `dims`, skipping NaN. All-missing slices sum to 0.
pub fn nansum<S: AsRef<str>>(var: &Variable, dims: &[S]) -> TseriesResult<Variable> {
    let mut axes = dims
        .iter()
        .map(|d| {
            var.dim_index(d.as_ref()).ok_or_else(|| {
                TseriesError::InvalidFormat(format!("cannot reduce over missing dimension '{}'", d.as_ref()))
            })
        })
        .collect::<TseriesResult<Vec<_>>>()?;
    axes.sort_unstable();
    axes.dedup();

    let mut values = var.values()?.mapv(|v| if v.is_nan() { 0.0 } else { v });
    for &axis in axes.iter().rev() {
        values = values.sum_axis(Axis(axis));
    }
    let kept: Vec<&str> = var
        .dims
        .iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, d)| d.as_str())
        .collect();
    Variable::new(&kept, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_gw_over_lon() {
        let gw = Variable::from_values("lat", vec![1.0, 2.0]);
        let lon = Variable::from_values("lon", vec![0.0, 0.0, 0.0]);
        let out = broadcast_mul(&gw, &lon.clone()).unwrap();
        assert_eq!(out.dims, vec!["lat", "lon"]);
        let full = broadcast_to(&gw, &["lat", "lon"], &[2, 3]).unwrap();
        assert_eq!(full.iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_broadcast_reorders_axes() {
        let v = Variable::from_vec(&["lon", "lat"], &[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = broadcast_to(&v, &["time", "lat", "lon"], &[2, 2, 3]).unwrap();
        assert_eq!(out.shape(), &[2, 2, 3]);
        assert_eq!(out[[1, 0, 2]], 5.0);
        assert_eq!(out[[0, 1, 0]], 2.0);
    }

    #[test]
    fn test_broadcast_length_mismatch() {
        let v = Variable::from_values("lat", vec![1.0, 2.0]);
        assert!(broadcast_to(&v, &["lat"], &[3]).is_err());
        assert!(broadcast_to(&v, &["lon"], &[2]).is_err());
    }

    #[test]
    fn test_mul_region_by_weight() {
        let mask = Variable::from_vec(&["region", "nlat"], &[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let area = Variable::from_values("nlat", vec![10.0, 20.0]);
        let w = broadcast_mul(&mask, &area).unwrap();
        assert_eq!(w.dims, vec!["region", "nlat"]);
        assert_eq!(w.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![10.0, 0.0, 0.0, 20.0]);
    }

    #[test]
    fn test_nansum_skips_missing() {
        let v = Variable::from_vec(&["time", "nlat"], &[2, 2], vec![1.0, f64::NAN, f64::NAN, f64::NAN]).unwrap();
        let s = nansum(&v, &["nlat"]).unwrap();
        assert_eq!(s.dims, vec!["time"]);
        assert_eq!(s.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0]);
        assert_eq!(notnull(v.values().unwrap()).sum(), 1.0);
    }
}
