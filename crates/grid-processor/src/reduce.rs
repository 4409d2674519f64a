//! Weighted spatial reductions.
//!
//! Values and weights are aligned by dimension name. The result keeps the
//! value's non-reduced dimensions in order, followed by any weight-only
//! dimensions (such as `region`). Missing values are skipped; an average
//! whose weights are all missing is NaN, an all-missing integral is 0.

use cesm_common::{ReduceOp, TseriesError, TseriesResult};
use nc_dataset::ops::{broadcast_to, notnull};
use nc_dataset::Variable;
use ndarray::{Array2, ArrayD, IxDyn};
use rayon::prelude::*;

/// Values laid out as rows of kept cells by columns of reduced cells.
struct Layout {
    kept_dims: Vec<String>,
    kept_sizes: Vec<usize>,
    extra_dims: Vec<String>,
    extra_sizes: Vec<usize>,
    values: Array2<f64>,
    /// `(extra, weight-kept, reduced)` flattened to `(extra * wk, reduced)`.
    weights: Array2<f64>,
    /// Row of `weights` (within one extra slab) for each kept row.
    weight_row: Vec<usize>,
    weight_kept: usize,
}

fn dim_size(var: &Variable, dim: &str) -> Option<usize> {
    var.dim_size(dim)
}

fn layout(values: &Variable, weight: &Variable, reduce_dims: &[String]) -> TseriesResult<Layout> {
    for d in reduce_dims {
        if !values.has_dim(d) {
            return Err(TseriesError::InvalidFormat(format!(
                "reduce dimension '{}' not in ({})",
                d,
                values.dims.join(", ")
            )));
        }
        if let (Some(a), Some(b)) = (dim_size(values, d), dim_size(weight, d)) {
            if a != b {
                return Err(TseriesError::DimensionMismatch {
                    variable: d.clone(),
                    expected: a,
                    found: b,
                });
            }
        }
    }

    let reduce: Vec<&String> = values.dims.iter().filter(|d| reduce_dims.contains(d)).collect();
    let reduce_sizes: Vec<usize> = reduce.iter().map(|d| dim_size(values, d).unwrap_or(1)).collect();
    let kept_dims: Vec<String> = values.dims.iter().filter(|d| !reduce_dims.contains(d)).cloned().collect();
    let kept_sizes: Vec<usize> = kept_dims.iter().map(|d| dim_size(values, d).unwrap_or(1)).collect();
    let extra_dims: Vec<String> = weight.dims.iter().filter(|d| !values.has_dim(d)).cloned().collect();
    let extra_sizes: Vec<usize> = extra_dims.iter().map(|d| dim_size(weight, d).unwrap_or(1)).collect();
    let wkept: Vec<&String> = kept_dims.iter().filter(|d| weight.has_dim(d)).collect();
    let wkept_sizes: Vec<usize> = wkept.iter().map(|d| dim_size(weight, d).unwrap_or(1)).collect();

    let nkept: usize = kept_sizes.iter().product();
    let nred: usize = reduce_sizes.iter().product();
    let nextra: usize = extra_sizes.iter().product();
    let nwk: usize = wkept_sizes.iter().product();

    let mut v_order: Vec<&str> = kept_dims.iter().map(String::as_str).collect();
    v_order.extend(reduce.iter().map(|s| s.as_str()));
    let v = values.transpose(&v_order)?;
    let v_flat: Vec<f64> = v.values()?.iter().copied().collect();
    let values2 = Array2::from_shape_vec((nkept, nred), v_flat)
        .map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;

    let mut w_dims: Vec<&str> = extra_dims.iter().map(String::as_str).collect();
    w_dims.extend(wkept.iter().map(|s| s.as_str()));
    w_dims.extend(reduce.iter().map(|s| s.as_str()));
    let mut w_sizes = extra_sizes.clone();
    w_sizes.extend(wkept_sizes.iter().copied());
    w_sizes.extend(reduce_sizes.iter().copied());
    let w_full: ArrayD<f64> = broadcast_to(weight, &w_dims, &w_sizes)?;
    let weights2 = Array2::from_shape_vec((nextra * nwk, nred), w_full.iter().copied().collect())
        .map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;

    // map each kept row to the weight row sharing its weight-kept indices
    let weight_row = (0..nkept)
        .map(|k| {
            let mut rem = k;
            let mut idx = vec![0usize; kept_sizes.len()];
            for (i, &n) in kept_sizes.iter().enumerate().rev() {
                idx[i] = rem % n.max(1);
                rem /= n.max(1);
            }
            kept_dims
                .iter()
                .zip(idx)
                .filter(|(d, _)| weight.has_dim(d))
                .zip(wkept_sizes.iter())
                .fold(0usize, |acc, ((_, i), &n)| acc * n + i)
        })
        .collect();

    Ok(Layout {
        kept_dims,
        kept_sizes,
        extra_dims,
        extra_sizes,
        values: values2,
        weights: weights2,
        weight_row,
        weight_kept: nwk,
    })
}

/// Weighted sum or weighted average of `values` over `reduce_dims`.
///
/// The returned variable carries data only; callers attach attributes.
pub fn weighted_reduce(
    values: &Variable,
    weight: &Variable,
    reduce_dims: &[String],
    op: ReduceOp,
) -> TseriesResult<Variable> {
    let lay = layout(values, weight, reduce_dims)?;
    let nextra: usize = lay.extra_sizes.iter().product();
    let nkept = lay.values.nrows();

    let mut out = vec![0.0f64; nkept * nextra];
    out.par_chunks_mut(nextra.max(1))
        .enumerate()
        .for_each(|(k, row_out)| {
            let v = lay.values.row(k);
            for (e, slot) in row_out.iter_mut().enumerate() {
                let w = lay.weights.row(e * lay.weight_kept + lay.weight_row[k]);
                let mut num = 0.0;
                let mut den = 0.0;
                for (&vi, &wi) in v.iter().zip(w.iter()) {
                    let prod = vi * wi;
                    if !prod.is_nan() {
                        num += prod;
                        den += wi;
                    }
                }
                *slot = match op {
                    ReduceOp::Integrate => num,
                    ReduceOp::Average => num / den,
                };
            }
        });

    let mut dims = lay.kept_dims.clone();
    dims.extend(lay.extra_dims.iter().cloned());
    let mut shape = lay.kept_sizes.clone();
    shape.extend(lay.extra_sizes.iter().copied());
    let data = ArrayD::from_shape_vec(IxDyn(&shape), out).map_err(|e| TseriesError::InvalidFormat(e.to_string()))?;
    Variable::new(&dims, data)
}

/// Sum of weights over `reduce_dims` restricted to cells where `sample`
/// (one time slice of the field) is present.
pub fn weight_sum(sample: &Variable, weight: &Variable, reduce_dims: &[String]) -> TseriesResult<Variable> {
    let present = notnull(sample.values()?).mapv(|v| if v > 0.0 { 1.0 } else { f64::NAN });
    let ones = sample.with_data(&sample.dims, present)?;
    weighted_reduce(&ones, weight, reduce_dims, ReduceOp::Integrate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn region_weight() -> Variable {
        // two regions over a 2x2 grid, area 1,2,3,4
        Variable::from_vec(
            &["region", "nlat", "nlon"],
            &[2, 2, 2],
            vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 0.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_constant_field_averages_to_constant() {
        let v = Variable::from_vec(&["time", "nlat", "nlon"], &[3, 2, 2], vec![1.0; 12]).unwrap();
        let avg = weighted_reduce(&v, &region_weight(), &dims(&["nlat", "nlon"]), ReduceOp::Average).unwrap();
        assert_eq!(avg.dims, vec!["time", "region"]);
        assert!(avg.values().unwrap().iter().all(|&x| (x - 1.0).abs() < 1e-15));
    }

    #[test]
    fn test_integral_and_missing_values() {
        let v = Variable::from_vec(&["time", "nlat", "nlon"], &[1, 2, 2], vec![1.0, f64::NAN, 1.0, 1.0]).unwrap();
        let w = region_weight();
        let integral = weighted_reduce(&v, &w, &dims(&["nlat", "nlon"]), ReduceOp::Integrate).unwrap();
        assert_eq!(integral.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![8.0, 1.0]);
        let avg = weighted_reduce(&v, &w, &dims(&["nlat", "nlon"]), ReduceOp::Average).unwrap();
        assert_eq!(avg.values().unwrap()[[0, 1]], 1.0);

        let sum = weight_sum(&v.isel("time", 0).unwrap(), &w, &dims(&["nlat", "nlon"])).unwrap();
        assert_eq!(sum.dims, vec!["region"]);
        assert_eq!(sum.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![8.0, 1.0]);
    }

    #[test]
    fn test_empty_region_average_is_nan() {
        let v = Variable::from_vec(&["time", "nlat", "nlon"], &[1, 2, 2], vec![1.0; 4]).unwrap();
        let w = Variable::from_vec(&["region", "nlat", "nlon"], &[1, 2, 2], vec![0.0; 4]).unwrap();
        let avg = weighted_reduce(&v, &w, &dims(&["nlat", "nlon"]), ReduceOp::Average).unwrap();
        assert!(avg.values().unwrap()[[0, 0]].is_nan());
    }

    #[test]
    fn test_lateral_reduction_keeps_depth() {
        // volume weight has z_t; reducing laterally keeps z_t before region
        let v = Variable::from_vec(&["time", "z_t", "nlat"], &[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let w = Variable::from_vec(&["region", "z_t", "nlat"], &[1, 2, 2], vec![1.0, 1.0, 10.0, 10.0]).unwrap();
        let out = weighted_reduce(&v, &w, &dims(&["nlat"]), ReduceOp::Integrate).unwrap();
        assert_eq!(out.dims, vec!["time", "z_t", "region"]);
        assert_eq!(out.values().unwrap().iter().copied().collect::<Vec<_>>(), vec![3.0, 70.0]);
    }

    #[test]
    fn test_reduce_dim_must_exist() {
        let v = Variable::from_values("nlat", vec![1.0, 2.0]);
        let w = Variable::from_values("nlat", vec![1.0, 1.0]);
        assert!(weighted_reduce(&v, &w, &dims(&["nlon"]), ReduceOp::Average).is_err());
    }
}
