//! Weight, region mask and reduction working together on each component grid.

use cesm_common::{Component, ReduceOp};
use grid_processor::{get_region_mask, get_weight, weight_sum, weighted_reduce, REGION_DIM};
use nc_dataset::ops::broadcast_mul;
use nc_dataset::{Dataset, Variable};
use test_utils::{assert_approx_eq, fixtures};

fn grids() -> Vec<(Component, Dataset, [&'static str; 2])> {
    vec![
        (Component::Atm, fixtures::atm_grid(6, 12), ["lat", "lon"]),
        (Component::Ocn, fixtures::ocn_grid(1, 6, 8), ["nlat", "nlon"]),
        (Component::Lnd, fixtures::lnd_grid(6, 12), ["lat", "lon"]),
        (Component::Ice, fixtures::ice_grid(6, 8), ["nj", "ni"]),
    ]
}

fn constant_field(ds: &Dataset, dims: [&str; 2], ntime: usize, value: f64) -> Variable {
    let (ny, nx) = (ds.dim_size(dims[0]).unwrap(), ds.dim_size(dims[1]).unwrap());
    Variable::from_vec(&["time", dims[0], dims[1]], &[ntime, ny, nx], vec![value; ntime * ny * nx]).unwrap()
}

#[test]
fn test_constant_field_averages_to_itself() {
    for (component, ds, dims) in grids() {
        let reduce_dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
        let weight = get_weight(&ds, component, &reduce_dims).unwrap();
        let mask = get_region_mask(&ds, component).unwrap();
        let combined = broadcast_mul(&mask.mask, &weight).unwrap();

        let field = constant_field(&ds, dims, 3, 1.0);
        let avg = weighted_reduce(&field, &combined, &reduce_dims, ReduceOp::Average).unwrap();
        assert_eq!(avg.dims, vec!["time", REGION_DIM], "{}", component);

        let wsum = weight_sum(&field.isel("time", 0).unwrap(), &combined, &reduce_dims).unwrap();
        let integral = weighted_reduce(&field, &combined, &reduce_dims, ReduceOp::Integrate).unwrap();
        let (avg, wsum, integral) = (avg.values().unwrap(), wsum.values().unwrap(), integral.values().unwrap());
        for r in 0..mask.names.len() {
            if wsum[[r]] > 0.0 {
                assert_approx_eq!(avg[[0, r]], 1.0, 1e-12);
                assert_approx_eq!(integral[[2, r]] / wsum[[r]], 1.0, 1e-12);
            } else {
                assert!(avg[[0, r]].is_nan(), "{} region {} should be empty", component, mask.names[r]);
            }
        }
    }
}

#[test]
fn test_missing_cells_leave_the_average() {
    let ds = fixtures::ocn_grid(1, 6, 8);
    let reduce_dims = vec!["nlat".to_string(), "nlon".to_string()];
    let weight = get_weight(&ds, Component::Ocn, &reduce_dims).unwrap();
    let mask = get_region_mask(&ds, Component::Ocn).unwrap();
    let combined = broadcast_mul(&mask.mask, &weight).unwrap();

    // 2 on the first row, NaN on the second, 1 elsewhere
    let mut field = constant_field(&ds, ["nlat", "nlon"], 1, 1.0);
    {
        let values = field.values_mut().unwrap();
        for x in 0..8 {
            values[[0, 0, x]] = 2.0;
            values[[0, 1, x]] = f64::NAN;
        }
    }
    let avg = weighted_reduce(&field, &combined, &reduce_dims, ReduceOp::Average).unwrap();
    let global = avg.values().unwrap()[[0, 0]];
    assert!(global > 1.0 && global < 2.0);

    let full = weight_sum(&constant_field(&ds, ["nlat", "nlon"], 1, 1.0).isel("time", 0).unwrap(), &combined, &reduce_dims).unwrap();
    let partial = weight_sum(&field.isel("time", 0).unwrap(), &combined, &reduce_dims).unwrap();
    assert!(partial.values().unwrap()[[0]] < full.values().unwrap()[[0]]);
}
