//! Small synthetic component grids and time axes.
//!
//! Grids are laid out so that every region catalog has cells in it: land
//! points are sprinkled on a fixed pattern, latitudes avoid the equator and
//! longitudes start at 0.

use nc_dataset::{Dataset, Variable};

/// Noleap month lengths.
pub const MONTH_DAYS: [f64; 12] = [31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0];

pub const TIME_UNITS: &str = "days since 0001-01-01 00:00:00";

fn centers(n: usize, lo: f64, hi: f64) -> Vec<f64> {
    let step = (hi - lo) / n as f64;
    (0..n).map(|i| lo + (i as f64 + 0.5) * step).collect()
}

fn lons(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * 360.0 / n as f64).collect()
}

fn grid2(dims: [&str; 2], shape: [usize; 2], f: impl Fn(usize, usize) -> f64) -> Variable {
    let mut values = Vec::with_capacity(shape[0] * shape[1]);
    for y in 0..shape[0] {
        for x in 0..shape[1] {
            values.push(f(y, x));
        }
    }
    Variable::from_vec(&dims, &shape, values).expect("grid shape")
}

fn is_land(y: usize, x: usize) -> bool {
    (y + 2 * x) % 5 == 0
}

/// Gaussian-like atmosphere grid: `lat`, `lon` and `gw`.
pub fn atm_grid(nlat: usize, nlon: usize) -> Dataset {
    let lat = centers(nlat, -90.0, 90.0);
    let gw: Vec<f64> = lat.iter().map(|l| l.to_radians().cos()).collect();
    Dataset::new()
        .with_var("lat", Variable::from_values("lat", lat).with_attr("units", "degrees_north"))
        .and_then(|ds| ds.with_var("lon", Variable::from_values("lon", lons(nlon)).with_attr("units", "degrees_east")))
        .and_then(|ds| ds.with_var("gw", Variable::from_values("lat", gw).with_attr("long_name", "gauss weights")))
        .expect("atm grid")
}

/// POP-like ocean grid on `(nlat, nlon)` with `nz` levels.
///
/// `REGION_MASK` assigns basins by longitude (6 Atlantic, 3 Indian,
/// 2 Pacific) and 10 north of 70N; land cells have `KMT = 0`.
pub fn ocn_grid(nz: usize, nlat: usize, nlon: usize) -> Dataset {
    let lat = centers(nlat, -80.0, 80.0);
    let lon = lons(nlon);
    let dims = ["nlat", "nlon"];
    let shape = [nlat, nlon];
    let basin = |y: usize, x: usize| {
        if is_land(y, x) {
            0.0
        } else if lat[y] > 70.0 {
            10.0
        } else if lon[x] < 20.0 || lon[x] >= 291.0 {
            6.0
        } else if lon[x] < 147.0 {
            3.0
        } else {
            2.0
        }
    };
    let z_t = centers(nz, 0.0, 1000.0 * nz as f64);
    Dataset::new()
        .with_var("z_t", Variable::from_values("z_t", z_t).with_attr("units", "centimeters"))
        .and_then(|ds| ds.with_var("dz", Variable::from_values("z_t", vec![1000.0; nz]).with_attr("units", "cm")))
        .and_then(|ds| ds.with_var("TLAT", grid2(dims, shape, |y, _| lat[y] + 0.1 * y as f64).with_attr("units", "degrees_north")))
        .and_then(|ds| ds.with_var("TLONG", grid2(dims, shape, |_, x| lon[x]).with_attr("units", "degrees_east")))
        .and_then(|ds| ds.with_var("ULAT", grid2(dims, shape, |y, _| lat[y] + 1.0)))
        .and_then(|ds| ds.with_var("ULONG", grid2(dims, shape, |_, x| lon[x] + 1.0)))
        .and_then(|ds| {
            ds.with_var(
                "TAREA",
                grid2(dims, shape, |y, _| 1.0e14 * lat[y].to_radians().cos()).with_attr("units", "centimeter^2"),
            )
        })
        .and_then(|ds| ds.with_var("KMT", grid2(dims, shape, |y, x| if is_land(y, x) { 0.0 } else { nz as f64 })))
        .and_then(|ds| ds.with_var("REGION_MASK", grid2(dims, shape, basin)))
        .expect("ocn grid")
}

/// CLM-like land grid with some ocean cells (`landfrac = 0`).
pub fn lnd_grid(nlat: usize, nlon: usize) -> Dataset {
    let lat = centers(nlat, -90.0, 90.0);
    let dims = ["lat", "lon"];
    let shape = [nlat, nlon];
    let area: Vec<f64> = lat.iter().map(|l| 1.0e4 * l.to_radians().cos()).collect();
    Dataset::new()
        .with_var("lat", Variable::from_values("lat", lat).with_attr("units", "degrees_north"))
        .and_then(|ds| ds.with_var("lon", Variable::from_values("lon", lons(nlon)).with_attr("units", "degrees_east")))
        .and_then(|ds| ds.with_var("landfrac", grid2(dims, shape, |y, x| if is_land(y, x) { 0.0 } else { 0.5 })))
        .and_then(|ds| ds.with_var("area", grid2(dims, shape, |y, _| area[y]).with_attr("units", "km^2")))
        .expect("lnd grid")
}

/// CICE-like sea-ice grid with some inactive cells (`tmask = 0`).
pub fn ice_grid(nj: usize, ni: usize) -> Dataset {
    let lat = centers(nj, -80.0, 80.0);
    let lon = lons(ni);
    let dims = ["nj", "ni"];
    let shape = [nj, ni];
    Dataset::new()
        .with_var("TLAT", grid2(dims, shape, |y, _| lat[y]).with_attr("units", "degrees_north"))
        .and_then(|ds| ds.with_var("TLON", grid2(dims, shape, |_, x| lon[x]).with_attr("units", "degrees_east")))
        .and_then(|ds| ds.with_var("tmask", grid2(dims, shape, |y, x| if is_land(y, x) { 0.0 } else { 1.0 })))
        .and_then(|ds| ds.with_var("tarea", grid2(dims, shape, |y, _| 1.0e10 * lat[y].to_radians().cos()).with_attr("units", "m^2")))
        .expect("ice grid")
}

/// Monthly noleap time axis starting at `start_year` (0-based offset from
/// year 1): `time` at month midpoints and `time_bound`.
pub fn monthly_time(start_year: usize, nyears: usize) -> Dataset {
    let mut lower = start_year as f64 * 365.0;
    let mut bounds = Vec::with_capacity(nyears * 24);
    let mut mids = Vec::with_capacity(nyears * 12);
    for _ in 0..nyears {
        for days in MONTH_DAYS {
            bounds.push(lower);
            bounds.push(lower + days);
            mids.push(lower + days / 2.0);
            lower += days;
        }
    }
    let ntime = mids.len();
    let mut ds = Dataset::new()
        .with_var(
            "time",
            Variable::from_values("time", mids)
                .with_attr("units", TIME_UNITS)
                .with_attr("calendar", "noleap")
                .with_attr("bounds", "time_bound")
                .with_attr("long_name", "time"),
        )
        .and_then(|ds| ds.with_var("time_bound", Variable::from_vec(&["time", "d2"], &[ntime, 2], bounds)?))
        .expect("time axis");
    ds.encoding.unlimited_dims = vec!["time".to_string()];
    ds
}

/// Single variable `X(time)` with `f(year_index, month_index)` values.
pub fn monthly_series(nyears: usize, f: impl Fn(usize, usize) -> f64) -> Dataset {
    let mut values = Vec::with_capacity(nyears * 12);
    for y in 0..nyears {
        for m in 0..12 {
            values.push(f(y, m));
        }
    }
    let mut ds = monthly_time(0, nyears);
    ds.insert("X", Variable::from_values("time", values).with_attr("units", "1").with_attr("long_name", "test series"))
        .expect("series");
    ds.set_attr("title", "synthetic series");
    ds.set_attr("history", "created by fixtures");
    ds
}
