//! Fixtures shared by the unit tests: small in-memory grids and synthetic
//! CF-style netCDF files.
use std::path::Path;

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3};
use netcdf::{AttributeValue, Extents};

use crate::grid::{AttrMap, ClimGrid, ClimGridParts, DimensionNames, Provenance, SpatialCoords};

pub(crate) const NT: usize = 3;
pub(crate) const NX: usize = 4;
pub(crate) const NY: usize = 2;

fn attr_map(pairs: &[(&str, AttributeValue)]) -> AttrMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn test_provenance() -> Provenance {
    Provenance {
        model: "CanESM2".to_string(),
        experiment: "rcp85".to_string(),
        run: "r1i1p1".to_string(),
        project: "CMIP5".to_string(),
        institute: "CCCma".to_string(),
        filename: "tas_day_CanESM2_rcp85_r1i1p1.nc".to_string(),
        frequency: "day".to_string(),
    }
}

fn test_timevec(nt: usize) -> Vec<NaiveDate> {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .iter_days()
        .take(nt)
        .collect()
}

/// Parts for a regular lon/lat grid holding `data` in (time, x, y) order.
pub(crate) fn regular_parts_with(tag: &str, units: &str, data: Array3<f64>) -> ClimGridParts {
    let (nt, nx, ny) = data.dim();
    let mask = ClimGrid::compute_mask(&data);
    ClimGridParts {
        data,
        coords: SpatialCoords::Regular {
            lon: Array1::range(-70.0, -70.0 + nx as f64, 1.0),
            lat: Array1::range(45.0, 45.0 + ny as f64, 1.0),
        },
        timevec: test_timevec(nt),
        timeattrib: attr_map(&[
            ("units", "days since 2000-01-01".into()),
            ("calendar", "noleap".into()),
        ]),
        mask,
        grid_mapping: attr_map(&[("grid_mapping_name", "latitude_longitude".into())]),
        dimension_dict: DimensionNames::default(),
        provenance: test_provenance(),
        typeofcal: "noleap".to_string(),
        dataunits: units.to_string(),
        latunits: "degrees_north".to_string(),
        lonunits: "degrees_east".to_string(),
        variable: tag.to_string(),
        typeofvar: tag.to_string(),
        varattribs: attr_map(&[
            ("units", units.into()),
            ("standard_name", format!("{tag}_standard_name").into()),
            ("history", "original data".into()),
        ]),
        globalattribs: attr_map(&[
            ("experiment_id", "rcp85".into()),
            ("parent_experiment_rip", "r1i1p1".into()),
            ("model_id", "CanESM2".into()),
        ]),
    }
}

/// Parts for a small regular grid with distinct, finite values.
pub(crate) fn regular_parts(tag: &str, units: &str) -> ClimGridParts {
    let data = Array3::from_shape_fn((NT, NX, NY), |(t, x, y)| (t * 100 + x * 10 + y) as f64);
    regular_parts_with(tag, units, data)
}

/// Parts for a small rotated-pole grid.
pub(crate) fn rotated_parts(tag: &str, units: &str) -> ClimGridParts {
    let mut parts = regular_parts(tag, units);
    parts.coords = SpatialCoords::Curvilinear {
        lon: Array2::from_shape_fn((NX, NY), |(x, y)| -80.0 + x as f64 * 0.5 + y as f64 * 0.1),
        lat: Array2::from_shape_fn((NX, NY), |(x, y)| 40.0 + y as f64 * 0.5 + x as f64 * 0.1),
        x: Array1::from_shape_fn(NX, |i| -10.0 + i as f64 * 0.44),
        y: Array1::from_shape_fn(NY, |j| -5.0 + j as f64 * 0.44),
    };
    parts.grid_mapping = attr_map(&[
        ("grid_mapping_name", "rotated_latitude_longitude".into()),
        ("grid_north_pole_latitude", AttributeValue::Double(42.5)),
        ("grid_north_pole_longitude", AttributeValue::Double(83.0)),
    ]);
    parts
        .varattribs
        .insert("grid_mapping".to_string(), "rotated_pole".into());
    parts.dimension_dict = DimensionNames {
        lon: "rlon".to_string(),
        lat: "rlat".to_string(),
        time: "time".to_string(),
    };
    parts
}

/// Build a regular grid with the given tag, units and (time, x, y) data.
pub(crate) fn grid_with_data(tag: &str, units: &str, data: Array3<f64>) -> ClimGrid {
    ClimGrid::new(regular_parts_with(tag, units, data)).unwrap()
}

/// Options for a synthetic input file written by [`write_test_file`].
pub(crate) struct TestFile<'a> {
    pub variable: &'a str,
    pub units: &'a str,
    pub calendar: &'a str,
    pub time_units: &'a str,
    pub rotated: bool,
    /// Data in the (time, lat, lon) order used by CMIP files
    pub data: Array3<f32>,
    pub time_offsets: Vec<f64>,
    pub fill_value: Option<f32>,
    /// Store the data as `i16` with this (scale_factor, add_offset)
    pub packing: Option<(f64, f64)>,
    /// A required global attribute to leave out
    pub skip_global: Option<&'a str>,
}

impl<'a> TestFile<'a> {
    pub(crate) fn new(variable: &'a str, units: &'a str) -> Self {
        let data = Array3::from_shape_fn((NT, NY, NX), |(t, y, x)| 280.0 + (t * 100 + x * 10 + y) as f32);
        Self {
            variable,
            units,
            calendar: "noleap",
            time_units: "days since 2000-01-01 00:00:00",
            rotated: false,
            data,
            time_offsets: (0..NT).map(|t| t as f64 + 0.5).collect(),
            fill_value: None,
            packing: None,
            skip_global: None,
        }
    }
}

/// Write a small CF-style file like the ones produced by CMIP/CORDEX models.
pub(crate) fn write_test_file(path: &Path, desc: &TestFile) {
    let mut nc = netcdf::create(path).unwrap();
    for (name, value) in [
        ("experiment_id", "rcp85"),
        ("parent_experiment_rip", "r1i1p1"),
        ("model_id", "CanESM2"),
        ("project_id", "CMIP5"),
        ("institute_id", "CCCma"),
        ("frequency", "day"),
    ] {
        if desc.skip_global != Some(name) {
            nc.add_attribute(name, value).unwrap();
        }
    }

    let (nt, ny, nx) = desc.data.dim();
    let (xdim, ydim) = if desc.rotated { ("rlon", "rlat") } else { ("lon", "lat") };
    nc.add_dimension("time", nt).unwrap();
    nc.add_dimension(ydim, ny).unwrap();
    nc.add_dimension(xdim, nx).unwrap();

    let mut time = nc.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", desc.time_units).unwrap();
    time.put_attribute("calendar", desc.calendar).unwrap();
    time.put(Array1::from(desc.time_offsets.clone()).view(), Extents::All)
        .unwrap();

    let xs = Array1::range(-70.0, -70.0 + nx as f64, 1.0);
    let ys = Array1::range(45.0, 45.0 + ny as f64, 1.0);
    if desc.rotated {
        let mut rlon = nc.add_variable::<f64>("rlon", &["rlon"]).unwrap();
        rlon.put_attribute("units", "degrees").unwrap();
        rlon.put(xs.view(), Extents::All).unwrap();
        let mut rlat = nc.add_variable::<f64>("rlat", &["rlat"]).unwrap();
        rlat.put_attribute("units", "degrees").unwrap();
        rlat.put(ys.view(), Extents::All).unwrap();

        // Geographic coordinates stored (rlat, rlon) like CORDEX output
        let lon2d = Array2::from_shape_fn((ny, nx), |(y, x)| -80.0 + x as f64 * 0.5 + y as f64 * 0.1);
        let lat2d = Array2::from_shape_fn((ny, nx), |(y, x)| 40.0 + y as f64 * 0.5 + x as f64 * 0.1);
        let mut lon = nc.add_variable::<f64>("lon", &["rlat", "rlon"]).unwrap();
        lon.put_attribute("units", "degrees_east").unwrap();
        lon.put(lon2d.view(), Extents::All).unwrap();
        let mut lat = nc.add_variable::<f64>("lat", &["rlat", "rlon"]).unwrap();
        lat.put_attribute("units", "degrees_north").unwrap();
        lat.put(lat2d.view(), Extents::All).unwrap();

        let mut pole = nc.add_variable::<i32>("rotated_pole", &[]).unwrap();
        pole.put_attribute("grid_mapping_name", "rotated_latitude_longitude")
            .unwrap();
        pole.put_attribute("grid_north_pole_latitude", 42.5f64).unwrap();
        pole.put_attribute("grid_north_pole_longitude", 83.0f64).unwrap();
    } else {
        let mut lon = nc.add_variable::<f64>("lon", &["lon"]).unwrap();
        lon.put_attribute("units", "degrees_east").unwrap();
        lon.put(xs.view(), Extents::All).unwrap();
        let mut lat = nc.add_variable::<f64>("lat", &["lat"]).unwrap();
        lat.put_attribute("units", "degrees_north").unwrap();
        lat.put(ys.view(), Extents::All).unwrap();
    }

    let dims = ["time", ydim, xdim];
    let mut var = match desc.packing {
        Some(_) => nc.add_variable::<i16>(desc.variable, &dims).unwrap(),
        None => nc.add_variable::<f32>(desc.variable, &dims).unwrap(),
    };
    var.put_attribute("units", desc.units).unwrap();
    var.put_attribute("standard_name", "air_temperature").unwrap();
    if desc.rotated {
        var.put_attribute("grid_mapping", "rotated_pole").unwrap();
        var.put_attribute("coordinates", "lon lat").unwrap();
    }

    match desc.packing {
        Some((scale, offset)) => {
            var.put_attribute("scale_factor", scale).unwrap();
            var.put_attribute("add_offset", offset).unwrap();
            let packed = desc.data.mapv(|v| ((v as f64 - offset) / scale).round() as i16);
            var.put(packed.view(), Extents::All).unwrap();
        }
        None => {
            if let Some(fill) = desc.fill_value {
                var.put_attribute("_FillValue", fill).unwrap();
            }
            var.put(desc.data.view(), Extents::All).unwrap();
        }
    }
}
