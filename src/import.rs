//! Reading a climate variable from a CF netCDF file into a [`ClimGrid`].
use std::path::Path;

use error_stack::{Report, ResultExt};
use ndarray::{Array1, Array2, Array3, ArrayD, Ix1, Ix2, Ix3};
use netcdf::AttributeValue;

use crate::{
    error::ClimGridError,
    grid::{AttrMap, ClimGrid, ClimGridParts, DimensionNames, Provenance, SpatialCoords},
    nc_utils::{self, attr_as_f64, attr_as_string},
    timeaxis,
    units::{self, CELSIUS, KELVIN_OFFSET, SECONDS_PER_DAY},
};

const TIME_DIM_NAMES: &[&str] = &["time", "t"];
const LON_DIM_NAMES: &[&str] = &["lon", "rlon", "x", "longitude"];
const LAT_DIM_NAMES: &[&str] = &["lat", "rlat", "y", "latitude"];
const LON_VAR_NAMES: &[&str] = &["lon", "longitude"];
const LAT_VAR_NAMES: &[&str] = &["lat", "latitude"];

/// Grid mapping assumed when the data variable does not reference one.
const DEFAULT_GRID_MAPPING: &str = "latitude_longitude";

/// Variable attributes consumed while unpacking the stored values.
const PACKING_ATTRS: &[&str] = &["_FillValue", "missing_value", "scale_factor", "add_offset"];

/// A polygon given as (longitude, latitude) vertices, e.g. read from a shapefile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub vertices: Vec<(f64, f64)>,
}

/// Positions of the time, x and y dimensions of the data variable, with their names.
struct DataDims {
    names: DimensionNames,
    time: usize,
    x: usize,
    y: usize,
}

/// Read `variable` from the netCDF file at `path`.
///
/// The data are converted to `f64` with fill values as NaN, precipitation
/// rates in per-second units (`pr`) are converted to mm/day, any variable
/// stored in kelvin ("K") is converted to Celsius, and the cube is reordered
/// to (time, x, y). Spatial subsetting with `polygon` is not supported: a
/// warning is logged and the full domain is returned.
///
/// # Errors
/// * [`ClimGridError::Io`] if the file cannot be opened.
/// * [`ClimGridError::MissingAttribute`] if `experiment_id`, `parent_experiment_rip`,
///   `model_id`, or a required `units`/`calendar` attribute is absent.
/// * [`ClimGridError::MissingVariable`] / [`ClimGridError::MissingDimension`] if the
///   data variable, its coordinates, or its dimensions cannot be found.
/// * [`ClimGridError::UnsupportedCalendar`] / [`ClimGridError::Format`] from the time axis.
/// * [`ClimGridError::ShapeMismatch`] if the time axis is not daily and contiguous.
pub fn import<P: AsRef<Path>>(
    path: P,
    variable: &str,
    polygon: Option<&Polygon>,
) -> error_stack::Result<ClimGrid, ClimGridError> {
    let path = path.as_ref();
    log::info!("Reading '{variable}' from {}", path.display());
    let file = netcdf::open(path)
        .change_context_lazy(|| ClimGridError::io(path))
        .attach_printable("could not open the file for reading")?;

    if let Some(poly) = polygon {
        log::warn!(
            "Spatial subsetting is not supported, ignoring the {}-vertex polygon and reading the full domain",
            poly.vertices.len()
        );
    }

    let provenance = read_provenance(&file, path)?;
    let globalattribs = nc_utils::global_attributes(&file)?;

    let var = file
        .variable(variable)
        .ok_or_else(|| ClimGridError::MissingVariable(variable.to_string()))?;
    let mut varattribs = nc_utils::var_attributes(&var)?;
    let mut dataunits = nc_utils::get_string_attr(&var, "units")?;
    let dims = classify_dims(&var)?;
    log::debug!(
        "'{variable}' dimensions: time = {}, lon = {}, lat = {}",
        dims.names.time,
        dims.names.lon,
        dims.names.lat
    );

    let raw = nc_utils::read_f64(&var)?;
    let raw = unpack(raw, &mut varattribs);
    let mut data = to_canonical_order(raw, &dims)
        .attach_printable_lazy(|| format!("reordering the axes of '{variable}'"))?;
    apply_unit_policy(variable, &mut data, &mut dataunits, &mut varattribs);

    let (coords, lonunits, latunits) = read_coords(&file, &dims)?;
    let grid_mapping = read_grid_mapping(&file, &var, &coords)?;

    let time_var = file
        .variable(&dims.names.time)
        .ok_or_else(|| ClimGridError::MissingVariable(dims.names.time.clone()))?;
    let time_units = nc_utils::get_string_attr(&time_var, "units")?;
    let typeofcal = nc_utils::get_string_attr(&time_var, "calendar")?;
    let offsets = nc_utils::read_f64(&time_var)?;
    let offsets: Vec<f64> = offsets.iter().copied().collect();
    let timevec = timeaxis::build_timevec(&time_units, &typeofcal, &offsets)
        .attach_printable_lazy(|| format!("decoding time units '{time_units}' with calendar '{typeofcal}'"))?;
    if timevec.len() != offsets.len() {
        return Err(Report::new(ClimGridError::shape_mismatch(
            "daily time axis",
            &[offsets.len()],
            &[timevec.len()],
        ))
        .attach_printable("the time axis must be daily without gaps"));
    }
    let timeattrib = nc_utils::var_attributes(&time_var)?;

    let mask = ClimGrid::compute_mask(&data);
    let parts = ClimGridParts {
        data,
        coords,
        timevec,
        timeattrib,
        mask,
        grid_mapping,
        dimension_dict: dims.names,
        provenance,
        typeofcal,
        dataunits,
        latunits,
        lonunits,
        variable: variable.to_string(),
        typeofvar: variable.to_string(),
        varattribs,
        globalattribs,
    };

    let grid = ClimGrid::new(parts).attach_printable_lazy(|| format!("assembling '{variable}' from {}", path.display()))?;
    log::debug!("Read {:?} (time, x, y) values of '{variable}'", grid.data().dim());
    Ok(grid)
}

fn read_provenance(file: &netcdf::File, path: &Path) -> error_stack::Result<Provenance, ClimGridError> {
    let experiment = nc_utils::get_global_attr(file, "experiment_id")?;
    let run = nc_utils::get_global_attr(file, "parent_experiment_rip")?;
    let model = nc_utils::get_global_attr(file, "model_id")?;
    let project = nc_utils::get_opt_global_attr(file, "project_id")?.unwrap_or_default();
    let institute = match nc_utils::get_opt_global_attr(file, "institute_id")? {
        Some(inst) => inst,
        None => nc_utils::get_opt_global_attr(file, "institution")?.unwrap_or_default(),
    };
    let frequency = nc_utils::get_opt_global_attr(file, "frequency")?.unwrap_or_default();

    Ok(Provenance {
        model,
        experiment,
        run,
        project,
        institute,
        filename: path.display().to_string(),
        frequency,
    })
}

/// Work out which dimension of the data variable is time, longitude and latitude.
fn classify_dims(var: &netcdf::Variable) -> Result<DataDims, ClimGridError> {
    let dims = var.dimensions();
    if dims.len() != 3 {
        return Err(ClimGridError::shape_mismatch(
            format!("number of dimensions of '{}'", var.name()),
            &[3],
            &[dims.len()],
        ));
    }

    let missing = |role| ClimGridError::MissingDimension {
        variable: var.name(),
        role,
    };
    let time = nc_utils::find_dim(var, TIME_DIM_NAMES)
        .or_else(|| dims.iter().position(|d| d.is_unlimited()))
        .ok_or_else(|| missing("time"))?;
    let x = nc_utils::find_dim(var, LON_DIM_NAMES).ok_or_else(|| missing("longitude"))?;
    let y = nc_utils::find_dim(var, LAT_DIM_NAMES).ok_or_else(|| missing("latitude"))?;

    if time == x || time == y {
        return Err(missing("time"));
    }

    Ok(DataDims {
        names: DimensionNames {
            lon: dims[x].name(),
            lat: dims[y].name(),
            time: dims[time].name(),
        },
        time,
        x,
        y,
    })
}

/// Replace fill values with NaN and apply `scale_factor`/`add_offset`.
///
/// The packing attributes are removed from `varattribs` since the returned
/// values no longer need them.
fn unpack(mut data: ArrayD<f64>, varattribs: &mut AttrMap) -> ArrayD<f64> {
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|k| varattribs.get(*k))
        .filter_map(attr_as_f64)
        .collect();
    let scale = varattribs.get("scale_factor").and_then(attr_as_f64).unwrap_or(1.0);
    let offset = varattribs.get("add_offset").and_then(attr_as_f64).unwrap_or(0.0);

    data.mapv_inplace(|v| {
        if fills.contains(&v) {
            f64::NAN
        } else {
            v * scale + offset
        }
    });

    for attr in PACKING_ATTRS {
        varattribs.shift_remove(*attr);
    }
    data
}

fn to_canonical_order(data: ArrayD<f64>, dims: &DataDims) -> Result<Array3<f64>, ClimGridError> {
    let shape = data.shape().to_vec();
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| ClimGridError::shape_mismatch("data cube", &[0, 0, 0], &shape))?;
    Ok(data
        .permuted_axes([dims.time, dims.x, dims.y])
        .as_standard_layout()
        .into_owned())
}

/// Scale per-second precipitation to daily totals and convert kelvin to Celsius.
fn apply_unit_policy(variable: &str, data: &mut Array3<f64>, dataunits: &mut String, varattribs: &mut AttrMap) {
    if variable == "pr" && units::is_per_second(dataunits) {
        log::debug!("Converting '{variable}' from {dataunits} to mm/day");
        data.mapv_inplace(|v| v * SECONDS_PER_DAY);
        *dataunits = "mm/day".to_string();
    }

    if dataunits == "K" {
        log::debug!("Converting '{variable}' from K to {CELSIUS}");
        data.mapv_inplace(|v| v - KELVIN_OFFSET);
        *dataunits = CELSIUS.to_string();
    }

    varattribs.insert("units".to_string(), AttributeValue::Str(dataunits.clone()));
}

/// Read the longitude/latitude coordinates and their units.
fn read_coords(
    file: &netcdf::File,
    dims: &DataDims,
) -> error_stack::Result<(SpatialCoords, String, String), ClimGridError> {
    let lon_var = find_var(file, LON_VAR_NAMES)?;
    let lat_var = find_var(file, LAT_VAR_NAMES)?;
    let lonunits = nc_utils::get_string_attr(&lon_var, "units")?;
    let latunits = nc_utils::get_string_attr(&lat_var, "units")?;

    let lon = nc_utils::read_f64(&lon_var)?;
    let lat = nc_utils::read_f64(&lat_var)?;

    let coords = match (lon.ndim(), lat.ndim()) {
        (1, 1) => SpatialCoords::Regular {
            lon: into_1d(lon, &lon_var.name())?,
            lat: into_1d(lat, &lat_var.name())?,
        },
        (2, 2) => {
            let lon = into_xy(lon, &lon_var, &dims.names)?;
            let lat = into_xy(lat, &lat_var, &dims.names)?;
            let x = read_native_axis(file, &dims.names.lon, lon.nrows())?;
            let y = read_native_axis(file, &dims.names.lat, lon.ncols())?;
            SpatialCoords::Curvilinear { lon, lat, x, y }
        }
        (nlon, nlat) => {
            return Err(Report::new(ClimGridError::shape_mismatch(
                "coordinate dimensions",
                &[nlon, nlon],
                &[nlon, nlat],
            ))
            .attach_printable("longitude and latitude must both be 1-D or both be 2-D"))
        }
    };

    Ok((coords, lonunits, latunits))
}

fn find_var<'f>(file: &'f netcdf::File, names: &[&str]) -> Result<netcdf::Variable<'f>, ClimGridError> {
    names
        .iter()
        .find_map(|n| file.variable(n))
        .ok_or_else(|| ClimGridError::MissingVariable(names.join(" or ")))
}

fn into_1d(arr: ArrayD<f64>, name: &str) -> Result<Array1<f64>, ClimGridError> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix1>()
        .map_err(|_| ClimGridError::shape_mismatch(format!("coordinate '{name}'"), &[0], &shape))
}

/// Convert a 2-D coordinate field to (x, y) order, whichever order it is stored in.
fn into_xy(arr: ArrayD<f64>, var: &netcdf::Variable, names: &DimensionNames) -> Result<Array2<f64>, ClimGridError> {
    let shape = arr.shape().to_vec();
    let arr = arr
        .into_dimensionality::<Ix2>()
        .map_err(|_| ClimGridError::shape_mismatch(format!("coordinate '{}'", var.name()), &[0, 0], &shape))?;

    let lon_dim = [names.lon.as_str()];
    match nc_utils::find_dim(var, &lon_dim) {
        Some(0) => Ok(arr),
        Some(_) => Ok(arr.reversed_axes().as_standard_layout().into_owned()),
        None => Err(ClimGridError::MissingDimension {
            variable: var.name(),
            role: "longitude",
        }),
    }
}

/// Values of a rotated/projected axis, or an index ramp when the file has none.
fn read_native_axis(file: &netcdf::File, dim_name: &str, len: usize) -> error_stack::Result<Array1<f64>, ClimGridError> {
    match file.variable(dim_name) {
        Some(var) if var.dimensions().len() == 1 => {
            let values = nc_utils::read_f64(&var)?;
            Ok(into_1d(values, dim_name)?)
        }
        _ => {
            log::warn!("No coordinate variable for dimension '{dim_name}', using cell indices");
            Ok(Array1::range(0.0, len as f64, 1.0))
        }
    }
}

/// Collect the grid mapping referenced by the data variable's `grid_mapping` attribute.
fn read_grid_mapping(
    file: &netcdf::File,
    var: &netcdf::Variable,
    coords: &SpatialCoords,
) -> error_stack::Result<AttrMap, ClimGridError> {
    let Some(value) = var.attribute_value("grid_mapping") else {
        if !coords.is_regular() {
            return Err(ClimGridError::InvalidGridMapping(format!(
                "'{}' has 2-D coordinates but no 'grid_mapping' attribute",
                var.name()
            ))
            .into());
        }
        let mut mapping = AttrMap::new();
        mapping.insert("grid_mapping_name".to_string(), DEFAULT_GRID_MAPPING.into());
        return Ok(mapping);
    };

    let value = value.change_context_lazy(|| ClimGridError::netcdf("reading the 'grid_mapping' attribute"))?;
    let name = attr_as_string(&value)
        .ok_or_else(|| ClimGridError::InvalidGridMapping("'grid_mapping' is not a string".to_string()))?;
    let mapping_var = file
        .variable(&name)
        .ok_or_else(|| ClimGridError::MissingVariable(name.clone()))?;
    nc_utils::var_attributes(&mapping_var)
}
