//! Writing a [`ClimGrid`] to a CF netCDF file.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use itertools::Itertools;
use ndarray::{Array2, Array3, ArrayView1, Axis};
use netcdf::{AttributeValue, Extents, FileMut};

use crate::{
    error::ClimGridError,
    grid::{ClimGrid, GridAxis, GridKind, GridMapping, SpatialCoords},
    nc_utils::attr_as_string,
    timeaxis,
};

/// Value written in place of NaN in the data variable
pub const FILL_VALUE: f32 = 1e20;

const NC_EXTENSIONS: &[&str] = &["nc", "nc4", "cdf", "netcdf"];

/// Attributes describing how the input was stored; the exporter writes its own.
const STORAGE_ATTRS: &[&str] = &["_FillValue", "missing_value", "scale_factor", "add_offset"];

/// Removes a partially written file unless it was committed.
struct PendingFile {
    path: PathBuf,
    committed: bool,
}

impl PendingFile {
    fn new(path: PathBuf) -> Self {
        Self { path, committed: false }
    }

    fn commit(mut self, target: &Path) -> error_stack::Result<(), ClimGridError> {
        std::fs::rename(&self.path, target)
            .change_context_lazy(|| ClimGridError::io(target))
            .attach_printable_lazy(|| format!("failed to move {} into place", self.path.display()))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Could not remove incomplete file {}: {e}", self.path.display());
            }
        }
    }
}

/// Write `grid` to `path` and return the path actually written.
///
/// A `.nc` suffix is added when `path` does not already end in a netCDF
/// extension. The file is written under a temporary name next to the target
/// and only moved into place once complete, so a failed export never leaves
/// a partial file behind. An existing file at the target is replaced.
///
/// # Errors
/// * [`ClimGridError::InvalidGridMapping`] if the grid mapping cannot be resolved.
/// * [`ClimGridError::MissingAttribute`] if the time attributes have no `units`.
/// * [`ClimGridError::Io`] / [`ClimGridError::Netcdf`] if writing fails.
pub fn export<P: AsRef<Path>>(grid: &ClimGrid, path: P) -> error_stack::Result<PathBuf, ClimGridError> {
    let target = with_nc_extension(path.as_ref());
    let mapping = grid
        .resolve_grid_mapping()
        .attach_printable_lazy(|| format!("exporting '{}'", grid.variable()))?;
    let time_units = grid
        .timeattrib()
        .get("units")
        .and_then(attr_as_string)
        .ok_or_else(|| ClimGridError::missing_attr(grid.dimension_dict().time.as_str(), "units"))?;
    let offsets = timeaxis::encode_timevec(grid.timevec(), &time_units, grid.typeofcal())
        .attach_printable_lazy(|| format!("encoding the time axis with units '{time_units}'"))?;

    log::info!("Writing '{}' to {}", grid.variable(), target.display());
    let pending = PendingFile::new(temporary_path(&target));
    let mut nc = netcdf::create(&pending.path)
        .change_context_lazy(|| ClimGridError::io(&pending.path))
        .attach_printable("could not create the output file")?;

    write_dimensions(&mut nc, grid)?;
    write_coordinates(&mut nc, grid, &mapping)?;
    let mapping_var = write_grid_mapping(&mut nc, grid, &mapping)?;
    write_time(&mut nc, grid, &time_units, &offsets)?;
    write_data(&mut nc, grid, &mapping_var)?;
    for (name, value) in grid.globalattribs() {
        nc.add_attribute(name, value.clone())
            .change_context_lazy(|| ClimGridError::netcdf(format!("writing global attribute '{name}'")))?;
    }

    nc.close()
        .change_context_lazy(|| ClimGridError::netcdf("closing the output file"))?;
    pending.commit(&target)?;
    log::debug!("Finished writing {}", target.display());
    Ok(target)
}

fn with_nc_extension(path: &Path) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| NC_EXTENSIONS.contains(&e));
    if has_ext {
        path.to_path_buf()
    } else {
        let mut p = path.as_os_str().to_owned();
        p.push(".nc");
        PathBuf::from(p)
    }
}

fn temporary_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Names of the geographic coordinate variables of a curvilinear grid.
/// They must not collide with the native axis variables.
fn geographic_names(grid: &ClimGrid) -> (&str, &str) {
    let dims = grid.dimension_dict();
    if dims.lon == "lon" || dims.lat == "lat" {
        ("longitude", "latitude")
    } else {
        ("lon", "lat")
    }
}

fn write_dimensions(nc: &mut FileMut, grid: &ClimGrid) -> error_stack::Result<(), ClimGridError> {
    let dims = grid.dimension_dict();
    for (name, axis) in [(&dims.lon, GridAxis::X), (&dims.lat, GridAxis::Y), (&dims.time, GridAxis::Time)] {
        nc.add_dimension(name, grid.axis_len(axis))
            .change_context_lazy(|| ClimGridError::netcdf(format!("adding dimension '{name}'")))?;
    }
    Ok(())
}

fn put_attrs<'a, I>(var: &mut netcdf::VariableMut, attrs: I) -> error_stack::Result<(), ClimGridError>
where
    I: IntoIterator<Item = (&'a str, AttributeValue)>,
{
    let var_name = var.name();
    for (name, value) in attrs {
        var.put_attribute(name, value).change_context_lazy(|| {
            ClimGridError::netcdf(format!("writing attribute '{name}' of '{var_name}'"))
        })?;
    }
    Ok(())
}

fn actual_range<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> AttributeValue {
    let range = values
        .into_iter()
        .copied()
        .filter(|v| v.is_finite())
        .minmax_by(|a, b| a.total_cmp(b))
        .into_option();
    match range {
        Some((lo, hi)) => AttributeValue::Doubles(vec![lo, hi]),
        None => AttributeValue::Doubles(vec![f64::NAN, f64::NAN]),
    }
}

fn write_coordinates(
    nc: &mut FileMut,
    grid: &ClimGrid,
    mapping: &GridMapping,
) -> error_stack::Result<(), ClimGridError> {
    let dims = grid.dimension_dict();
    let lon_attrs = |range: AttributeValue| -> [(&'static str, AttributeValue); 4] {
        [
            ("units", grid.lonunits().into()),
            ("long_name", "longitude".into()),
            ("standard_name", "longitude".into()),
            ("actual_range", range),
        ]
    };
    let lat_attrs = |range: AttributeValue| -> [(&'static str, AttributeValue); 4] {
        [
            ("units", grid.latunits().into()),
            ("long_name", "latitude".into()),
            ("standard_name", "latitude".into()),
            ("actual_range", range),
        ]
    };

    match grid.coords() {
        SpatialCoords::Regular { lon, lat } => {
            write_axis(nc, &dims.lon, lon.view(), lon_attrs(actual_range(lon)))?;
            write_axis(nc, &dims.lat, lat.view(), lat_attrs(actual_range(lat)))?;
        }
        SpatialCoords::Curvilinear { lon, lat, x, y } => {
            let (lon_name, lat_name) = geographic_names(grid);
            write_field(nc, lon_name, &[dims.lon.as_str(), dims.lat.as_str()], lon, lon_attrs(actual_range(lon)))?;
            write_field(nc, lat_name, &[dims.lon.as_str(), dims.lat.as_str()], lat, lat_attrs(actual_range(lat)))?;

            let (x_meta, y_meta, units) = match mapping.kind() {
                GridKind::Projected => (
                    ("projection_x_coordinate", "x coordinate of projection"),
                    ("projection_y_coordinate", "y coordinate of projection"),
                    "m",
                ),
                _ => (
                    ("grid_longitude", "longitude in rotated pole grid"),
                    ("grid_latitude", "latitude in rotated pole grid"),
                    "degrees",
                ),
            };
            for (name, values, (standard_name, long_name), axis) in
                [(&dims.lon, x, x_meta, "X"), (&dims.lat, y, y_meta, "Y")]
            {
                let attrs = [
                    ("standard_name", standard_name.into()),
                    ("long_name", long_name.into()),
                    ("units", units.into()),
                    ("axis", axis.into()),
                    ("coordinate_defines", "point".into()),
                ];
                write_axis(nc, name, values.view(), attrs)?;
            }
        }
    }
    Ok(())
}

fn write_axis<const N: usize>(
    nc: &mut FileMut,
    name: &str,
    values: ArrayView1<f64>,
    attrs: [(&str, AttributeValue); N],
) -> error_stack::Result<(), ClimGridError> {
    let mut var = nc
        .add_variable::<f64>(name, &[name])
        .change_context_lazy(|| ClimGridError::netcdf(format!("adding coordinate '{name}'")))?;
    put_attrs(&mut var, attrs)?;
    var.put(values.as_standard_layout().view(), Extents::All)
        .change_context_lazy(|| ClimGridError::netcdf(format!("writing coordinate '{name}'")))?;
    Ok(())
}

fn write_field<const N: usize>(
    nc: &mut FileMut,
    name: &str,
    dims: &[&str],
    values: &Array2<f64>,
    attrs: [(&str, AttributeValue); N],
) -> error_stack::Result<(), ClimGridError> {
    let mut var = nc
        .add_variable::<f64>(name, dims)
        .change_context_lazy(|| ClimGridError::netcdf(format!("adding coordinate '{name}'")))?;
    put_attrs(&mut var, attrs)?;
    var.put(values.as_standard_layout().view(), Extents::All)
        .change_context_lazy(|| ClimGridError::netcdf(format!("writing coordinate '{name}'")))?;
    Ok(())
}

/// Write the scalar grid mapping variable and return its name.
fn write_grid_mapping(
    nc: &mut FileMut,
    grid: &ClimGrid,
    mapping: &GridMapping,
) -> error_stack::Result<String, ClimGridError> {
    let name = grid
        .varattribs()
        .get("grid_mapping")
        .and_then(attr_as_string)
        .unwrap_or_else(|| mapping.value().to_string());

    let mut var = nc
        .add_variable::<i32>(&name, &[])
        .change_context_lazy(|| ClimGridError::netcdf(format!("adding grid mapping variable '{name}'")))?;
    put_attrs(
        &mut var,
        grid.grid_mapping().iter().map(|(k, v)| (k.as_str(), v.clone())),
    )?;
    Ok(name)
}

fn write_time(
    nc: &mut FileMut,
    grid: &ClimGrid,
    time_units: &str,
    offsets: &[f64],
) -> error_stack::Result<(), ClimGridError> {
    let name = grid.dimension_dict().time.as_str();
    let mut var = nc
        .add_variable::<f64>(name, &[name])
        .change_context_lazy(|| ClimGridError::netcdf("adding the time variable"))?;
    put_attrs(
        &mut var,
        [
            ("long_name", "time".into()),
            ("standard_name", "time".into()),
            ("axis", "T".into()),
            ("calendar", grid.typeofcal().into()),
            ("units", time_units.into()),
            ("coordinate_defines", "point".into()),
        ],
    )?;
    var.put_values(offsets, Extents::All)
        .change_context_lazy(|| ClimGridError::netcdf("writing the time values"))?;
    Ok(())
}

fn write_data(nc: &mut FileMut, grid: &ClimGrid, mapping_var: &str) -> error_stack::Result<(), ClimGridError> {
    let dims = grid.dimension_dict();
    let name = grid.variable();
    let mut var = nc
        .add_variable::<f32>(name, &[dims.lon.as_str(), dims.lat.as_str(), dims.time.as_str()])
        .change_context_lazy(|| ClimGridError::netcdf(format!("adding variable '{name}'")))?;

    let mut attrs = vec![("_FillValue", AttributeValue::Float(FILL_VALUE))];
    attrs.extend(
        grid.varattribs()
            .iter()
            .filter(|(k, _)| !STORAGE_ATTRS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.clone())),
    );
    if !grid.varattribs().contains_key("grid_mapping") {
        attrs.push(("grid_mapping", mapping_var.into()));
    }
    if !grid.coords().is_regular() && !grid.varattribs().contains_key("coordinates") {
        let (lon_name, lat_name) = geographic_names(grid);
        attrs.push(("coordinates", format!("{lon_name} {lat_name}").into()));
    }
    put_attrs(&mut var, attrs)
        .attach_printable_lazy(|| format!("copying the attributes of '{name}'"))?;

    // Stored (lon, lat, time), held (time, x, y)
    let data = grid.data();
    let (nt, nx, ny) = data.dim();
    let cube = Array3::from_shape_fn((nx, ny, nt), |(x, y, t)| {
        let v = data[[t, x, y]];
        if v.is_finite() {
            v as f32
        } else {
            FILL_VALUE
        }
    });
    var.put(cube.view(), Extents::All)
        .change_context_lazy(|| ClimGridError::netcdf(format!("writing the values of '{name}'")))
        .attach_printable_lazy(|| format!("data has {} time steps", data.len_of(Axis(0))))?;
    Ok(())
}
