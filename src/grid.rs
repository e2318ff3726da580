//! The [`ClimGrid`] container: one climate variable on a spatiotemporal grid.
//!
//! A `ClimGrid` holds a data cube in (time, x, y) order, the spatial
//! coordinates, a daily time axis, and the CF metadata needed to write the
//! grid back to netCDF. Grids are only created by the importer or by the
//! calculators and are never modified afterwards: derived quantities are new
//! grids built with [`ClimGrid::derive`].
use chrono::NaiveDate;
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use netcdf::AttributeValue;

use crate::{error::ClimGridError, nc_utils::attr_as_string};

/// Ordered map of CF attribute names to values
pub type AttrMap = IndexMap<String, AttributeValue>;

/// Grid mapping names that describe a regular longitude/latitude grid.
const REGULAR_MAPPING_NAMES: &[&str] = &["latitude_longitude", "regular_longitude_latitude", "lonlat"];

/// The role of each axis of [`ClimGrid::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAxis {
    Time,
    X,
    Y,
}

impl GridAxis {
    /// Position of this axis in the data cube.
    pub fn index(self) -> usize {
        match self {
            GridAxis::Time => 0,
            GridAxis::X => 1,
            GridAxis::Y => 2,
        }
    }

    pub fn axis(self) -> Axis {
        Axis(self.index())
    }
}

/// Names of the longitude, latitude and time dimensions in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionNames {
    pub lon: String,
    pub lat: String,
    pub time: String,
}

impl Default for DimensionNames {
    fn default() -> Self {
        Self {
            lon: "lon".to_string(),
            lat: "lat".to_string(),
            time: "time".to_string(),
        }
    }
}

/// Spatial coordinates of a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialCoords {
    /// Regular longitude/latitude grid. The vectors are also the native x/y axes.
    Regular { lon: Array1<f64>, lat: Array1<f64> },
    /// Rotated-pole or projected grid. `lon` and `lat` are the geographic
    /// coordinates of each (x, y) cell; `x` and `y` are the native axis values.
    Curvilinear {
        lon: Array2<f64>,
        lat: Array2<f64>,
        x: Array1<f64>,
        y: Array1<f64>,
    },
}

impl SpatialCoords {
    /// Native x axis values (longitudes for regular grids).
    pub fn x_axis(&self) -> ArrayView1<'_, f64> {
        match self {
            SpatialCoords::Regular { lon, .. } => lon.view(),
            SpatialCoords::Curvilinear { x, .. } => x.view(),
        }
    }

    /// Native y axis values (latitudes for regular grids).
    pub fn y_axis(&self) -> ArrayView1<'_, f64> {
        match self {
            SpatialCoords::Regular { lat, .. } => lat.view(),
            SpatialCoords::Curvilinear { y, .. } => y.view(),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, SpatialCoords::Regular { .. })
    }

    fn check_shape(&self, nx: usize, ny: usize) -> Result<(), ClimGridError> {
        let check = |what: &str, actual: &[usize], expected: &[usize]| {
            if actual == expected {
                Ok(())
            } else {
                Err(ClimGridError::shape_mismatch(what, expected, actual))
            }
        };

        match self {
            SpatialCoords::Regular { lon, lat } => {
                check("longitude vector", lon.shape(), &[nx])?;
                check("latitude vector", lat.shape(), &[ny])
            }
            SpatialCoords::Curvilinear { lon, lat, x, y } => {
                check("longitude field", lon.shape(), &[nx, ny])?;
                check("latitude field", lat.shape(), &[nx, ny])?;
                check("x axis", x.shape(), &[nx])?;
                check("y axis", y.shape(), &[ny])
            }
        }
    }
}

/// Kind of grid described by a grid mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    Regular,
    RotatedPole,
    Projected,
}

/// A grid mapping resolved from whichever of its two identifying keys is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridMapping {
    /// Identified by a `grid_mapping` entry
    Attribute(String),
    /// Identified by a `grid_mapping_name` entry
    Name(String),
}

impl GridMapping {
    /// Resolve a grid mapping attribute map.
    ///
    /// Exactly one of `grid_mapping` and `grid_mapping_name` must be present and
    /// hold a string, otherwise [`ClimGridError::InvalidGridMapping`] is returned.
    pub fn resolve(attrs: &AttrMap) -> Result<Self, ClimGridError> {
        let by_attr = attrs.get("grid_mapping");
        let by_name = attrs.get("grid_mapping_name");
        let as_str = |key: &str, v: &AttributeValue| {
            attr_as_string(v)
                .ok_or_else(|| ClimGridError::InvalidGridMapping(format!("'{key}' is not a string")))
        };

        match (by_attr, by_name) {
            (Some(v), None) => Ok(Self::Attribute(as_str("grid_mapping", v)?)),
            (None, Some(v)) => Ok(Self::Name(as_str("grid_mapping_name", v)?)),
            (Some(_), Some(_)) => Err(ClimGridError::InvalidGridMapping(
                "both 'grid_mapping' and 'grid_mapping_name' are present".to_string(),
            )),
            (None, None) => Err(ClimGridError::InvalidGridMapping(
                "neither 'grid_mapping' nor 'grid_mapping_name' is present".to_string(),
            )),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            GridMapping::Attribute(v) | GridMapping::Name(v) => v,
        }
    }

    pub fn kind(&self) -> GridKind {
        let value = self.value().to_ascii_lowercase();
        if REGULAR_MAPPING_NAMES.contains(&value.as_str()) {
            GridKind::Regular
        } else if value.contains("rotated") {
            GridKind::RotatedPole
        } else {
            GridKind::Projected
        }
    }
}

/// Where a grid came from. Copied unchanged to derived grids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub model: String,
    pub experiment: String,
    pub run: String,
    pub project: String,
    pub institute: String,
    pub filename: String,
    pub frequency: String,
}

/// Every field of a [`ClimGrid`], used to construct one.
#[derive(Debug, Clone)]
pub struct ClimGridParts {
    /// Data cube in (time, x, y) order
    pub data: Array3<f64>,
    pub coords: SpatialCoords,
    pub timevec: Vec<NaiveDate>,
    /// Attributes of the time variable, must include `units` to be exported
    pub timeattrib: AttrMap,
    /// `true` for valid cells, shape (x, y)
    pub mask: Array2<bool>,
    pub grid_mapping: AttrMap,
    pub dimension_dict: DimensionNames,
    pub provenance: Provenance,
    pub typeofcal: String,
    pub dataunits: String,
    pub latunits: String,
    pub lonunits: String,
    pub variable: String,
    pub typeofvar: String,
    pub varattribs: AttrMap,
    pub globalattribs: AttrMap,
}

/// Description of a quantity computed from existing grids, see [`ClimGrid::derive`].
#[derive(Debug, Clone)]
pub struct DerivedVariable<'a> {
    /// Short name and tag of the new variable
    pub name: &'a str,
    pub units: &'a str,
    pub standard_name: &'a str,
    pub long_name: &'a str,
    pub history: String,
}

/// One climate variable on a spatiotemporal grid, with its metadata.
#[derive(Debug, Clone)]
pub struct ClimGrid {
    data: Array3<f64>,
    coords: SpatialCoords,
    timevec: Vec<NaiveDate>,
    timeattrib: AttrMap,
    mask: Array2<bool>,
    grid_mapping: AttrMap,
    dimension_dict: DimensionNames,
    provenance: Provenance,
    typeofcal: String,
    dataunits: String,
    latunits: String,
    lonunits: String,
    variable: String,
    typeofvar: String,
    varattribs: AttrMap,
    globalattribs: AttrMap,
}

impl ClimGrid {
    /// Build a grid, checking that the parts are consistent.
    ///
    /// # Errors
    /// * [`ClimGridError::ShapeMismatch`] if the time axis, coordinates or mask
    ///   do not match the data cube.
    /// * [`ClimGridError::Format`] if the time axis is not strictly increasing.
    /// * [`ClimGridError::InvalidGridMapping`] if the grid mapping cannot be
    ///   resolved or disagrees with the kind of coordinates.
    pub fn new(parts: ClimGridParts) -> Result<Self, ClimGridError> {
        let (nt, nx, ny) = parts.data.dim();
        if parts.timevec.len() != nt {
            return Err(ClimGridError::shape_mismatch(
                "time axis",
                &[nt],
                &[parts.timevec.len()],
            ));
        }

        if let Some(w) = parts.timevec.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ClimGridError::format(
                format!("{} followed by {}", w[0], w[1]),
                "time axis must be strictly increasing",
            ));
        }

        parts.coords.check_shape(nx, ny)?;
        if parts.mask.dim() != (nx, ny) {
            return Err(ClimGridError::shape_mismatch("mask", &[nx, ny], parts.mask.shape()));
        }

        let mapping = GridMapping::resolve(&parts.grid_mapping)?;
        let regular_mapping = mapping.kind() == GridKind::Regular;
        if regular_mapping != parts.coords.is_regular() {
            let layout = if parts.coords.is_regular() { "1-D" } else { "2-D" };
            return Err(ClimGridError::InvalidGridMapping(format!(
                "grid mapping '{}' does not match {layout} coordinates",
                mapping.value()
            )));
        }

        Ok(Self {
            data: parts.data,
            coords: parts.coords,
            timevec: parts.timevec,
            timeattrib: parts.timeattrib,
            mask: parts.mask,
            grid_mapping: parts.grid_mapping,
            dimension_dict: parts.dimension_dict,
            provenance: parts.provenance,
            typeofcal: parts.typeofcal,
            dataunits: parts.dataunits,
            latunits: parts.latunits,
            lonunits: parts.lonunits,
            variable: parts.variable,
            typeofvar: parts.typeofvar,
            varattribs: parts.varattribs,
            globalattribs: parts.globalattribs,
        })
    }

    /// Take the grid apart, e.g. to build a modified copy with [`ClimGrid::new`].
    pub fn into_parts(self) -> ClimGridParts {
        ClimGridParts {
            data: self.data,
            coords: self.coords,
            timevec: self.timevec,
            timeattrib: self.timeattrib,
            mask: self.mask,
            grid_mapping: self.grid_mapping,
            dimension_dict: self.dimension_dict,
            provenance: self.provenance,
            typeofcal: self.typeofcal,
            dataunits: self.dataunits,
            latunits: self.latunits,
            lonunits: self.lonunits,
            variable: self.variable,
            typeofvar: self.typeofvar,
            varattribs: self.varattribs,
            globalattribs: self.globalattribs,
        }
    }

    /// Make a new grid holding `data`, a quantity computed from this one.
    ///
    /// Coordinates, time axis, mask, grid mapping, provenance and global
    /// attributes are copied from `self`. The variable name, tag and units
    /// come from `var`, and the `units`, `standard_name`, `long_name` and
    /// `history` variable attributes are overwritten. `self` is not modified.
    pub fn derive(&self, data: Array3<f64>, var: DerivedVariable) -> Result<ClimGrid, ClimGridError> {
        let mut varattribs = self.varattribs.clone();
        varattribs.insert("units".to_string(), var.units.into());
        varattribs.insert("standard_name".to_string(), var.standard_name.into());
        varattribs.insert("long_name".to_string(), var.long_name.into());
        varattribs.insert("history".to_string(), var.history.into());

        let mut parts = self.parts_with_data(data);
        parts.variable = var.name.to_string();
        parts.typeofvar = var.name.to_string();
        parts.dataunits = var.units.to_string();
        parts.varattribs = varattribs;
        ClimGrid::new(parts)
    }

    /// Return a copy with extra or replacement attributes.
    ///
    /// A `units` entry in `var_attrs` also relabels [`ClimGrid::dataunits`].
    pub fn with_attributes(&self, global_attrs: &AttrMap, var_attrs: &AttrMap) -> Result<ClimGrid, ClimGridError> {
        let mut parts = self.parts_with_data(self.data.clone());
        for (k, v) in global_attrs {
            parts.globalattribs.insert(k.clone(), v.clone());
        }
        for (k, v) in var_attrs {
            parts.varattribs.insert(k.clone(), v.clone());
        }
        if let Some(units) = var_attrs.get("units").and_then(attr_as_string) {
            parts.dataunits = units;
        }
        ClimGrid::new(parts)
    }

    /// Copy every field but the data cube, which is replaced by `data`.
    fn parts_with_data(&self, data: Array3<f64>) -> ClimGridParts {
        ClimGridParts {
            data,
            coords: self.coords.clone(),
            timevec: self.timevec.clone(),
            timeattrib: self.timeattrib.clone(),
            mask: self.mask.clone(),
            grid_mapping: self.grid_mapping.clone(),
            dimension_dict: self.dimension_dict.clone(),
            provenance: self.provenance.clone(),
            typeofcal: self.typeofcal.clone(),
            dataunits: self.dataunits.clone(),
            latunits: self.latunits.clone(),
            lonunits: self.lonunits.clone(),
            variable: self.variable.clone(),
            typeofvar: self.typeofvar.clone(),
            varattribs: self.varattribs.clone(),
            globalattribs: self.globalattribs.clone(),
        }
    }

    /// Cells with at least one finite value along the time axis are valid.
    pub fn compute_mask(data: &Array3<f64>) -> Array2<bool> {
        data.map_axis(GridAxis::Time.axis(), |series| series.iter().any(|v| v.is_finite()))
    }

    pub fn resolve_grid_mapping(&self) -> Result<GridMapping, ClimGridError> {
        GridMapping::resolve(&self.grid_mapping)
    }

    pub fn axis_len(&self, axis: GridAxis) -> usize {
        self.data.len_of(axis.axis())
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn coords(&self) -> &SpatialCoords {
        &self.coords
    }

    pub fn timevec(&self) -> &[NaiveDate] {
        &self.timevec
    }

    pub fn timeattrib(&self) -> &AttrMap {
        &self.timeattrib
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn grid_mapping(&self) -> &AttrMap {
        &self.grid_mapping
    }

    pub fn dimension_dict(&self) -> &DimensionNames {
        &self.dimension_dict
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn model(&self) -> &str {
        &self.provenance.model
    }

    pub fn experiment(&self) -> &str {
        &self.provenance.experiment
    }

    pub fn run(&self) -> &str {
        &self.provenance.run
    }

    pub fn typeofcal(&self) -> &str {
        &self.typeofcal
    }

    pub fn dataunits(&self) -> &str {
        &self.dataunits
    }

    pub fn latunits(&self) -> &str {
        &self.latunits
    }

    pub fn lonunits(&self) -> &str {
        &self.lonunits
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn typeofvar(&self) -> &str {
        &self.typeofvar
    }

    pub fn varattribs(&self) -> &AttrMap {
        &self.varattribs
    }

    pub fn globalattribs(&self) -> &AttrMap {
        &self.globalattribs
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array3};

    use super::*;
    use crate::test_utils::{regular_parts, rotated_parts};

    #[test]
    fn test_resolve_grid_mapping() {
        let mut attrs = AttrMap::new();
        attrs.insert("grid_mapping_name".into(), "rotated_latitude_longitude".into());
        let gm = GridMapping::resolve(&attrs).unwrap();
        assert_eq!(gm, GridMapping::Name("rotated_latitude_longitude".to_string()));
        assert_eq!(gm.kind(), GridKind::RotatedPole);

        let mut attrs = AttrMap::new();
        attrs.insert("grid_mapping".into(), "Regular_longitude_latitude".into());
        let gm = GridMapping::resolve(&attrs).unwrap();
        assert_eq!(gm.kind(), GridKind::Regular);

        let mut attrs = AttrMap::new();
        attrs.insert("grid_mapping_name".into(), "lambert_conformal_conic".into());
        assert_eq!(GridMapping::resolve(&attrs).unwrap().kind(), GridKind::Projected);
    }

    #[test]
    fn test_grid_mapping_exclusivity() {
        let mut parts = regular_parts("tas", "Celsius");
        parts
            .grid_mapping
            .insert("grid_mapping".into(), "latitude_longitude".into());
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::InvalidGridMapping(_)), "got {err:?}");

        let mut parts = regular_parts("tas", "Celsius");
        parts.grid_mapping.clear();
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::InvalidGridMapping(_)), "got {err:?}");
    }

    #[test]
    fn test_mapping_must_match_coords() {
        let mut parts = rotated_parts("tas", "Celsius");
        parts.grid_mapping.clear();
        parts
            .grid_mapping
            .insert("grid_mapping_name".into(), "latitude_longitude".into());
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::InvalidGridMapping(_)), "got {err:?}");
    }

    #[test]
    fn test_shape_checks() {
        let mut parts = regular_parts("tas", "Celsius");
        parts.timevec.pop();
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::ShapeMismatch { .. }), "got {err:?}");

        let mut parts = regular_parts("tas", "Celsius");
        parts.mask = Array2::from_elem((1, 1), true);
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::ShapeMismatch { .. }), "got {err:?}");

        let mut parts = regular_parts("tas", "Celsius");
        parts.timevec.swap(0, 1);
        let err = ClimGrid::new(parts).unwrap_err();
        assert!(matches!(err, ClimGridError::Format { .. }), "got {err:?}");
    }

    #[test]
    fn test_axis_roles() {
        let grid = ClimGrid::new(regular_parts("tas", "Celsius")).unwrap();
        assert_eq!(grid.axis_len(GridAxis::Time), grid.timevec().len());
        assert_eq!(grid.axis_len(GridAxis::X), grid.coords().x_axis().len());
        assert_eq!(grid.axis_len(GridAxis::Y), grid.coords().y_axis().len());
    }

    #[test]
    fn test_compute_mask() {
        let mut data = Array3::<f64>::zeros((2, 2, 1));
        data[[0, 0, 0]] = f64::NAN;
        data[[0, 1, 0]] = f64::NAN;
        data[[1, 1, 0]] = f64::NAN;
        let mask = ClimGrid::compute_mask(&data);
        assert_eq!(mask, array![[true], [false]]);
    }

    #[test]
    fn test_derive_leaves_source_untouched() {
        let grid = ClimGrid::new(regular_parts("psl", "Pa")).unwrap();
        let new_data = grid.data().mapv(|v| v * 2.0);
        let derived = grid
            .derive(
                new_data,
                DerivedVariable {
                    name: "ps",
                    units: "Pa",
                    standard_name: "surface_air_pressure",
                    long_name: "surface pressure",
                    history: "doubled".to_string(),
                },
            )
            .unwrap();

        assert_eq!(derived.typeofvar(), "ps");
        assert_eq!(derived.variable(), "ps");
        assert_eq!(grid.typeofvar(), "psl");
        assert_eq!(
            attr_as_string(&derived.varattribs()["standard_name"]).as_deref(),
            Some("surface_air_pressure")
        );
        assert_ne!(grid.varattribs().get("history"), derived.varattribs().get("history"));
        assert_eq!(grid.coords(), derived.coords());
        assert_eq!(grid.provenance(), derived.provenance());
    }

    #[test]
    fn test_derive_takes_given_data() {
        let grid = ClimGrid::new(regular_parts("psl", "Pa")).unwrap();
        let new_data = Array3::from_elem(grid.data().dim(), 7.0);
        let derived = grid
            .derive(
                new_data.clone(),
                DerivedVariable {
                    name: "ps",
                    units: "Pa",
                    standard_name: "surface_air_pressure",
                    long_name: "surface pressure",
                    history: "constant".to_string(),
                },
            )
            .unwrap();
        assert_eq!(derived.data(), &new_data);
        assert_eq!(derived.timevec(), grid.timevec());
        assert_eq!(derived.mask(), grid.mask());
        assert_eq!(derived.grid_mapping(), grid.grid_mapping());
        assert_eq!(derived.dimension_dict(), grid.dimension_dict());
        assert_eq!(derived.globalattribs(), grid.globalattribs());

        // The replacement cube must still fit the copied coordinates
        let err = grid
            .derive(
                Array3::zeros((1, 1, 1)),
                DerivedVariable {
                    name: "ps",
                    units: "Pa",
                    standard_name: "surface_air_pressure",
                    long_name: "surface pressure",
                    history: "bad shape".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ClimGridError::ShapeMismatch { .. }), "got {err:?}");
    }

    #[test]
    fn test_with_attributes() {
        let grid = ClimGrid::new(regular_parts("tas", "Celsius")).unwrap();
        let mut global = AttrMap::new();
        global.insert("institution".into(), "Somewhere".into());
        let mut var = AttrMap::new();
        var.insert("units".into(), "degC".into());
        let updated = grid.with_attributes(&global, &var).unwrap();
        assert_eq!(updated.dataunits(), "degC");
        assert!(updated.globalattribs().contains_key("institution"));
        assert_eq!(grid.dataunits(), "Celsius");
    }
}
