//! Common errors across the climgrid crate
use std::path::PathBuf;

/// Errors raised while reading, deriving, or writing climate grids.
///
/// Pure functions (time-axis parsing, calculators, grid construction) return
/// this type directly. Functions that touch the file system wrap it in an
/// [`error_stack::Report`] so that the failing step can be attached.
#[derive(Debug, thiserror::Error)]
pub enum ClimGridError {
    /// A string (usually a time units attribute) could not be parsed.
    #[error("Could not parse '{value}': {reason}")]
    Format { value: String, reason: String },

    /// The time axis uses a calendar other than the 365-day "noleap" calendar.
    #[error("Calendar '{0}' is not supported, only 'noleap'/'365_day' calendars can be decoded")]
    UnsupportedCalendar(String),

    /// A required attribute was not present. `owner` is the variable name, or
    /// "global" for file-level attributes.
    #[error("Required attribute '{attribute}' is missing from {owner}")]
    MissingAttribute { owner: String, attribute: String },

    /// A required variable was not present in the netCDF file.
    #[error("Required variable '{0}' is missing from the file")]
    MissingVariable(String),

    /// The dimensions of a variable could not be assigned to time/lon/lat roles.
    #[error("Could not identify the {role} dimension of variable '{variable}'")]
    MissingDimension { variable: String, role: &'static str },

    /// A file could not be opened, created, moved or removed.
    #[error("I/O error on {}", .0.display())]
    Io(PathBuf),

    /// A calculator received a grid tagged with the wrong variable.
    #[error("Argument {position} must be a '{expected}' grid, got '{actual}'")]
    ArgumentType {
        position: usize,
        expected: String,
        actual: String,
    },

    /// Two arrays that must have the same shape did not.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The grid mapping has neither or both of `grid_mapping`/`grid_mapping_name`,
    /// or disagrees with the coordinate layout.
    #[error("Invalid grid mapping: {0}")]
    InvalidGridMapping(String),

    /// A unit string could not be interpreted for the requested conversion.
    #[error("Unknown {quantity} unit '{unit}'")]
    UnknownUnit { quantity: &'static str, unit: String },

    /// The netCDF library reported an error.
    #[error("netCDF error while {0}")]
    Netcdf(String),

    /// A configuration file could not be read or contained an unusable value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClimGridError {
    pub(crate) fn format<V: ToString, R: ToString>(value: V, reason: R) -> Self {
        Self::Format {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing_attr<O: ToString, A: ToString>(owner: O, attribute: A) -> Self {
        Self::MissingAttribute {
            owner: owner.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub(crate) fn shape_mismatch<W: ToString>(what: W, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn netcdf<S: ToString>(during: S) -> Self {
        Self::Netcdf(during.to_string())
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P) -> Self {
        Self::Io(path.into())
    }
}
