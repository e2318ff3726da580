//! Read daily climate model output into [`ClimGrid`]s, derive new variables
//! from them, and write the results back to CF netCDF files.
pub mod calculators;
pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod import;
pub mod logging;
pub mod nc_utils;
pub mod timeaxis;
pub mod units;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::ClimGridError;
pub use export::export;
pub use grid::ClimGrid;
pub use import::{import, Polygon};
