//! Attribute overrides applied to grids before export, read from TOML.
//!
//! ```toml
//! [global_attrs]
//! institution = "Example Lab"
//!
//! [var_attrs]
//! comment = "derived with climgrid"
//! valid_range = [0.0, 50.0]
//! ```
use std::{io::Read, path::Path};

use error_stack::ResultExt;
use indexmap::IndexMap;
use netcdf::AttributeValue;
use serde::Deserialize;

use crate::{
    error::ClimGridError,
    grid::{AttrMap, ClimGrid},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File level attributes to add or replace
    pub global_attrs: IndexMap<String, toml::Value>,
    /// Attributes of the data variable to add or replace
    pub var_attrs: IndexMap<String, toml::Value>,
}

impl ExportConfig {
    pub fn from_toml_file(toml_file: &Path) -> error_stack::Result<Self, ClimGridError> {
        let mut f = std::fs::File::open(toml_file).change_context_lazy(|| ClimGridError::io(toml_file))?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)
            .change_context_lazy(|| ClimGridError::io(toml_file))?;
        let config: Self = toml::from_str(&buf).change_context_lazy(|| {
            ClimGridError::Config(format!("could not parse {}", toml_file.display()))
        })?;
        Ok(config)
    }

    /// Return a copy of `grid` with the configured attributes merged in.
    pub fn apply(&self, grid: &ClimGrid) -> Result<ClimGrid, ClimGridError> {
        let global_attrs = to_attr_map(&self.global_attrs)?;
        let var_attrs = to_attr_map(&self.var_attrs)?;
        grid.with_attributes(&global_attrs, &var_attrs)
    }
}

fn to_attr_map(values: &IndexMap<String, toml::Value>) -> Result<AttrMap, ClimGridError> {
    values
        .iter()
        .map(|(k, v)| Ok((k.clone(), toml_to_attr(k, v)?)))
        .collect()
}

/// Convert a TOML value to a netCDF attribute value.
///
/// Strings, integers, floats and arrays of numbers are supported. Arrays that
/// mix integers and floats are stored as doubles.
pub fn toml_to_attr(key: &str, value: &toml::Value) -> Result<AttributeValue, ClimGridError> {
    let unsupported = || ClimGridError::Config(format!("unsupported value for attribute '{key}': {value}"));
    match value {
        toml::Value::String(s) => Ok(AttributeValue::Str(s.clone())),
        toml::Value::Integer(i) => Ok(AttributeValue::Longlong(*i)),
        toml::Value::Float(f) => Ok(AttributeValue::Double(*f)),
        toml::Value::Array(items) if items.iter().all(|v| v.is_integer()) && !items.is_empty() => {
            let ints = items.iter().filter_map(|v| v.as_integer()).collect();
            Ok(AttributeValue::Longlongs(ints))
        }
        toml::Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|v| match v {
                toml::Value::Integer(i) => Ok(*i as f64),
                toml::Value::Float(f) => Ok(*f),
                _ => Err(unsupported()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::Doubles),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{nc_utils::attr_as_string, test_utils::regular_parts};

    const EXAMPLE: &str = r#"
[global_attrs]
institution = "Example Lab"
realization = 3

[var_attrs]
comment = "derived with climgrid"
valid_range = [0.0, 50]
units = "degC"
"#;

    #[test]
    fn test_parse_and_apply() {
        let config: ExportConfig = toml::from_str(EXAMPLE).unwrap();
        let grid = ClimGrid::new(regular_parts("tas", "Celsius")).unwrap();
        let out = config.apply(&grid).unwrap();

        assert_eq!(
            attr_as_string(&out.globalattribs()["institution"]).as_deref(),
            Some("Example Lab")
        );
        assert_eq!(out.globalattribs()["realization"], AttributeValue::Longlong(3));
        assert_eq!(out.varattribs()["valid_range"], AttributeValue::Doubles(vec![0.0, 50.0]));
        assert_eq!(out.dataunits(), "degC");
        // Existing entries are kept
        assert!(out.globalattribs().contains_key("model_id"));
        assert_eq!(grid.dataunits(), "Celsius");
    }

    #[test]
    fn test_empty_config() {
        let config: ExportConfig = toml::from_str("").unwrap();
        assert!(config.global_attrs.is_empty());
        assert!(config.var_attrs.is_empty());
    }

    #[rstest]
    #[case("flag = true")]
    #[case("names = [\"a\", \"b\"]")]
    #[case("empty = []")]
    fn test_unsupported_values(#[case] line: &str) {
        let config: ExportConfig = toml::from_str(&format!("[var_attrs]\n{line}")).unwrap();
        let grid = ClimGrid::new(regular_parts("tas", "Celsius")).unwrap();
        let err = config.apply(&grid).unwrap_err();
        assert!(matches!(err, ClimGridError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.toml");
        std::fs::write(&path, EXAMPLE).unwrap();
        let config = ExportConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.var_attrs.len(), 3);

        let err = ExportConfig::from_toml_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err.current_context(), ClimGridError::Io(_)));
    }
}
