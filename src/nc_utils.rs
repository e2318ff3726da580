//! Helpers for reading attributes and variables through the `netcdf` crate.
use error_stack::ResultExt;
use ndarray::ArrayD;
use netcdf::{AttributeValue, Extents};

use crate::{error::ClimGridError, grid::AttrMap};

/// Owner name used in error messages for file-level attributes
pub(crate) const GLOBAL: &str = "global";

/// Interpret an attribute as a string. Arrays of strings are joined with spaces.
pub fn attr_as_string(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Str(s) => Some(s.clone()),
        AttributeValue::Strs(items) => Some(items.join(" ")),
        _ => None,
    }
}

/// Interpret a numeric attribute as an `f64`. Arrays give their first element.
pub fn attr_as_f64(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Uchar(v) => Some(*v as f64),
        AttributeValue::Schar(v) => Some(*v as f64),
        AttributeValue::Ushort(v) => Some(*v as f64),
        AttributeValue::Short(v) => Some(*v as f64),
        AttributeValue::Uint(v) => Some(*v as f64),
        AttributeValue::Int(v) => Some(*v as f64),
        AttributeValue::Ulonglong(v) => Some(*v as f64),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Float(v) => Some(*v as f64),
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Shorts(v) => v.first().map(|x| *x as f64),
        AttributeValue::Ints(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

/// Read a required string attribute from a variable.
pub(crate) fn get_string_attr(var: &netcdf::Variable, attr: &str) -> error_stack::Result<String, ClimGridError> {
    let value = var
        .attribute_value(attr)
        .ok_or_else(|| ClimGridError::missing_attr(var.name(), attr))?
        .change_context_lazy(|| {
            ClimGridError::netcdf(format!("reading the '{attr}' attribute of '{}'", var.name()))
        })?;
    attr_as_string(&value).ok_or_else(|| {
        error_stack::Report::new(ClimGridError::missing_attr(var.name(), attr))
            .attach_printable(format!("'{attr}' is not a string"))
    })
}

/// Read an optional string attribute from the root group.
pub(crate) fn get_opt_global_attr(file: &netcdf::File, attr: &str) -> error_stack::Result<Option<String>, ClimGridError> {
    let Some(att) = file.attribute(attr) else {
        return Ok(None);
    };
    let value = att
        .value()
        .change_context_lazy(|| ClimGridError::netcdf(format!("reading global attribute '{attr}'")))?;
    Ok(attr_as_string(&value))
}

/// Read a required string attribute from the root group.
pub(crate) fn get_global_attr(file: &netcdf::File, attr: &str) -> error_stack::Result<String, ClimGridError> {
    get_opt_global_attr(file, attr)?.ok_or_else(|| ClimGridError::missing_attr(GLOBAL, attr).into())
}

/// Collect every attribute of a variable, in file order.
pub(crate) fn var_attributes(var: &netcdf::Variable) -> error_stack::Result<AttrMap, ClimGridError> {
    let mut attrs = AttrMap::new();
    for att in var.attributes() {
        let value = att.value().change_context_lazy(|| {
            ClimGridError::netcdf(format!("reading attribute '{}' of '{}'", att.name(), var.name()))
        })?;
        attrs.insert(att.name().to_string(), value);
    }
    Ok(attrs)
}

/// Collect every root group attribute, in file order.
pub(crate) fn global_attributes(file: &netcdf::File) -> error_stack::Result<AttrMap, ClimGridError> {
    let mut attrs = AttrMap::new();
    for att in file.attributes() {
        let value = att
            .value()
            .change_context_lazy(|| ClimGridError::netcdf(format!("reading global attribute '{}'", att.name())))?;
        attrs.insert(att.name().to_string(), value);
    }
    Ok(attrs)
}

/// Index of the first dimension of `var` whose name is in `names`.
pub(crate) fn find_dim(var: &netcdf::Variable, names: &[&str]) -> Option<usize> {
    var.dimensions()
        .iter()
        .position(|dim| names.contains(&dim.name().as_str()))
}

/// Read a whole variable as double precision, whatever its stored type.
pub(crate) fn read_f64(var: &netcdf::Variable) -> error_stack::Result<ArrayD<f64>, ClimGridError> {
    var.get::<f64, _>(Extents::All)
        .change_context_lazy(|| ClimGridError::netcdf(format!("reading variable '{}'", var.name())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_conversions() {
        assert_eq!(attr_as_string(&"K".into()).as_deref(), Some("K"));
        assert_eq!(attr_as_string(&AttributeValue::Double(1.0)), None);
        assert_eq!(attr_as_f64(&AttributeValue::Float(1e20)), Some(1e20f32 as f64));
        assert_eq!(attr_as_f64(&AttributeValue::Doubles(vec![3.0, 4.0])), Some(3.0));
        assert_eq!(attr_as_f64(&"3".into()), None);
    }
}
