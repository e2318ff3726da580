use crate::error::ClimGridError;

/// Kelvin to Celsius offset
pub const KELVIN_OFFSET: f64 = 273.15;

/// Seconds per day, used to turn precipitation rates into daily totals.
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// The unit label written for temperatures converted from kelvin.
pub const CELSIUS: &str = "Celsius";

/// Value to add to a temperature in `unit` to get kelvin.
pub fn kelvin_offset(unit: &str) -> Result<f64, ClimGridError> {
    match unit.trim() {
        "K" | "kelvin" | "Kelvin" => Ok(0.0),
        u if is_celsius(u) => Ok(KELVIN_OFFSET),
        _ => Err(ClimGridError::UnknownUnit {
            quantity: "temperature",
            unit: unit.to_string(),
        }),
    }
}

/// Value to add to a temperature in `unit` to get degrees Celsius.
pub fn celsius_offset(unit: &str) -> Result<f64, ClimGridError> {
    Ok(kelvin_offset(unit)? - KELVIN_OFFSET)
}

fn is_celsius(unit: &str) -> bool {
    matches!(
        unit,
        "Celsius" | "celsius" | "degC" | "deg_C" | "degrees_C" | "degree_Celsius" | "°C" | "C"
    )
}

/// Whether a unit string describes a rate per second, e.g. "kg m-2 s-1".
pub fn is_per_second(unit: &str) -> bool {
    let unit = unit.trim();
    unit.ends_with("s-1") || unit.ends_with("/s") || unit.ends_with("s^-1")
}
