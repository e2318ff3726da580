//! Derived variables computed elementwise from imported grids.
//!
//! Each calculator first checks the variable tag of every argument, then
//! that all data cubes have the same shape, and only then computes. The
//! result copies coordinates, time axis, mask and provenance from one
//! "primary" argument.
use ndarray::{Array3, Zip};

use crate::{
    error::ClimGridError,
    grid::{ClimGrid, DerivedVariable},
    units::{celsius_offset, kelvin_offset, KELVIN_OFFSET},
};

/// Scale height factor (m) of the barometric approximation
const BAROMETRIC_SCALE: f64 = 18400.0;

/// Ratio of the molar masses of water vapour and dry air
const EPSILON: f64 = 0.622;

const WBGT_TEMP_COEF: f64 = 0.567;
const WBGT_VP_COEF: f64 = 0.00393;
const WBGT_CONST: f64 = 3.94;

fn check_tag(position: usize, grid: &ClimGrid, expected: &str) -> Result<(), ClimGridError> {
    if grid.typeofvar() == expected {
        Ok(())
    } else {
        Err(ClimGridError::ArgumentType {
            position,
            expected: expected.to_string(),
            actual: grid.typeofvar().to_string(),
        })
    }
}

fn check_shapes(grids: &[&ClimGrid]) -> Result<(), ClimGridError> {
    let Some((first, rest)) = grids.split_first() else {
        return Ok(());
    };
    for grid in rest {
        if grid.data().shape() != first.data().shape() {
            return Err(ClimGridError::shape_mismatch(
                format!("'{}' against '{}'", grid.variable(), first.variable()),
                first.data().shape(),
                grid.data().shape(),
            ));
        }
    }
    Ok(())
}

/// Approximate surface pressure from sea level pressure with the barometric formula
///
/// `ps = psl * 10^(-orog / (18400 * T / 273.15))` where `T` is `tas` in kelvin.
/// The arguments must be tagged `psl`, `orog` and `tas`. `tas` may be in kelvin
/// or Celsius. The result takes its metadata from `psl`.
pub fn approx_surfacepressure(psl: &ClimGrid, orog: &ClimGrid, tas: &ClimGrid) -> Result<ClimGrid, ClimGridError> {
    check_tag(1, psl, "psl")?;
    check_tag(2, orog, "orog")?;
    check_tag(3, tas, "tas")?;
    check_shapes(&[psl, orog, tas])?;
    let to_kelvin = kelvin_offset(tas.dataunits())?;

    let sp = Zip::from(psl.data())
        .and(orog.data())
        .and(tas.data())
        .map_collect(|&p, &z, &t| {
            let x = -z / (BAROMETRIC_SCALE * (t + to_kelvin) / KELVIN_OFFSET);
            p * 10f64.powf(x)
        });

    log::debug!(
        "Computed surface pressure from '{}', '{}' and '{}'",
        psl.variable(),
        orog.variable(),
        tas.variable()
    );
    psl.derive(
        sp,
        DerivedVariable {
            name: "ps",
            units: "Pa",
            standard_name: "surface_air_pressure",
            long_name: "Surface Air Pressure",
            history: format!(
                "ps = {} * 10^(-{} / (18400 * {} / 273.15)), barometric approximation",
                psl.variable(),
                orog.variable(),
                tas.variable()
            ),
        },
    )
}

/// Partial pressure of water vapour from specific humidity and surface pressure.
///
/// `vp = q * ps / (q + 0.622)`. The arguments must be tagged `huss` and `ps`;
/// the result takes its metadata from `ps`.
pub fn vaporpressure(huss: &ClimGrid, ps: &ClimGrid) -> Result<ClimGrid, ClimGridError> {
    check_tag(1, huss, "huss")?;
    check_tag(2, ps, "ps")?;
    check_shapes(&[huss, ps])?;

    let vp: Array3<f64> = Zip::from(huss.data())
        .and(ps.data())
        .map_collect(|&q, &sp| q * sp / (q + EPSILON));

    ps.derive(
        vp,
        DerivedVariable {
            name: "vp",
            units: "Pa",
            standard_name: "water_vapor_partial_pressure_in_air",
            long_name: "Water Vapor Pressure",
            history: format!("vp = {q} * {p} / ({q} + 0.622)", q = huss.variable(), p = ps.variable()),
        },
    )
}

/// Vapour pressure when only sea level pressure is available.
///
/// Surface pressure is first approximated with [`approx_surfacepressure`].
/// All four tags are checked before anything is computed.
pub fn vaporpressure_from_sealevel(
    huss: &ClimGrid,
    psl: &ClimGrid,
    orog: &ClimGrid,
    tas: &ClimGrid,
) -> Result<ClimGrid, ClimGridError> {
    check_tag(1, huss, "huss")?;
    check_tag(2, psl, "psl")?;
    check_tag(3, orog, "orog")?;
    check_tag(4, tas, "tas")?;
    check_shapes(&[huss, psl, orog, tas])?;

    let ps = approx_surfacepressure(psl, orog, tas)?;
    vaporpressure(huss, &ps)
}

/// Simplified wet bulb globe temperature, `0.567 * T + 0.00393 * vp + 3.94`.
///
/// `T` is the diurnal temperature (tag `tdiu`) in Celsius and `vp` the vapour
/// pressure (tag `vp`) in Pa. The result takes its metadata from `tdiu`.
pub fn wbgt(tdiu: &ClimGrid, vp: &ClimGrid) -> Result<ClimGrid, ClimGridError> {
    check_tag(1, tdiu, "tdiu")?;
    check_tag(2, vp, "vp")?;
    check_shapes(&[tdiu, vp])?;
    let to_celsius = celsius_offset(tdiu.dataunits())?;

    let out = Zip::from(tdiu.data())
        .and(vp.data())
        .map_collect(|&t, &e| WBGT_TEMP_COEF * (t + to_celsius) + WBGT_VP_COEF * e + WBGT_CONST);

    tdiu.derive(
        out,
        DerivedVariable {
            name: "wbgt",
            units: "Celsius",
            standard_name: "wet_bulb_globe_temperature",
            long_name: "Wet Bulb Globe Temperature",
            history: format!(
                "wbgt = 0.567 * {} + 0.00393 * {} + 3.94",
                tdiu.variable(),
                vp.variable()
            ),
        },
    )
}
