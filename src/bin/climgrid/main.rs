use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use climgrid::{calculators, config::ExportConfig, logging::init_logging, ClimGrid, ClimGridError};
use error_stack::ResultExt;

fn main() -> ExitCode {
    let clargs = Cli::parse();
    if let Err(e) = init_logging(clargs.verbosity.log_level_filter()) {
        eprintln!("WARNING: {e}");
    }
    match driver(clargs) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("An error occurred:\n{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn driver(clargs: Cli) -> error_stack::Result<(), ClimGridError> {
    let config = clargs
        .config
        .as_deref()
        .map(ExportConfig::from_toml_file)
        .transpose()?;

    let grid = match clargs.cmd {
        Command::Convert(args) => climgrid::import(&args.file, &args.variable, None)?,
        Command::SurfacePressure(args) => {
            let psl = read(&args.inputs.psl, "psl")?;
            let orog = read(&args.inputs.orog, "orog")?;
            let tas = read(&args.inputs.tas, "tas")?;
            calculators::approx_surfacepressure(&psl, &orog, &tas)?
        }
        Command::VaporPressure(args) => {
            let huss = read(&args.huss, "huss")?;
            match (args.ps, args.sealevel) {
                (Some(ps), _) => calculators::vaporpressure(&huss, &read(&ps, "ps")?)?,
                (None, Some(sl)) => {
                    let psl = read(&sl.psl, "psl")?;
                    let orog = read(&sl.orog, "orog")?;
                    let tas = read(&sl.tas, "tas")?;
                    calculators::vaporpressure_from_sealevel(&huss, &psl, &orog, &tas)?
                }
                (None, None) => {
                    return Err(ClimGridError::Config(
                        "either --ps or all of --psl, --orog and --tas are required".to_string(),
                    )
                    .into())
                }
            }
        }
        Command::Wbgt(args) => {
            let tdiu = read(&args.tdiu, "tdiu")?;
            let vp = read(&args.vp, "vp")?;
            calculators::wbgt(&tdiu, &vp)?
        }
    };

    let grid = match config {
        Some(cfg) => cfg
            .apply(&grid)
            .attach_printable("applying the attribute overrides from --config")?,
        None => grid,
    };
    let written = climgrid::export(&grid, &clargs.output)?;
    log::info!("Wrote {}", written.display());
    Ok(())
}

fn read(path: &Path, variable: &str) -> error_stack::Result<ClimGrid, ClimGridError> {
    climgrid::import(path, variable, None)
        .attach_printable_lazy(|| format!("reading the '{variable}' input"))
}

/// Derive climate indicators from CMIP/CORDEX daily netCDF files
#[derive(Debug, clap::Parser)]
struct Cli {
    #[clap(subcommand)]
    cmd: Command,

    /// Output netCDF file. ".nc" is appended if it has no netCDF extension.
    #[clap(short, long, global = true, default_value = "climgrid_out.nc")]
    output: PathBuf,

    /// TOML file of global and variable attributes to set on the output.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Read one variable and write it back out (kelvin becomes Celsius,
    /// precipitation rates become mm/day).
    Convert(ConvertCli),

    /// Approximate surface pressure from sea level pressure.
    SurfacePressure(SurfacePressureCli),

    /// Water vapor pressure from specific humidity.
    VaporPressure(VaporPressureCli),

    /// Simplified wet bulb globe temperature.
    Wbgt(WbgtCli),
}

#[derive(Debug, clap::Args)]
struct ConvertCli {
    file: PathBuf,
    variable: String,
}

#[derive(Debug, clap::Args)]
struct SurfacePressureCli {
    #[clap(flatten)]
    inputs: SeaLevelInputs,
}

/// Inputs needed to estimate surface pressure
#[derive(Debug, clap::Args)]
struct SeaLevelInputs {
    /// File containing sea level pressure (psl)
    #[clap(long)]
    psl: PathBuf,
    /// File containing surface altitude (orog). It is read like the other
    /// inputs, so it must be a daily (time, lat, lon) field on the same grid
    /// and time axis; 2-D fixed fields without a time dimension are rejected
    /// and must first be repeated along the time axis of the other inputs.
    #[clap(long)]
    orog: PathBuf,
    /// File containing near-surface air temperature (tas)
    #[clap(long)]
    tas: PathBuf,
}

#[derive(Debug, clap::Args)]
struct VaporPressureCli {
    /// File containing specific humidity (huss)
    #[clap(long)]
    huss: PathBuf,

    /// File containing surface pressure (ps)
    #[clap(long, conflicts_with_all = ["psl", "orog", "tas"])]
    ps: Option<PathBuf>,

    #[clap(flatten)]
    sealevel: Option<SeaLevelInputs>,
}

#[derive(Debug, clap::Args)]
struct WbgtCli {
    /// File containing diurnal temperature (tdiu)
    #[clap(long)]
    tdiu: PathBuf,
    /// File containing vapor pressure (vp)
    #[clap(long)]
    vp: PathBuf,
}
