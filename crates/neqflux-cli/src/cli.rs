use crate::utils::parser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "neqflux CLI - Non-equilibrium power, force and torque transfer between bodies at different temperatures.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate the flux spectral density at a list of frequencies.
    Spectrum(SpectrumArgs),
    /// Integrate the flux over frequency.
    Integrate(IntegrateArgs),
}

/// Arguments shared by every flux run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the geometry description in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub geometry: PathBuf,

    /// Path to a run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base name of every output file. Defaults to the geometry file name without extension.
    #[arg(short = 'o', long, value_name = "PATH")]
    pub file_base: Option<PathBuf>,

    /// Transform list; each `TRANS tag ...` line is one geometric configuration.
    #[arg(short, long, value_name = "PATH")]
    pub transforms: Option<PathBuf>,

    // --- Physics Overrides ---
    /// Quantity to compute (power, x-force, ..., z-torque). Can be used multiple times.
    #[arg(short = 'Q', long = "quantity", value_name = "NAME")]
    pub quantities: Vec<String>,

    /// Temperature of one object in Kelvin. Can be used multiple times.
    #[arg(short = 'T', long = "temperature", value_name = "LABEL=KELVIN", value_parser = parser::parse_temperature)]
    pub temperatures: Vec<(String, f64)>,

    /// Temperature of the environment in Kelvin.
    #[arg(long, value_name = "KELVIN")]
    pub environment_temperature: Option<f64>,

    /// Report the flux with the self term of each source object removed.
    #[arg(long)]
    pub subtract_self_term: bool,

    /// Reuse flux records from earlier runs with the same file base.
    #[arg(long)]
    pub use_existing_data: bool,

    // --- Surface Overrides ---
    /// Cubature rule file (`x y z nx ny nz w` rows) used instead of a bounding sphere.
    #[arg(long, value_name = "PATH", conflicts_with_all = ["sphere_radius", "sphere_points"])]
    pub cubature_file: Option<PathBuf>,

    /// Radius of the bounding sphere around each destination object.
    #[arg(long, value_name = "FLOAT")]
    pub sphere_radius: Option<f64>,

    /// Minimum number of cubature points on the bounding sphere.
    #[arg(long, value_name = "INT")]
    pub sphere_points: Option<usize>,

    /// Torque centre in each destination's body frame.
    #[arg(long, value_name = "X,Y,Z", value_parser = parser::parse_point)]
    pub torque_center: Option<[f64; 3]>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S integration.rel-tol=1e-3
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `spectrum` subcommand.
#[derive(Args, Debug)]
pub struct SpectrumArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Angular frequencies in units of 3e14 rad/s, comma separated.
    #[arg(long, value_name = "OMEGA", value_delimiter = ',', conflicts_with = "omega_file")]
    pub omega: Vec<f64>,

    /// File listing one angular frequency per line.
    #[arg(long, value_name = "PATH")]
    pub omega_file: Option<PathBuf>,
}

/// Arguments for the `integrate` subcommand.
#[derive(Args, Debug)]
pub struct IntegrateArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Lower integration limit.
    #[arg(long, value_name = "OMEGA")]
    pub omega_min: Option<f64>,

    /// Upper integration limit; the adaptive rule integrates to infinity without it.
    #[arg(long, value_name = "OMEGA")]
    pub omega_max: Option<f64>,

    /// Absolute error tolerance of the adaptive rule.
    #[arg(long, value_name = "FLOAT")]
    pub abs_tol: Option<f64>,

    /// Relative error tolerance of the adaptive rule.
    #[arg(long, value_name = "FLOAT")]
    pub rel_tol: Option<f64>,

    /// Maximum number of flux evaluations for the adaptive rule.
    #[arg(long, value_name = "INT")]
    pub max_evals: Option<usize>,

    /// Use the trapezoid/Simpson rule with this many subintervals instead of the adaptive rule.
    #[arg(long, value_name = "INT")]
    pub intervals: Option<usize>,
}
