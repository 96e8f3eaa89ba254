// Command-line front end: PCA and reconstruction of a light-curve table.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use log::{error, info};

use lightcurve_pca::phase::{ObservationColumns, DEFAULT_OBSERVATION_COLUMNS};
use lightcurve_pca::report::{
    process_stars, write_parameter_tables, CurveSink, ObservationSource, StarBatch, TableCurveSink,
};
use lightcurve_pca::table::{load_lightcurve_table, load_periods, save_table, save_vector, NumberFormat};
use lightcurve_pca::{
    reconstruct, ComponentCount, LightCurveError, NormalizerConfig, PcaConfig, PcaSolver, Pipeline,
    PipelineConfig, ReconstructionMode, Result, Shifter, StandardizeConfig,
};

const DEFAULT_ORDERS: [i64; 4] = [1, 3, 7, 10];

const USAGE: &str = "\
usage: lightcurve_pca [ORDERS ...] -l FILE [options]

Principal component analysis of a light-curve table and reconstruction of
every curve from a truncated number of components.

positional:
  ORDERS                      numbers of components used for reconstruction
                              (default = 1 3 7 10)

options:
  -p, --processes N           number of stars to output in parallel (default = 1)
  -h, --help                  show this message

input:
  -l, --lightcurves FILE      table of light curves, star ID in the first column
  --observations DIR          directory of raw observations per star
  --observation-extension EXT extension of observation files (default = .dat)
  --usecols TIME MAG ERR      columns used in observation files (default = 0 1 2)
  --periods FILE              table of star periods

output:
  -f, --fmt FMT               number format of output tables (default = %.5f)
  --eigenvalues FILE          write explained variances to FILE
  --eigenvectors FILE         write principal axes to FILE
  --reconstruct-plots DIR     write reconstructed curves to DIR
  --parameter-plots DIR       write PC vs period tables to DIR
  --parameter-range A B       inclusive range of PCs for parameter tables (default = 1 2)
  --linear-period             use the period instead of log10(period) in parameter tables
  --plot-original-lightcurve  include the original curve in reconstruction tables

PCA:
  --n-components N            components to keep; 0 < N < 1 selects a variance fraction
  --method PCA                PCA variant (only PCA is supported)
  --whiten                    scale components to unit variance
  --solver svd|covariance     decomposition routine (default = svd)
  --shifter min|max           normalization anchor (default = min)
  --reconstruction refit|truncate
                              refit per order or truncate one fit (default = refit)
";

#[derive(Debug, Clone, PartialEq)]
struct Args {
    /// Signed so non-positive orders reach the component-count check.
    orders: Vec<i64>,
    processes: usize,
    lightcurves: PathBuf,
    observations: Option<PathBuf>,
    observation_extension: String,
    usecols: ObservationColumns,
    periods: Option<PathBuf>,
    fmt: NumberFormat,
    eigenvalues: Option<PathBuf>,
    eigenvectors: Option<PathBuf>,
    reconstruct_plots: Option<PathBuf>,
    parameter_plots: Option<PathBuf>,
    parameter_range: (usize, usize),
    logscale: bool,
    plot_original_lightcurve: bool,
    pipeline: PipelineConfig,
    mode: ReconstructionMode,
}

fn next_value<I: Iterator<Item = String>>(flag: &str, args: &mut I) -> Result<String> {
    args.next()
        .ok_or_else(|| LightCurveError::configuration(format!("{} expects a value", flag)))
}

fn parse_number<T: FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        LightCurveError::configuration(format!("invalid value '{}' for {}", raw, flag))
    })
}

/// Parses command-line arguments; `Ok(None)` means help was requested.
fn parse_args<I: IntoIterator<Item = String>>(raw: I) -> Result<Option<Args>> {
    let mut args = raw.into_iter();

    let mut orders = Vec::new();
    let mut processes = 1usize;
    let mut lightcurves = None;
    let mut observations = None;
    let mut observation_extension = ".dat".to_string();
    let mut usecols = DEFAULT_OBSERVATION_COLUMNS;
    let mut periods = None;
    let mut fmt = NumberFormat::default();
    let mut eigenvalues = None;
    let mut eigenvectors = None;
    let mut reconstruct_plots = None;
    let mut parameter_plots = None;
    let mut parameter_range = (1, 2);
    let mut logscale = true;
    let mut plot_original_lightcurve = false;
    let mut pca = PcaConfig::default();
    let mut normalizer = NormalizerConfig::default();
    let mut mode = ReconstructionMode::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-p" | "--processes" => {
                processes = parse_number(&arg, &next_value(&arg, &mut args)?)?;
                if processes == 0 {
                    return Err(LightCurveError::configuration("--processes must be at least 1"));
                }
            }
            "-l" | "--lightcurves" => lightcurves = Some(PathBuf::from(next_value(&arg, &mut args)?)),
            "--observations" => observations = Some(PathBuf::from(next_value(&arg, &mut args)?)),
            "--observation-extension" => observation_extension = next_value(&arg, &mut args)?,
            "--usecols" => {
                for col in usecols.iter_mut() {
                    *col = parse_number(&arg, &next_value(&arg, &mut args)?)?;
                }
            }
            "--periods" => periods = Some(PathBuf::from(next_value(&arg, &mut args)?)),
            "-f" | "--fmt" => fmt = next_value(&arg, &mut args)?.parse()?,
            "--eigenvalues" => eigenvalues = Some(PathBuf::from(next_value(&arg, &mut args)?)),
            "--eigenvectors" => eigenvectors = Some(PathBuf::from(next_value(&arg, &mut args)?)),
            "--reconstruct-plots" => {
                reconstruct_plots = Some(PathBuf::from(next_value(&arg, &mut args)?))
            }
            "--parameter-plots" => {
                parameter_plots = Some(PathBuf::from(next_value(&arg, &mut args)?))
            }
            "--parameter-range" => {
                let first = parse_number(&arg, &next_value(&arg, &mut args)?)?;
                let last = parse_number(&arg, &next_value(&arg, &mut args)?)?;
                parameter_range = (first, last);
            }
            "--linear-period" => logscale = false,
            "--plot-original-lightcurve" => plot_original_lightcurve = true,
            "--n-components" => {
                let value: f64 = parse_number(&arg, &next_value(&arg, &mut args)?)?;
                pca.n_components = ComponentCount::from_f64(value)?;
            }
            "--method" => {
                let method = next_value(&arg, &mut args)?;
                if method != "PCA" {
                    return Err(LightCurveError::configuration(format!(
                        "unsupported PCA method '{}'",
                        method
                    )));
                }
            }
            "--whiten" => pca.whiten = true,
            "--solver" => {
                pca.solver = match next_value(&arg, &mut args)?.as_str() {
                    "svd" => PcaSolver::Svd,
                    "covariance" => PcaSolver::Covariance,
                    other => {
                        return Err(LightCurveError::configuration(format!(
                            "unknown solver '{}'",
                            other
                        )))
                    }
                }
            }
            "--shifter" => {
                normalizer = normalizer.with_shifter(next_value(&arg, &mut args)?.parse::<Shifter>()?)
            }
            "--reconstruction" => {
                mode = match next_value(&arg, &mut args)?.as_str() {
                    "refit" => ReconstructionMode::Refit,
                    "truncate" => ReconstructionMode::Truncate,
                    other => {
                        return Err(LightCurveError::configuration(format!(
                            "unknown reconstruction mode '{}'",
                            other
                        )))
                    }
                }
            }
            token => match token.parse::<i64>() {
                Ok(order) => orders.push(order),
                Err(_) if token.starts_with('-') => {
                    return Err(LightCurveError::configuration(format!(
                        "unknown option '{}'",
                        token
                    )))
                }
                Err(_) => {
                    return Err(LightCurveError::configuration(format!(
                        "invalid value '{}' for ORDERS",
                        token
                    )))
                }
            },
        }
    }

    let lightcurves = lightcurves
        .ok_or_else(|| LightCurveError::configuration("--lightcurves is required"))?;
    if orders.is_empty() {
        orders = DEFAULT_ORDERS.to_vec();
    }
    if (observations.is_some() || parameter_plots.is_some()) && periods.is_none() {
        return Err(LightCurveError::configuration(
            "--periods is required with --observations or --parameter-plots",
        ));
    }

    Ok(Some(Args {
        orders,
        processes,
        lightcurves,
        observations,
        observation_extension,
        usecols,
        periods,
        fmt,
        eigenvalues,
        eigenvectors,
        reconstruct_plots,
        parameter_plots,
        parameter_range,
        logscale,
        plot_original_lightcurve,
        pipeline: PipelineConfig {
            normalizer,
            standardize: StandardizeConfig::default(),
            pca,
        },
        mode,
    }))
}

/// Converts command-line orders, rejecting non-positive ones. The upper
/// bound `max` is enforced by `reconstruct`.
fn checked_orders(orders: &[i64], max: usize) -> Result<Vec<usize>> {
    orders
        .iter()
        .map(|&n| match usize::try_from(n) {
            Ok(order) if order >= 1 => Ok(order),
            _ => Err(LightCurveError::InvalidComponentCount { requested: n, max }),
        })
        .collect()
}

fn run(args: Args) -> Result<()> {
    let table = load_lightcurve_table(&args.lightcurves)?;
    info!(
        "Loaded {} light curves with {} phase samples from {}",
        table.n_stars(),
        table.n_samples(),
        args.lightcurves.display()
    );

    let periods = match &args.periods {
        Some(path) => {
            let mapping = load_periods(path)?;
            let ordered = table
                .names
                .iter()
                .map(|name| {
                    mapping
                        .get(name)
                        .copied()
                        .ok_or_else(|| LightCurveError::MissingPeriod { star: name.clone() })
                })
                .collect::<Result<Vec<f64>>>()?;
            Some(ordered)
        }
        None => None,
    };

    let orders = checked_orders(&args.orders, table.n_stars().min(table.n_samples()))?;
    let mut pipeline = Pipeline::new(args.pipeline);
    let result = reconstruct(&mut pipeline, table.magnitudes.view(), &orders, args.mode)?;

    if let Some(path) = &args.eigenvectors {
        save_table(path, result.eigenvectors.view(), &args.fmt)?;
    }
    if let Some(path) = &args.eigenvalues {
        save_vector(path, result.explained_variance.view(), &args.fmt)?;
    }
    if let (Some(dir), Some(periods)) = (&args.parameter_plots, &periods) {
        write_parameter_tables(
            dir,
            &table.names,
            periods,
            result.components.view(),
            args.parameter_range,
            args.logscale,
            &args.fmt,
        )?;
    }

    let sink = args.reconstruct_plots.as_ref().map(|dir| {
        TableCurveSink::new(dir.clone(), args.fmt).with_original(args.plot_original_lightcurve)
    });
    let observations = args.observations.as_ref().map(|dir| ObservationSource {
        dir: dir.clone(),
        extension: args.observation_extension.clone(),
        usecols: args.usecols,
    });
    let batch = StarBatch {
        names: &table.names,
        periods: periods.as_deref(),
        components: result.components.view(),
        lightcurves: table.magnitudes.view(),
        reconstructions: result.reconstructions.view(),
        orders: &orders,
    };
    let lines = process_stars(
        &batch,
        sink.as_ref().map(|s| s as &dyn CurveSink),
        observations.as_ref(),
        &args.fmt,
        args.processes,
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print!("{}", USAGE);
            return;
        }
        Err(e) => {
            eprintln!("lightcurve_pca: {}\n\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("lightcurve_pca: {}", e);
        process::exit(1);
    }
}
