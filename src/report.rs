//! Per-star output and parameter tables.
//!
//! The numeric results are final before anything here runs; a failing sink
//! only aborts output, never changes what was computed.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;

use crate::error::{LightCurveError, Result};
use crate::phase::{load_observations, phase_grid, ObservationColumns};
use crate::table::NumberFormat;

/// Creates `path` (and its parents) unless it already is a directory.
///
/// # Errors
/// Propagates creation failures, including `path` existing as a file.
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(_) if path.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Everything a sink gets to see for one star.
#[derive(Debug, Clone)]
pub struct CurveRecord<'a> {
    pub name: &'a str,
    pub period: Option<f64>,
    /// Phase of each light-curve sample, in [0, 1).
    pub phases: ArrayView1<'a, f64>,
    pub original: ArrayView1<'a, f64>,
    pub orders: &'a [usize],
    /// One reconstructed curve per entry of `orders`. Shape: (n_orders, n_samples)
    pub reconstructions: ArrayView2<'a, f64>,
    /// Folded observations as (phase, mag, err) rows, when available.
    pub observations: Option<Array2<f64>>,
}

/// Destination for per-star curves.
pub trait CurveSink: Sync {
    fn write(&self, record: &CurveRecord<'_>) -> Result<()>;
}

/// Writes each star as flat tables inside one directory.
///
/// `<star>.dat` holds `phase [original] rec_1 ... rec_n` over two cycles
/// (phase in [0, 2)), preceded by a `# <star> P = <period>` line when the
/// period is known; `<star>.obs.dat` holds `phase mag err` over two cycles
/// when observations are attached.
#[derive(Debug, Clone)]
pub struct TableCurveSink {
    dir: PathBuf,
    fmt: NumberFormat,
    include_original: bool,
}

impl TableCurveSink {
    pub fn new(dir: impl Into<PathBuf>, fmt: NumberFormat) -> Self {
        Self {
            dir: dir.into(),
            fmt,
            include_original: true,
        }
    }

    #[must_use]
    pub fn with_original(mut self, include_original: bool) -> Self {
        self.include_original = include_original;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_curves(&self, record: &CurveRecord<'_>) -> Result<()> {
        let path = self.dir.join(format!("{}.dat", record.name));
        let mut out = BufWriter::new(File::create(&path)?);

        if let Some(period) = record.period {
            writeln!(out, "# {} P = {}", record.name, self.fmt.format(period))?;
        }
        let mut header = vec!["phase".to_string()];
        if self.include_original {
            header.push("original".to_string());
        }
        header.extend(record.orders.iter().map(|n| format!("rec_{}", n)));
        writeln!(out, "# {}", header.join(" "))?;

        for cycle in 0..2 {
            for (j, phase) in record.phases.iter().enumerate() {
                let mut row = vec![phase + cycle as f64];
                if self.include_original {
                    row.push(record.original[j]);
                }
                row.extend(record.reconstructions.column(j).iter());
                writeln!(out, "{}", self.fmt.format_row(row.iter()))?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn write_observations(&self, name: &str, observations: &Array2<f64>) -> Result<()> {
        let path = self.dir.join(format!("{}.obs.dat", name));
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "# phase mag err")?;
        for cycle in 0..2 {
            for row in observations.rows() {
                let shifted = [row[0] + cycle as f64, row[1], row[2]];
                writeln!(out, "{}", self.fmt.format_row(shifted.iter()))?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

impl CurveSink for TableCurveSink {
    fn write(&self, record: &CurveRecord<'_>) -> Result<()> {
        ensure_dir(&self.dir)?;
        self.write_curves(record)?;
        if let Some(obs) = &record.observations {
            self.write_observations(record.name, obs)?;
        }
        Ok(())
    }
}

/// Where and how to find a star's raw observations.
#[derive(Debug, Clone)]
pub struct ObservationSource {
    pub dir: PathBuf,
    pub extension: String,
    pub usecols: ObservationColumns,
}

/// Per-star inputs of the output fan-out, all indexed by star.
#[derive(Debug, Clone, Copy)]
pub struct StarBatch<'a> {
    pub names: &'a [String],
    pub periods: Option<&'a [f64]>,
    /// Shape: (n_stars, k)
    pub components: ArrayView2<'a, f64>,
    /// Shape: (n_stars, n_samples)
    pub lightcurves: ArrayView2<'a, f64>,
    /// Shape: (n_stars, n_orders, n_samples)
    pub reconstructions: ArrayView3<'a, f64>,
    pub orders: &'a [usize],
}

/// The stdout line for one star: its name followed by its components.
pub fn star_line(name: &str, components: ArrayView1<f64>, fmt: &NumberFormat) -> String {
    if components.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, fmt.format_row(components.iter()))
    }
}

/// Runs the per-star output tasks on a pool of `processes` threads.
///
/// Each task loads the star's observations (when `observations` is set),
/// hands the record to `sink` (when set) and returns the star's component
/// line. Lines come back in star order.
///
/// # Errors
/// A failed task aborts the batch; its error is wrapped in
/// `LightCurveError::Sink` naming the star.
pub fn process_stars(
    batch: &StarBatch<'_>,
    sink: Option<&dyn CurveSink>,
    observations: Option<&ObservationSource>,
    fmt: &NumberFormat,
    processes: usize,
) -> Result<Vec<String>> {
    let n_stars = batch.names.len();
    for (context, actual) in [
        ("StarBatch components", batch.components.nrows()),
        ("StarBatch lightcurves", batch.lightcurves.nrows()),
        ("StarBatch reconstructions", batch.reconstructions.len_of(Axis(0))),
    ] {
        if actual != n_stars {
            return Err(LightCurveError::ShapeMismatch {
                context,
                expected: n_stars,
                actual,
            });
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(processes.max(1))
        .build()
        .map_err(|e| LightCurveError::configuration(format!("cannot build worker pool: {}", e)))?;
    let phases = phase_grid(batch.lightcurves.ncols());
    info!(
        "Processing {} stars on {} worker thread(s)",
        n_stars,
        pool.current_num_threads()
    );

    pool.install(|| {
        (0..n_stars)
            .into_par_iter()
            .map(|i| -> Result<String> {
                let name = batch.names[i].as_str();
                process_star(batch, i, &phases, sink, observations)
                    .map_err(|e| LightCurveError::sink(name, e))?;
                Ok(star_line(name, batch.components.row(i), fmt))
            })
            .collect::<Result<Vec<String>>>()
    })
}

fn process_star(
    batch: &StarBatch<'_>,
    i: usize,
    phases: &Array1<f64>,
    sink: Option<&dyn CurveSink>,
    observations: Option<&ObservationSource>,
) -> Result<()> {
    let name = batch.names[i].as_str();
    let period = batch.periods.map(|p| p[i]);

    let sink = match sink {
        Some(sink) => sink,
        None => return Ok(()),
    };

    let observed = match observations {
        Some(source) => {
            let period = period.ok_or_else(|| LightCurveError::MissingPeriod {
                star: name.to_string(),
            })?;
            Some(load_observations(
                &source.dir,
                name,
                &source.extension,
                source.usecols,
                period,
            )?)
        }
        None => None,
    };

    let record = CurveRecord {
        name,
        period,
        phases: phases.view(),
        original: batch.lightcurves.row(i),
        orders: batch.orders,
        reconstructions: batch.reconstructions.index_axis(Axis(0), i),
        observations: observed,
    };
    sink.write(&record)?;
    debug!("Wrote curves for {}", name);
    Ok(())
}

/// File name of the parameter table for principal component `p`.
pub fn parameter_table_name(p: usize, logscale: bool) -> String {
    let title = format!("PC{} vs {}", p, if logscale { "log(P)" } else { "Period" });
    format!("{}.dat", title.replace(' ', "_"))
}

/// Writes one `<star> <x> <pc>` table per component index in `range` (inclusive).
///
/// `x` is `log10(period)` when `logscale` is set, the period otherwise.
/// Component indices address columns of `components` directly.
///
/// # Errors
/// `Configuration` if the range is reversed or reaches past the last
/// component; I/O errors otherwise.
pub fn write_parameter_tables(
    dir: &Path,
    names: &[String],
    periods: &[f64],
    components: ArrayView2<f64>,
    range: (usize, usize),
    logscale: bool,
    fmt: &NumberFormat,
) -> Result<Vec<PathBuf>> {
    let (first, last) = range;
    if first > last || last >= components.ncols() {
        return Err(LightCurveError::configuration(format!(
            "parameter range {}..={} is outside the {} available components",
            first,
            last,
            components.ncols()
        )));
    }
    if names.len() != periods.len() || names.len() != components.nrows() {
        return Err(LightCurveError::ShapeMismatch {
            context: "parameter table stars",
            expected: names.len(),
            actual: periods.len(),
        });
    }

    ensure_dir(dir)?;
    let mut written = Vec::with_capacity(last - first + 1);
    for p in first..=last {
        let path = dir.join(parameter_table_name(p, logscale));
        let mut out = BufWriter::new(File::create(&path)?);
        for ((name, &period), value) in names.iter().zip(periods).zip(components.column(p)) {
            let x = if logscale { period.log10() } else { period };
            writeln!(out, "{} {}", name, fmt.format_row([x, *value].iter()))?;
        }
        out.flush()?;
        debug!("Wrote parameter table {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use std::sync::Mutex;

    #[test]
    fn test_ensure_dir_tolerates_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        let file_path = tmp.path().join("plain");
        File::create(&file_path).unwrap();
        assert!(ensure_dir(&file_path).is_err());
    }

    #[test]
    fn test_star_line() {
        let fmt = NumberFormat::default();
        assert_eq!(star_line("s1", array![1.0, -2.0].view(), &fmt), "s1 1.00000 -2.00000");
    }

    #[test]
    fn test_parameter_table_names() {
        assert_eq!(parameter_table_name(1, true), "PC1_vs_log(P).dat");
        assert_eq!(parameter_table_name(2, false), "PC2_vs_Period.dat");
    }

    struct Recording {
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl CurveSink for Recording {
        fn write(&self, record: &CurveRecord<'_>) -> Result<()> {
            if Some(record.name) == self.fail_on {
                return Err(LightCurveError::invalid_input("boom"));
            }
            assert_eq!(record.reconstructions.nrows(), record.orders.len());
            self.seen.lock().unwrap().push(record.name.to_string());
            Ok(())
        }
    }

    fn batch_parts(n: usize) -> (Vec<String>, Array2<f64>, Array2<f64>, Array3<f64>) {
        let names = (0..n).map(|i| format!("star{}", i)).collect();
        let comps = Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f64);
        let curves = Array2::from_shape_fn((n, 4), |(i, j)| (i + j) as f64);
        let recs = Array3::from_shape_fn((n, 1, 4), |(i, _, j)| (i + j) as f64);
        (names, comps, curves, recs)
    }

    #[test]
    fn test_process_stars_keeps_star_order() {
        let (names, comps, curves, recs) = batch_parts(16);
        let batch = StarBatch {
            names: &names,
            periods: None,
            components: comps.view(),
            lightcurves: curves.view(),
            reconstructions: recs.view(),
            orders: &[1],
        };
        let sink = Recording {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        };
        let fmt: NumberFormat = "%.1f".parse().unwrap();
        let lines = process_stars(&batch, Some(&sink), None, &fmt, 4).unwrap();

        assert_eq!(lines.len(), 16);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line, &format!("star{} {}.0 {}.0", i, i * 10, i * 10 + 1));
        }
        assert_eq!(sink.seen.lock().unwrap().len(), 16);
    }

    #[test]
    fn test_process_stars_names_mismatched_input() {
        let (names, comps, curves, _) = batch_parts(3);
        let (_, _, _, short_recs) = batch_parts(2);
        let batch = StarBatch {
            names: &names,
            periods: None,
            components: comps.view(),
            lightcurves: curves.view(),
            reconstructions: short_recs.view(),
            orders: &[1],
        };
        match process_stars(&batch, None, None, &NumberFormat::default(), 1) {
            Err(LightCurveError::ShapeMismatch {
                context,
                expected,
                actual,
            }) => {
                assert_eq!(context, "StarBatch reconstructions");
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_table_sink_writes_period_line() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = TableCurveSink::new(tmp.path(), "%.2f".parse().unwrap()).with_original(false);
        let phases = phase_grid(2);
        let recs = array![[1.0, 2.0]];
        let mut record = CurveRecord {
            name: "rr",
            period: Some(0.5667),
            phases: phases.view(),
            original: recs.row(0),
            orders: &[1],
            reconstructions: recs.view(),
            observations: None,
        };
        sink.write(&record).unwrap();
        let text = fs::read_to_string(tmp.path().join("rr.dat")).unwrap();
        let header: Vec<&str> = text.lines().take(2).collect();
        assert_eq!(header, vec!["# rr P = 0.57", "# phase rec_1"]);

        record.period = None;
        sink.write(&record).unwrap();
        let text = fs::read_to_string(tmp.path().join("rr.dat")).unwrap();
        assert_eq!(text.lines().next().unwrap(), "# phase rec_1");
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_process_stars_reports_failing_star() {
        let (names, comps, curves, recs) = batch_parts(3);
        let batch = StarBatch {
            names: &names,
            periods: None,
            components: comps.view(),
            lightcurves: curves.view(),
            reconstructions: recs.view(),
            orders: &[1],
        };
        let sink = Recording {
            seen: Mutex::new(Vec::new()),
            fail_on: Some("star1"),
        };
        match process_stars(&batch, Some(&sink), None, &NumberFormat::default(), 2) {
            Err(LightCurveError::Sink { star, .. }) => assert_eq!(star, "star1"),
            other => panic!("expected Sink error, got {:?}", other),
        }
    }
}
