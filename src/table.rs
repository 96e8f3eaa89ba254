//! Whitespace-delimited numeric tables.
//!
//! Readers for the light-curve table, the periods file and observation
//! files, plus printf-style number formatting for every table this crate
//! writes. All readers skip blank lines and lines starting with `#`, and
//! report 1-based line numbers in `MalformedTable` errors.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{LightCurveError, Result};

/// Star names and their phased light curves.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurveTable {
    /// Star identifiers in file order.
    pub names: Vec<String>,
    /// Magnitudes, one row per star. Shape: (n_stars, n_phase_samples)
    pub magnitudes: Array2<f64>,
}

impl LightCurveTable {
    pub fn n_stars(&self) -> usize {
        self.names.len()
    }

    pub fn n_samples(&self) -> usize {
        self.magnitudes.ncols()
    }
}

/// Yields `(line_number, trimmed_line)` for every data line.
fn data_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(Ok((idx + 1, trimmed.to_string())))
                }
            }
            Err(e) => Some(Err(LightCurveError::from(e))),
        })
}

fn parse_value(line: usize, token: &str) -> Result<f64> {
    token.parse::<f64>().map_err(|_| {
        LightCurveError::malformed_table(line, format!("cannot parse '{}' as a number", token))
    })
}

/// Reads a `<star_id> <m_1> ... <m_m>` table.
///
/// # Errors
/// `MalformedTable` if a row has no magnitudes, a different column count than
/// the first row, or a value that is not a number. `InvalidInput` if the
/// table holds no rows at all.
pub fn read_lightcurve_table<R: BufRead>(reader: R) -> Result<LightCurveTable> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut n_cols: Option<usize> = None;

    for entry in data_lines(reader) {
        let (line_no, line) = entry?;
        let mut tokens = line.split_whitespace();
        let name = match tokens.next() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let row = tokens
            .map(|t| parse_value(line_no, t))
            .collect::<Result<Vec<f64>>>()?;

        if row.is_empty() {
            return Err(LightCurveError::malformed_table(
                line_no,
                format!("star '{}' has no magnitudes", name),
            ));
        }
        match n_cols {
            None => n_cols = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(LightCurveError::malformed_table(
                    line_no,
                    format!("expected {} magnitudes, found {}", expected, row.len()),
                ));
            }
            Some(_) => {}
        }
        names.push(name);
        values.extend(row);
    }

    let n_cols = n_cols.ok_or_else(|| LightCurveError::invalid_input("light-curve table is empty"))?;
    let magnitudes = Array2::from_shape_vec((names.len(), n_cols), values)
        .map_err(|e| LightCurveError::invalid_input(e.to_string()))?;
    debug!(
        "Read light-curve table: {} stars x {} phase samples",
        names.len(),
        n_cols
    );
    Ok(LightCurveTable { names, magnitudes })
}

/// Opens and reads a light-curve table from `path`.
pub fn load_lightcurve_table(path: impl AsRef<Path>) -> Result<LightCurveTable> {
    let file = File::open(path.as_ref())?;
    read_lightcurve_table(BufReader::new(file))
}

/// Reads a `<star_id> <period>` mapping. Lines without whitespace are ignored.
///
/// # Errors
/// `MalformedTable` if a line has more than two fields or a period that is
/// not a positive number.
pub fn read_periods<R: BufRead>(reader: R) -> Result<HashMap<String, f64>> {
    let mut periods = HashMap::new();
    for entry in data_lines(reader) {
        let (line_no, line) = entry?;
        if !line.contains(char::is_whitespace) {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(LightCurveError::malformed_table(
                line_no,
                format!("expected '<star> <period>', found {} fields", fields.len()),
            ));
        }
        let period = parse_value(line_no, fields[1])?;
        if !(period.is_finite() && period > 0.0) {
            return Err(LightCurveError::malformed_table(
                line_no,
                format!("period must be positive, got {}", period),
            ));
        }
        if periods.insert(fields[0].to_string(), period).is_some() {
            warn!("Duplicate period for star '{}' on line {}", fields[0], line_no);
        }
    }
    Ok(periods)
}

/// Opens and reads a periods file from `path`.
pub fn load_periods(path: impl AsRef<Path>) -> Result<HashMap<String, f64>> {
    let file = File::open(path.as_ref())?;
    read_periods(BufReader::new(file))
}

/// Reads the selected columns of a purely numeric table.
///
/// Output column `j` holds input column `usecols[j]`.
pub fn read_columns<R: BufRead>(reader: R, usecols: &[usize]) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut n_rows = 0;
    for entry in data_lines(reader) {
        let (line_no, line) = entry?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        for &col in usecols {
            let token = tokens.get(col).ok_or_else(|| {
                LightCurveError::malformed_table(
                    line_no,
                    format!("column {} requested but only {} present", col, tokens.len()),
                )
            })?;
            values.push(parse_value(line_no, token)?);
        }
        n_rows += 1;
    }
    Array2::from_shape_vec((n_rows, usecols.len()), values)
        .map_err(|e| LightCurveError::invalid_input(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notation {
    Fixed,
    Exponent,
}

/// A printf-style float format: `%.Nf`, `%.Ne`, `%f` or `%e`.
///
/// Exponents are written the C way (`1.50000e+00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    precision: usize,
    notation: Notation,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            precision: 5,
            notation: Notation::Fixed,
        }
    }
}

impl FromStr for NumberFormat {
    type Err = LightCurveError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = || {
            LightCurveError::configuration(format!(
                "unsupported number format '{}' (expected %.Nf, %.Ne, %f or %e)",
                spec
            ))
        };
        let body = spec.strip_prefix('%').ok_or_else(invalid)?;
        let conv = body.chars().last().ok_or_else(invalid)?;
        let precision_part = &body[..body.len() - conv.len_utf8()];
        let notation = match conv {
            'f' => Notation::Fixed,
            'e' => Notation::Exponent,
            _ => return Err(invalid()),
        };
        let precision = if precision_part.is_empty() {
            6
        } else {
            precision_part
                .strip_prefix('.')
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(invalid)?
        };
        Ok(Self {
            precision,
            notation,
        })
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conv = match self.notation {
            Notation::Fixed => 'f',
            Notation::Exponent => 'e',
        };
        write!(f, "%.{}{}", self.precision, conv)
    }
}

impl NumberFormat {
    pub fn format(&self, value: f64) -> String {
        match self.notation {
            Notation::Fixed => format!("{:.*}", self.precision, value),
            Notation::Exponent => {
                let raw = format!("{:.*e}", self.precision, value);
                match raw.split_once('e') {
                    Some((mantissa, exp)) => {
                        let exp: i32 = exp.parse().unwrap_or(0);
                        let sign = if exp < 0 { '-' } else { '+' };
                        format!("{}e{}{:02}", mantissa, sign, exp.abs())
                    }
                    // inf / NaN
                    None => raw,
                }
            }
        }
    }

    /// Formats `values` separated by single spaces.
    pub fn format_row<'a>(&self, values: impl IntoIterator<Item = &'a f64>) -> String {
        values
            .into_iter()
            .map(|v| self.format(*v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Writes one formatted row per matrix row.
pub fn write_table<W: Write>(writer: &mut W, matrix: ArrayView2<f64>, fmt: &NumberFormat) -> Result<()> {
    for row in matrix.rows() {
        writeln!(writer, "{}", fmt.format_row(row.iter()))?;
    }
    Ok(())
}

/// Writes one formatted value per line.
pub fn write_vector<W: Write>(writer: &mut W, values: ArrayView1<f64>, fmt: &NumberFormat) -> Result<()> {
    for v in values.iter() {
        writeln!(writer, "{}", fmt.format(*v))?;
    }
    Ok(())
}

/// Creates `path` and writes `matrix` into it.
pub fn save_table(path: impl AsRef<Path>, matrix: ArrayView2<f64>, fmt: &NumberFormat) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_table(&mut writer, matrix, fmt)?;
    writer.flush()?;
    Ok(())
}

/// Creates `path` and writes `values` into it, one per line.
pub fn save_vector(path: impl AsRef<Path>, values: ArrayView1<f64>, fmt: &NumberFormat) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_vector(&mut writer, values, fmt)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Cursor;

    #[test]
    fn test_reads_names_and_magnitudes() {
        let text = "# id m1 m2 m3\nstar1 1 2 3\n\nstar2  4\t5 6\n";
        let table = read_lightcurve_table(Cursor::new(text)).unwrap();
        assert_eq!(table.names, vec!["star1", "star2"]);
        assert_eq!(table.magnitudes, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(table.n_stars(), 2);
        assert_eq!(table.n_samples(), 3);
    }

    #[test]
    fn test_inconsistent_row_reports_line() {
        let text = "a 1 2 3\nb 1 2\n";
        match read_lightcurve_table(Cursor::new(text)) {
            Err(LightCurveError::MalformedTable { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MalformedTable, got {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_value_and_empty_table() {
        assert!(matches!(
            read_lightcurve_table(Cursor::new("a 1 x 3\n")),
            Err(LightCurveError::MalformedTable { line: 1, .. })
        ));
        assert!(matches!(
            read_lightcurve_table(Cursor::new("\n# nothing\n")),
            Err(LightCurveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_periods_skip_lines_without_whitespace() {
        let text = "header\nstar1 0.5\nstar2\t1.25\n";
        let periods = read_periods(Cursor::new(text)).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods["star1"], 0.5);
        assert_eq!(periods["star2"], 1.25);

        assert!(read_periods(Cursor::new("star1 -2.0\n")).is_err());
        assert!(read_periods(Cursor::new("star1 1.0 extra\n")).is_err());
    }

    #[test]
    fn test_read_columns_selects_and_reorders() {
        let text = "0.1 12.0 0.01 99\n0.2 12.5 0.02 98\n";
        let data = read_columns(Cursor::new(text), &[0, 1, 2]).unwrap();
        assert_eq!(data, array![[0.1, 12.0, 0.01], [0.2, 12.5, 0.02]]);

        let swapped = read_columns(Cursor::new(text), &[3, 0]).unwrap();
        assert_eq!(swapped.row(0).to_vec(), vec![99.0, 0.1]);

        assert!(read_columns(Cursor::new(text), &[4]).is_err());
    }

    #[test]
    fn test_number_formats() {
        let fixed: NumberFormat = "%.5f".parse().unwrap();
        assert_eq!(fixed.format(1.0 / 3.0), "0.33333");
        assert_eq!(fixed, NumberFormat::default());

        let plain: NumberFormat = "%f".parse().unwrap();
        assert_eq!(plain.format(2.5), "2.500000");

        let exp: NumberFormat = "%.3e".parse().unwrap();
        assert_eq!(exp.format(1234.4), "1.234e+03");
        assert_eq!(exp.format(0.00015), "1.500e-04");
        assert_eq!(exp.to_string(), "%.3e");

        for bad in ["%.5g", "5f", "%.xf", "%"] {
            assert!(matches!(
                bad.parse::<NumberFormat>(),
                Err(LightCurveError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_write_table_and_vector() {
        let fmt = NumberFormat::default();
        let mut buf = Vec::new();
        write_table(&mut buf, array![[1.0, -0.5], [0.25, 2.0]].view(), &fmt).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "1.00000 -0.50000\n0.25000 2.00000\n"
        );

        let mut buf = Vec::new();
        write_vector(&mut buf, array![3.0, 1.5].view(), &fmt).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "3.00000\n1.50000\n");
    }
}
