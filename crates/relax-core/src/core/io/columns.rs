//! Whitespace separated column files holding per-spin sequence and
//! relaxation data.
//!
//! Lines starting with `#` are comments. Column numbers count from 1.

use crate::core::error::{RelaxError, Result};
use crate::core::models::mol_res_spin::generate_spin_id;
use crate::core::models::pipe::{PipeContainer, RiType};
use crate::core::models::selection::Selection;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ColumnFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Column file error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: u64,
        kind: ColumnParseErrorKind,
    },
}

#[derive(Debug, Error)]
pub enum ColumnParseErrorKind {
    #[error("Invalid integer in column {column} (value: '{value}')")]
    InvalidInt { column: usize, value: String },
    #[error("Invalid float in column {column} (value: '{value}')")]
    InvalidFloat { column: usize, value: String },
}

/// The column numbers of each field. `None` leaves the field unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub mol_name: Option<usize>,
    pub res_num: Option<usize>,
    pub res_name: Option<usize>,
    pub spin_num: Option<usize>,
    pub spin_name: Option<usize>,
    pub data: Option<usize>,
    pub error: Option<usize>,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            mol_name: Some(1),
            res_num: Some(2),
            res_name: Some(3),
            spin_num: Some(4),
            spin_name: Some(5),
            data: Some(6),
            error: Some(7),
        }
    }
}

impl ColumnSpec {
    /// The default layout without the value and error columns.
    pub fn sequence() -> Self {
        Self {
            data: None,
            error: None,
            ..Self::default()
        }
    }

    fn max_column(&self) -> usize {
        [
            self.mol_name,
            self.res_num,
            self.res_name,
            self.spin_num,
            self.spin_name,
            self.data,
            self.error,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }
}

/// One data line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpinRow {
    pub mol_name: Option<String>,
    pub res_num: Option<i64>,
    pub res_name: Option<String>,
    pub spin_num: Option<i64>,
    pub spin_name: Option<String>,
    pub value: Option<f64>,
    pub error: Option<f64>,
}

fn is_missing(text: &str) -> bool {
    text == "None" || text == "-"
}

fn text_field(fields: &[&str], column: Option<usize>) -> Option<String> {
    let text = fields.get(column?.checked_sub(1)?)?;
    (!is_missing(text)).then(|| text.to_string())
}

fn int_field(fields: &[&str], column: Option<usize>, line: u64) -> std::result::Result<Option<i64>, ColumnFileError> {
    let Some(text) = text_field(fields, column) else {
        return Ok(None);
    };
    text.parse().map(Some).map_err(|_| ColumnFileError::Parse {
        line,
        kind: ColumnParseErrorKind::InvalidInt {
            column: column.unwrap_or_default(),
            value: text,
        },
    })
}

fn float_field(fields: &[&str], column: Option<usize>, line: u64) -> std::result::Result<Option<f64>, ColumnFileError> {
    let Some(text) = text_field(fields, column) else {
        return Ok(None);
    };
    text.parse().map(Some).map_err(|_| ColumnFileError::Parse {
        line,
        kind: ColumnParseErrorKind::InvalidFloat {
            column: column.unwrap_or_default(),
            value: text,
        },
    })
}

/// Reads every data line. Lines with fewer columns than the layout needs are
/// skipped with a warning.
pub fn read_columns(mut reader: impl Read, cols: &ColumnSpec) -> std::result::Result<Vec<SpinRow>, ColumnFileError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let text = text.replace('\t', " ");

    let mut csv = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let needed = cols.max_column();
    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while csv.read_record(&mut record)? {
        let line = record.position().map_or(0, |p| p.line());
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < needed {
            warn!(line, "Skipping a line with only {} of {needed} columns.", fields.len());
            continue;
        }
        rows.push(SpinRow {
            mol_name: text_field(&fields, cols.mol_name),
            res_num: int_field(&fields, cols.res_num, line)?,
            res_name: text_field(&fields, cols.res_name),
            spin_num: int_field(&fields, cols.spin_num, line)?,
            spin_name: text_field(&fields, cols.spin_name),
            value: float_field(&fields, cols.data, line)?,
            error: float_field(&fields, cols.error, line)?,
        });
    }
    Ok(rows)
}

fn read_file(path: &Path, cols: &ColumnSpec) -> Result<Vec<SpinRow>> {
    let file = fs::File::open(path).map_err(|e| RelaxError::file(path, e))?;
    Ok(read_columns(file, cols)?)
}

/// Builds the molecule, residue and spin sequence of an empty pipe from a
/// column file. Returns the number of spins read.
pub fn read_sequence(pipe: &mut PipeContainer, path: impl AsRef<Path>, cols: &ColumnSpec) -> Result<usize> {
    if pipe.exists_mol_res_spin_data() {
        return Err(RelaxError::General("The sequence data already exists.".to_string()));
    }
    let rows = read_file(path.as_ref(), cols)?;
    for row in &rows {
        pipe.generate_spin(
            row.mol_name.as_deref(),
            row.res_num,
            row.res_name.as_deref(),
            row.spin_num,
            row.spin_name.as_deref(),
            true,
        )?;
    }
    if rows.is_empty() {
        return Err(RelaxError::General("No sequence data could be loaded.".to_string()));
    }
    info!(spins = rows.len(), "Read the sequence");
    Ok(rows.len())
}

/// Loads one relaxation data set into the pipe. Rows without a value or an
/// error are skipped. Spins are created when the pipe has no sequence,
/// otherwise each row must name an existing spin. Returns the number of
/// spins given data.
pub fn read_relax_data(
    pipe: &mut PipeContainer,
    ri_id: &str,
    ri_type: &str,
    frq: f64,
    path: impl AsRef<Path>,
    cols: &ColumnSpec,
) -> Result<usize> {
    if pipe.ri_ids.iter().any(|id| id == ri_id) {
        return Err(RelaxError::RiIdExists(ri_id.to_string()));
    }
    let ri_type: RiType = ri_type.parse()?;
    let rows = read_file(path.as_ref(), cols)?;
    let generate = !pipe.exists_mol_res_spin_data();

    let mut loaded = 0;
    for row in rows {
        let (Some(value), Some(error)) = (row.value, row.error) else {
            debug!(?row, "Skipping a row without data");
            continue;
        };

        let spin = if generate {
            pipe.generate_spin(
                row.mol_name.as_deref(),
                row.res_num,
                row.res_name.as_deref(),
                row.spin_num,
                row.spin_name.as_deref(),
                true,
            )?
        } else {
            let id = generate_spin_id(
                row.mol_name.as_deref(),
                row.res_num,
                row.res_name.as_deref(),
                row.spin_num,
                row.spin_name.as_deref(),
            );
            let selection = Selection::parse(&id)?;
            let mut matches = pipe.spin_loop_mut(&selection);
            if matches.len() > 1 {
                return Err(RelaxError::General(format!(
                    "The identifier '{id}' corresponds to more than a single spin."
                )));
            }
            match matches.pop() {
                Some(entry) => entry.spin,
                None => {
                    return Err(RelaxError::General(format!(
                        "The spin '{id}' does not exist."
                    )));
                }
            }
        };
        spin.ri_data.insert(ri_id.to_string(), value);
        spin.ri_data_err.insert(ri_id.to_string(), error);
        loaded += 1;
    }

    pipe.ri_ids.push(ri_id.to_string());
    pipe.ri_type.insert(ri_id.to_string(), ri_type);
    pipe.spectrometer_frq.insert(ri_id.to_string(), frq);
    info!(ri_id, %ri_type, frq, spins = loaded, "Loaded relaxation data");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::pipe::PipeType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const R1_FILE: &str = "\
# mol_name  res_num  res_name  spin_num  spin_name  value  error
Ap4Aase     1        GLY       None      N          1.2345  0.0123
Ap4Aase     2        ALA       None      N          1.5     0.02
Ap4Aase\t3\tLEU\tNone\tN\tNone\tNone
Ap4Aase     4        SER
";

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    mod parsing {
        use super::*;

        #[test]
        fn comments_missing_values_and_short_lines_are_handled() {
            let rows = read_columns(R1_FILE.as_bytes(), &ColumnSpec::default()).unwrap();
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0].mol_name.as_deref(), Some("Ap4Aase"));
            assert_eq!(rows[0].res_num, Some(1));
            assert_eq!(rows[0].spin_num, None);
            assert_eq!(rows[1].value, Some(1.5));
            assert_eq!(rows[2].res_name.as_deref(), Some("LEU"));
            assert_eq!(rows[2].value, None);
        }

        #[test]
        fn columns_are_configurable() {
            let cols = ColumnSpec {
                mol_name: None,
                res_num: Some(1),
                res_name: None,
                spin_num: None,
                spin_name: None,
                data: Some(2),
                error: None,
            };
            let rows = read_columns("5 0.8\n6 0.75\n".as_bytes(), &cols).unwrap();
            assert_eq!(rows[1].res_num, Some(6));
            assert_eq!(rows[1].value, Some(0.75));
            assert_eq!(rows[1].mol_name, None);
        }

        #[test]
        fn bad_numbers_report_their_line() {
            let err = read_columns("m 1 GLY 1 N x 0.1\n".as_bytes(), &ColumnSpec::default()).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Parse error on line 1: Invalid float in column 6 (value: 'x')"
            );
        }
    }

    mod loading {
        use super::*;

        #[test]
        fn sequence_is_read_once() {
            let file = file_with(R1_FILE);
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            assert_eq!(read_sequence(&mut pipe, file.path(), &ColumnSpec::sequence()).unwrap(), 3);
            assert_eq!(pipe.mol[0].residues.len(), 3);
            assert!(read_sequence(&mut pipe, file.path(), &ColumnSpec::sequence()).is_err());
        }

        #[test]
        fn relaxation_data_generates_spins_when_no_sequence_exists() {
            let file = file_with(R1_FILE);
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            let loaded =
                read_relax_data(&mut pipe, "R1_600", "R1", 600e6, file.path(), &ColumnSpec::default()).unwrap();
            assert_eq!(loaded, 2);
            assert_eq!(pipe.ri_ids, vec!["R1_600"]);
            assert_eq!(pipe.ri_type["R1_600"], RiType::R1);
            assert_eq!(pipe.spectrometer_frq["R1_600"], 600e6);
            let spin = &pipe.mol[0].residues[0].spins[0];
            assert_eq!(spin.ri_data["R1_600"], 1.2345);
            assert_eq!(spin.ri_data_err["R1_600"], 0.0123);
        }

        #[test]
        fn relaxation_data_attaches_to_the_existing_sequence() {
            let file = file_with(R1_FILE);
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            read_sequence(&mut pipe, file.path(), &ColumnSpec::sequence()).unwrap();
            read_relax_data(&mut pipe, "NOE_600", "NOE", 600e6, file.path(), &ColumnSpec::default()).unwrap();
            assert_eq!(pipe.mol[0].residues[1].spins[0].ri_data["NOE_600"], 1.5);
            assert!(pipe.mol[0].residues[2].spins[0].ri_data.is_empty());
        }

        #[test]
        fn duplicate_ids_and_unknown_types_are_rejected() {
            let file = file_with(R1_FILE);
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            read_relax_data(&mut pipe, "R1_600", "R1", 600e6, file.path(), &ColumnSpec::default()).unwrap();
            assert!(matches!(
                read_relax_data(&mut pipe, "R1_600", "R1", 600e6, file.path(), &ColumnSpec::default()),
                Err(RelaxError::RiIdExists(_))
            ));
            assert!(matches!(
                read_relax_data(&mut pipe, "R1rho", "R1rho", 600e6, file.path(), &ColumnSpec::default()),
                Err(RelaxError::UnknownRiType(_))
            ));
        }

        #[test]
        fn unknown_spins_are_an_error_once_a_sequence_exists() {
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            pipe.generate_spin(Some("Ap4Aase"), Some(1), Some("GLY"), None, Some("N"), true)
                .unwrap();
            let file = file_with(R1_FILE);
            let err = read_relax_data(&mut pipe, "R2_600", "R2", 600e6, file.path(), &ColumnSpec::default())
                .unwrap_err();
            assert_eq!(err.to_string(), "The spin '#Ap4Aase:2@N' does not exist.");
        }
    }
}
