//! The columnar results file of the reduced spectral density mapping.
//!
//! One line per spin and data set (`value`, `error`, then `sim_0`,
//! `sim_1`, ...), each value written as its Python literal and left aligned
//! in a fixed width column.

use super::columns::{ColumnFileError, ColumnParseErrorKind};
use super::xml::{PyValue, float_repr};
use crate::core::error::{RelaxError, Result};
use crate::core::models::mol_res_spin::{SpinContainer, SpinParameter};
use crate::core::models::pipe::PipeContainer;
use crate::core::models::selection::Selection;
use std::io::{BufRead, Write};

/// Columns before the per relaxation data values.
const FIXED_COLUMNS: usize = 15;

/// One parsed results line. Bond lengths are in Ångström, CSA values in ppm
/// and the proton frequency in MHz.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsLine {
    pub res_num: Option<i64>,
    pub res_name: Option<String>,
    pub select: bool,
    pub data_set: String,
    pub nucleus: Option<String>,
    pub proton_frq: Option<f64>,
    pub j0: Option<f64>,
    pub jwx: Option<f64>,
    pub jwh: Option<f64>,
    pub r: Option<f64>,
    pub csa: Option<f64>,
    pub ri: Vec<Option<f64>>,
    pub ri_error: Vec<Option<f64>>,
}

fn repr(value: Option<f64>) -> String {
    value.map_or_else(|| "None".to_string(), float_repr)
}

/// The Python literal of a list, without spaces.
fn compact(value: PyValue) -> String {
    value.repr().replace(' ', "")
}

struct Setup {
    ri_labels: String,
    remap_table: String,
    frq_labels: String,
    frq: String,
}

impl Setup {
    fn from_pipe(pipe: &PipeContainer) -> Self {
        if pipe.ri_ids.is_empty() {
            let none = || "None".to_string();
            return Self {
                ri_labels: none(),
                remap_table: none(),
                frq_labels: none(),
                frq: none(),
            };
        }
        let frqs = pipe.frequencies();
        let labels: Vec<String> = pipe
            .ri_ids
            .iter()
            .map(|id| pipe.ri_type.get(id).map_or("None", |t| t.as_str()).to_string())
            .collect();
        let remap: Vec<PyValue> = pipe
            .ri_ids
            .iter()
            .map(|id| {
                let index = pipe
                    .spectrometer_frq
                    .get(id)
                    .and_then(|frq| frqs.iter().position(|f| f == frq));
                index.map(|i| i as i64).into()
            })
            .collect();
        let frq_labels: Vec<String> = frqs
            .iter()
            .map(|frq| format!("{}", (frq / 1e6).round() as i64))
            .collect();
        Self {
            ri_labels: compact(PyValue::str_list(&labels)),
            remap_table: compact(PyValue::List(remap)),
            frq_labels: compact(PyValue::str_list(&frq_labels)),
            frq: compact(PyValue::float_list(&frqs)),
        }
    }
}

struct Row<'a> {
    num: String,
    name: String,
    select: String,
    data_set: &'a str,
    nucleus: String,
    proton_frq: String,
    params: [String; 5],
    ri: Vec<String>,
    ri_error: Vec<String>,
}

fn write_row(writer: &mut impl Write, row: &Row, setup: &Setup) -> std::io::Result<()> {
    write!(writer, "{:<4} {:<5} ", row.num, row.name)?;
    write!(writer, "{:<9} {:<9} ", row.select, row.data_set)?;
    write!(writer, "{:<7} ", row.nucleus)?;
    write!(writer, "{:<25} ", row.proton_frq)?;
    for param in &row.params {
        write!(writer, "{param:<25} ")?;
    }
    write!(
        writer,
        "{:<40} {:<25} {:<25} {:<30} ",
        setup.ri_labels, setup.remap_table, setup.frq_labels, setup.frq
    )?;
    for value in row.ri.iter().chain(&row.ri_error) {
        write!(writer, "{value:<25} ")?;
    }
    writeln!(writer)
}

/// The values of one data set of a spin: the parameters followed by the
/// relaxation data and errors.
type DataSet = ([Option<f64>; 5], Vec<Option<f64>>, Vec<Option<f64>>);

fn data_set(spin: &SpinContainer, ri_ids: &[String], set: &str, sim: Option<usize>) -> DataSet {
    let pick = |param: &SpinParameter| match (set, sim) {
        ("error", _) => param.error,
        (_, Some(i)) => param.sim.get(i).copied(),
        _ => param.value,
    };
    let params = [
        pick(&spin.j0),
        pick(&spin.jwx),
        pick(&spin.jwh),
        pick(&spin.r).map(|r| r / 1e-10),
        pick(&spin.csa).map(|csa| csa / 1e-6),
    ];
    let ri = ri_ids
        .iter()
        .map(|id| match (set, sim) {
            ("error", _) => None,
            (_, Some(i)) => spin.ri_data_sim.get(id).and_then(|sims| sims.get(i).copied()),
            _ => spin.ri_data.get(id).copied(),
        })
        .collect();
    let ri_error = ri_ids
        .iter()
        .map(|id| match set {
            "error" => None,
            _ => spin.ri_data_err.get(id).copied(),
        })
        .collect();
    (params, ri, ri_error)
}

/// Writes the results of the pipe. Error and simulation lines follow the
/// value lines once Monte Carlo simulations have been set up.
pub fn write_results(writer: &mut impl Write, pipe_name: &str, pipe: &PipeContainer) -> Result<()> {
    if !pipe.exists_mol_res_spin_data() {
        return Err(RelaxError::NoSequence {
            pipe: pipe_name.to_string(),
        });
    }
    let setup = Setup::from_pipe(pipe);

    let header = Row {
        num: "Num".into(),
        name: "Name".into(),
        select: "Selected".into(),
        data_set: "Data_set",
        nucleus: "Nucleus".into(),
        proton_frq: "Proton_frq_(MHz)".into(),
        params: [
            "J(0)".into(),
            "J(wX)".into(),
            "J(wH)".into(),
            "Bond_length_(A)".into(),
            "CSA_(ppm)".into(),
        ],
        ri: pipe.ri_ids.iter().map(|id| format!("Ri_({id})")).collect(),
        ri_error: pipe.ri_ids.iter().map(|id| format!("Ri_error_({id})")).collect(),
    };
    let header_setup = Setup {
        ri_labels: "Ri_labels".into(),
        remap_table: "Remap_table".into(),
        frq_labels: "Frq_labels".into(),
        frq: "Frequencies".into(),
    };
    write_row(writer, &header, &header_setup)?;

    let proton_frq = repr(pipe.jw_frq.map(|frq| frq / 1e6));
    let spins = pipe.spin_loop(&Selection::all());

    let mut sets: Vec<(String, Option<usize>)> = vec![("value".to_string(), None)];
    if let Some(n) = pipe.sim_number {
        sets.push(("error".to_string(), None));
        sets.extend((0..n).map(|i| (format!("sim_{i}"), Some(i))));
    }

    for (set, sim) in &sets {
        for view in &spins {
            let (params, ri, ri_error) = data_set(view.spin, &pipe.ri_ids, set, *sim);
            let row = Row {
                num: view.res_num.map_or_else(|| "None".to_string(), |n| n.to_string()),
                name: view.res_name.unwrap_or("None").to_string(),
                select: PyValue::Bool(view.spin.select).repr(),
                data_set: set,
                nucleus: view.spin.isotope.clone().unwrap_or_else(|| "None".to_string()),
                proton_frq: proton_frq.clone(),
                params: params.map(repr),
                ri: ri.into_iter().map(repr).collect(),
                ri_error: ri_error.into_iter().map(repr).collect(),
            };
            write_row(writer, &row, &setup)?;
        }
    }
    Ok(())
}

fn opt_float(text: &str, column: usize, line: u64) -> std::result::Result<Option<f64>, ColumnFileError> {
    if text == "None" {
        return Ok(None);
    }
    let parsed = match text {
        "nan" => Ok(f64::NAN),
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text.parse(),
    };
    parsed.map(Some).map_err(|_| ColumnFileError::Parse {
        line,
        kind: ColumnParseErrorKind::InvalidFloat {
            column,
            value: text.to_string(),
        },
    })
}

/// Reads the data lines of a results file, skipping the header.
pub fn read_results(reader: impl BufRead) -> std::result::Result<Vec<ResultsLine>, ColumnFileError> {
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index as u64 + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields[0] == "Num" || fields.len() < FIXED_COLUMNS {
            continue;
        }

        let float = |column: usize| opt_float(fields[column], column + 1, number);
        let res_num = match fields[0] {
            "None" => None,
            text => Some(text.parse().map_err(|_| ColumnFileError::Parse {
                line: number,
                kind: ColumnParseErrorKind::InvalidInt {
                    column: 1,
                    value: text.to_string(),
                },
            })?),
        };
        let rest = &fields[FIXED_COLUMNS..];
        let num_ri = rest.len() / 2;
        let ri = (0..num_ri)
            .map(|i| float(FIXED_COLUMNS + i))
            .collect::<std::result::Result<_, _>>()?;
        let ri_error = (0..num_ri)
            .map(|i| float(FIXED_COLUMNS + num_ri + i))
            .collect::<std::result::Result<_, _>>()?;

        lines.push(ResultsLine {
            res_num,
            res_name: (fields[1] != "None").then(|| fields[1].to_string()),
            select: matches!(fields[2], "True" | "1"),
            data_set: fields[3].to_string(),
            nucleus: (fields[4] != "None").then(|| fields[4].to_string()),
            proton_frq: float(5)?,
            j0: float(6)?,
            jwx: float(7)?,
            jwh: float(8)?,
            r: float(9)?,
            csa: float(10)?,
            ri,
            ri_error,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::pipe::{PipeType, RiType};

    fn analysed_pipe() -> PipeContainer {
        let mut pipe = PipeContainer::new(PipeType::JwMapping);
        pipe.jw_frq = Some(600e6);
        for (id, ri_type) in [("R1_600", RiType::R1), ("R2_600", RiType::R2), ("NOE_600", RiType::Noe)] {
            pipe.ri_ids.push(id.into());
            pipe.ri_type.insert(id.into(), ri_type);
            pipe.spectrometer_frq.insert(id.into(), 600e6);
        }
        let spin = pipe
            .generate_spin(Some("m"), Some(7), Some("GLY"), None, Some("N"), true)
            .unwrap();
        spin.isotope = Some("15N".into());
        spin.r.value = Some(1.02e-10);
        spin.csa.value = Some(-172e-6);
        spin.j0.value = Some(4.5e-9);
        spin.jwx.value = Some(2.1e-10);
        spin.jwh.value = Some(5.3e-12);
        for (id, value, error) in [("R1_600", 1.2, 0.02), ("R2_600", 11.5, 0.3), ("NOE_600", 0.8, 0.05)] {
            spin.ri_data.insert(id.into(), value);
            spin.ri_data_err.insert(id.into(), error);
        }
        pipe.generate_spin(Some("m"), Some(8), Some("PRO"), None, Some("N"), false)
            .unwrap();
        pipe
    }

    fn written(pipe: &PipeContainer) -> String {
        let mut buffer = Vec::new();
        write_results(&mut buffer, "jw", pipe).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn header_and_value_lines_use_fixed_columns() {
        let text = written(&analysed_pipe());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Num  Name  Selected  Data_set  Nucleus Proton_frq_(MHz)"));
        assert!(lines[0].contains("Ri_(NOE_600)"));
        assert!(lines[1].starts_with("7    GLY   True      value     15N     600.0"));
        assert!(lines[1].contains("['R1','R2','NOE']"));
        assert!(lines[1].contains("[0,0,0]"));
        assert!(lines[1].contains("['600']"));
        assert!(lines[1].contains("[600000000.0]"));
    }

    #[test]
    fn value_lines_read_back() {
        let text = written(&analysed_pipe());
        let lines = read_results(text.as_bytes()).unwrap();
        assert_eq!(lines.len(), 2);
        let first = &lines[0];
        assert_eq!(first.res_num, Some(7));
        assert_eq!(first.data_set, "value");
        assert_eq!(first.j0, Some(4.5e-9));
        assert!((first.r.unwrap() - 1.02).abs() < 1e-12);
        assert!((first.csa.unwrap() + 172.0).abs() < 1e-9);
        assert_eq!(first.ri, vec![Some(1.2), Some(11.5), Some(0.8)]);
        assert_eq!(first.ri_error[1], Some(0.3));

        let second = &lines[1];
        assert!(!second.select);
        assert_eq!(second.j0, None);
        assert_eq!(second.ri, vec![None, None, None]);
    }

    #[test]
    fn simulations_add_error_and_sim_lines() {
        let mut pipe = analysed_pipe();
        pipe.sim_number = Some(2);
        let spin = &mut pipe.mol[0].residues[0].spins[0];
        spin.j0.error = Some(1e-10);
        spin.j0.sim = vec![4.4e-9, 4.6e-9];
        spin.ri_data_sim.insert("R1_600".into(), vec![1.19, 1.21]);

        let lines = read_results(written(&pipe).as_bytes()).unwrap();
        let sets: Vec<&str> = lines.iter().map(|l| l.data_set.as_str()).collect();
        assert_eq!(sets, vec!["value", "value", "error", "error", "sim_0", "sim_0", "sim_1", "sim_1"]);
        assert_eq!(lines[2].j0, Some(1e-10));
        assert_eq!(lines[2].ri, vec![None, None, None]);
        assert_eq!(lines[6].j0, Some(4.6e-9));
        assert_eq!(lines[6].ri[0], Some(1.21));
        assert_eq!(lines[6].ri_error[0], Some(0.02));
    }

    #[test]
    fn a_pipe_without_spins_is_an_error() {
        let pipe = PipeContainer::new(PipeType::JwMapping);
        let err = write_results(&mut Vec::new(), "jw", &pipe).unwrap_err();
        assert!(matches!(err, RelaxError::NoSequence { .. }));
    }
}
