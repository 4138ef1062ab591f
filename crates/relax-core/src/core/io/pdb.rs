use crate::core::constants::CHAIN_ID_LIST;
use crate::core::io::traits::StructureFile;
use crate::core::io::xml::{PyValue, XmlError};
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::warn;

/// Record names of the sections which precede the coordinates, in file order.
const TITLE_RECORDS: &[&str] = &[
    "HEADER", "OBSLTE", "TITLE ", "SPLT  ", "CAVEAT", "COMPND", "SOURCE", "KEYWDS", "EXPDTA",
    "NUMMDL", "MDLTYP", "AUTHOR", "REVDAT", "SPRSDE", "JRNL  ", "REMARK",
];
const PRIMARY_STRUCTURE_RECORDS: &[&str] = &["DBREF ", "DBREF1", "DBREF2", "SEQADV", "SEQRES", "MODRES"];
const HETEROGEN_RECORDS: &[&str] = &["HET   ", "FORMUL", "HETNAM", "HETSYN"];
const SECONDARY_STRUCTURE_RECORDS: &[&str] = &["HELIX ", "SHEET ", "TURN  "];
const CONNECTIVITY_ANNOTATION_RECORDS: &[&str] = &["SSBOND", "LINK  ", "CISPEP"];
const MISC_RECORDS: &[&str] = &["SITE  "];
/// The transform section is matched on the first five characters only.
const TRANSFORM_RECORDS: &[&str] = &["CRYST", "MTRIX", "ORIGX", "SCALE"];

/// The PDB record width.
pub const RECORD_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PdbParseErrorKind,
    },
    #[error("The MODEL record '{0}' is corrupt, cannot read the PDB file.")]
    CorruptModel(String),
    #[error("The PDB file is empty.")]
    Empty,
    #[error("The PDB record '{record}' is too {problem}.")]
    RecordLength {
        record: String,
        problem: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: &'static str, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: &'static str, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: &'static str },
    #[error("The chain ID '{0}' is not a valid PDB chain identifier")]
    UnknownChainId(char),
}

/// The record type of a coordinate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomRecordKind {
    Atom,
    Hetatm,
}

impl AtomRecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AtomRecordKind::Atom => "ATOM",
            AtomRecordKind::Hetatm => "HETATM",
        }
    }
}

/// One ATOM or HETATM record.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub kind: AtomRecordKind,
    pub serial: Option<i64>,
    pub name: String,
    pub alt_loc: Option<char>,
    pub res_name: Option<String>,
    pub chain_id: Option<char>,
    pub res_seq: Option<i64>,
    pub icode: Option<char>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub occupancy: Option<f64>,
    pub temp_factor: Option<f64>,
    pub element: Option<String>,
    pub charge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConectRecord {
    pub serial: i64,
    pub bonded: Vec<i64>,
}

/// A HELIX record, reduced to the fields needed to write it back out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Helix {
    pub helix_id: Option<String>,
    pub init_chain_id: Option<String>,
    pub init_res_name: Option<String>,
    pub init_seq_num: Option<i64>,
    pub end_chain_id: Option<String>,
    pub end_res_name: Option<String>,
    pub end_seq_num: Option<i64>,
    pub helix_class: Option<i64>,
    pub length: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub strand: Option<i64>,
    pub sheet_id: Option<String>,
    pub num_strands: Option<i64>,
    pub init_res_name: Option<String>,
    pub init_chain_id: Option<String>,
    pub init_seq_num: Option<i64>,
    pub init_icode: Option<String>,
    pub end_res_name: Option<String>,
    pub end_chain_id: Option<String>,
    pub end_seq_num: Option<i64>,
    pub end_icode: Option<String>,
    pub sense: Option<i64>,
    pub cur_atom: Option<String>,
    pub cur_res_name: Option<String>,
    pub cur_chain_id: Option<String>,
    pub cur_res_seq: Option<i64>,
    pub cur_icode: Option<String>,
    pub prev_atom: Option<String>,
    pub prev_res_name: Option<String>,
    pub prev_chain_id: Option<String>,
    pub prev_res_seq: Option<i64>,
    pub prev_icode: Option<String>,
}

/// The molecules of one model, numbered from 1 in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct PdbMolecule {
    pub num: usize,
    pub atoms: Vec<AtomRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdbModel {
    pub num: Option<i64>,
    pub molecules: Vec<PdbMolecule>,
}

/// Everything read from a PDB file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbRecords {
    pub helices: Vec<Helix>,
    pub sheets: Vec<Sheet>,
    pub models: Vec<PdbModel>,
    pub conect: Vec<ConectRecord>,
}

pub(crate) fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn opt_str(line: &str, start: usize, end: usize) -> Option<String> {
    let text = slice_and_trim(line, start, end);
    (!text.is_empty()).then(|| text.to_string())
}

fn opt_char(line: &str, column: usize) -> Option<char> {
    line.get(column..=column)
        .and_then(|s| s.chars().next())
        .filter(|c| !c.is_whitespace())
}

fn opt_int(
    line: &str,
    start: usize,
    end: usize,
    columns: &'static str,
    line_num: usize,
) -> Result<Option<i64>, PdbError> {
    let text = slice_and_trim(line, start, end);
    if text.is_empty() {
        return Ok(None);
    }
    text.parse().map(Some).map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns,
            value: text.into(),
        },
    })
}

fn opt_float(
    line: &str,
    start: usize,
    end: usize,
    columns: &'static str,
    line_num: usize,
) -> Result<Option<f64>, PdbError> {
    let text = slice_and_trim(line, start, end);
    if text.is_empty() {
        return Ok(None);
    }
    text.parse().map(Some).map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns,
            value: text.into(),
        },
    })
}

fn required_float(
    line: &str,
    start: usize,
    end: usize,
    columns: &'static str,
    line_num: usize,
) -> Result<f64, PdbError> {
    opt_float(line, start, end, columns, line_num)?.ok_or(PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::MissingRequiredField { columns },
    })
}

/// Converts a PDB chain ID into the zero based molecule index.
pub fn chain_id_to_mol_index(chain_id: char) -> Option<usize> {
    CHAIN_ID_LIST.find(chain_id)
}

/// Guesses the element from a PDB atom name, e.g. `CA` gives `C` and `HD21`
/// gives `H`. Only the common biomolecular elements are recognised.
pub fn det_pdb_element(atom_name: &str) -> Option<String> {
    let stripped = atom_name
        .trim_matches('\'')
        .trim_matches(|c: char| c.is_ascii_digit());

    let element = match stripped {
        "CA" | "CB" | "CG" | "CD" | "CE" | "CH" | "CZ" => "C",
        "ND" | "NE" | "NH" | "NZ" => "N",
        "HA" | "HB" | "HG" | "HD" | "HE" | "HH" | "HT" | "HZ" => "H",
        "OG" | "OD" | "OE" | "OH" | "OT" => "O",
        "SD" | "SG" => "S",
        other => other,
    };

    if matches!(element, "H" | "C" | "N" | "O" | "F" | "P" | "S") {
        Some(element.to_string())
    } else {
        warn!("Cannot determine the element associated with atom '{atom_name}'.");
        None
    }
}

fn parse_atom(line: &str, kind: AtomRecordKind, line_num: usize) -> Result<AtomRecord, PdbError> {
    let name = slice_and_trim(line, 12, 16);
    if name.is_empty() {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::MissingRequiredField { columns: "13-16" },
        });
    }
    let element = opt_str(line, 76, 78).or_else(|| det_pdb_element(name));

    Ok(AtomRecord {
        kind,
        serial: opt_int(line, 6, 11, "7-11", line_num)?,
        name: name.to_string(),
        alt_loc: opt_char(line, 16),
        res_name: opt_str(line, 17, 20),
        chain_id: opt_char(line, 21),
        res_seq: opt_int(line, 22, 26, "23-26", line_num)?,
        icode: opt_char(line, 26),
        x: required_float(line, 30, 38, "31-38", line_num)?,
        y: required_float(line, 38, 46, "39-46", line_num)?,
        z: required_float(line, 46, 54, "47-54", line_num)?,
        occupancy: opt_float(line, 54, 60, "55-60", line_num)?,
        temp_factor: opt_float(line, 60, 66, "61-66", line_num)?,
        element,
        charge: opt_str(line, 78, 80),
    })
}

fn parse_conect(line: &str, line_num: usize) -> Result<Option<ConectRecord>, PdbError> {
    let Some(serial) = opt_int(line, 6, 11, "7-11", line_num)? else {
        return Ok(None);
    };
    let columns = [(11, 16, "12-16"), (16, 21, "17-21"), (21, 26, "22-26"), (26, 31, "27-31")];
    let mut bonded = Vec::with_capacity(4);
    for (start, end, label) in columns {
        if let Some(atom) = opt_int(line, start, end, label, line_num)? {
            bonded.push(atom);
        }
    }
    Ok(Some(ConectRecord { serial, bonded }))
}

fn parse_helix(line: &str, line_num: usize) -> Result<Helix, PdbError> {
    Ok(Helix {
        helix_id: opt_str(line, 11, 14),
        init_res_name: opt_str(line, 15, 18),
        init_chain_id: opt_str(line, 19, 20),
        init_seq_num: opt_int(line, 21, 25, "22-25", line_num)?,
        end_res_name: opt_str(line, 27, 30),
        end_chain_id: opt_str(line, 31, 32),
        end_seq_num: opt_int(line, 33, 37, "34-37", line_num)?,
        helix_class: opt_int(line, 38, 40, "39-40", line_num)?,
        length: opt_int(line, 71, 76, "72-76", line_num)?,
    })
}

fn parse_sheet(line: &str, line_num: usize) -> Result<Sheet, PdbError> {
    Ok(Sheet {
        strand: opt_int(line, 7, 10, "8-10", line_num)?,
        sheet_id: opt_str(line, 11, 14),
        num_strands: opt_int(line, 14, 16, "15-16", line_num)?,
        init_res_name: opt_str(line, 17, 20),
        init_chain_id: opt_str(line, 21, 22),
        init_seq_num: opt_int(line, 22, 26, "23-26", line_num)?,
        init_icode: opt_str(line, 26, 27),
        end_res_name: opt_str(line, 28, 31),
        end_chain_id: opt_str(line, 32, 33),
        end_seq_num: opt_int(line, 33, 37, "34-37", line_num)?,
        end_icode: opt_str(line, 37, 38),
        sense: opt_int(line, 38, 40, "39-40", line_num)?,
        cur_atom: opt_str(line, 41, 45),
        cur_res_name: opt_str(line, 45, 48),
        cur_chain_id: opt_str(line, 49, 50),
        cur_res_seq: opt_int(line, 50, 54, "51-54", line_num)?,
        cur_icode: opt_str(line, 54, 55),
        prev_atom: opt_str(line, 56, 60),
        prev_res_name: opt_str(line, 60, 63),
        prev_chain_id: opt_str(line, 64, 65),
        prev_res_seq: opt_int(line, 65, 69, "66-69", line_num)?,
        prev_icode: opt_str(line, 69, 70),
    })
}

/// A padded record and its one based line number.
struct Line {
    number: usize,
    text: String,
}

impl Line {
    fn starts_with(&self, prefix: &str) -> bool {
        self.text.starts_with(prefix)
    }

    fn record_name(&self) -> &str {
        self.text.get(0..6).unwrap_or("")
    }
}

/// Advances past the records of one section.
fn skip_section(lines: &[Line], start: usize, records: &[&str], width: usize) -> usize {
    lines[start..]
        .iter()
        .position(|line| !records.contains(&line.text.get(0..width).unwrap_or("")))
        .map_or(lines.len(), |offset| start + offset)
}

/// Splits the records of one model into molecules.
///
/// A molecule ends at a TER record not followed by HETATM or CONECT
/// records, or at a HETATM record followed by an ATOM record. Chain IDs,
/// when present, decide the molecule directly.
fn split_molecules(records: &[&Line]) -> Result<Vec<PdbMolecule>, PdbError> {
    let mut mol_count = 1usize;
    let mut molecules: Vec<Vec<AtomRecord>> = vec![Vec::new()];

    for (i, line) in records.iter().enumerate() {
        if line.starts_with("END") || line.starts_with("MASTER") {
            break;
        }
        let next = records.get(i + 1);

        if line.starts_with("TER") {
            let continues = next.is_some_and(|n| n.starts_with("HETATM") || n.starts_with("CONECT"));
            if next.is_some() && !continues {
                mol_count += 1;
            }
            continue;
        }

        let kind = if line.starts_with("ATOM") {
            AtomRecordKind::Atom
        } else if line.starts_with("HETATM") {
            AtomRecordKind::Hetatm
        } else {
            continue;
        };

        let atom = parse_atom(&line.text, kind, line.number)?;
        let mol_index = match atom.chain_id {
            None => mol_count - 1,
            Some(chain_id) => chain_id_to_mol_index(chain_id).ok_or(PdbError::Parse {
                line: line.number,
                kind: PdbParseErrorKind::UnknownChainId(chain_id),
            })?,
        };
        if molecules.len() <= mol_index {
            molecules.resize_with(mol_index + 1, Vec::new);
        }
        molecules[mol_index].push(atom);

        if kind == AtomRecordKind::Hetatm && next.is_some_and(|n| n.starts_with("ATOM")) {
            mol_count += 1;
        }
    }

    Ok(molecules
        .into_iter()
        .enumerate()
        .filter(|(_, atoms)| !atoms.is_empty())
        .map(|(index, atoms)| PdbMolecule {
            num: index + 1,
            atoms,
        })
        .collect())
}

/// PDB v3.30 reader.
pub struct PdbFile;

impl StructureFile for PdbFile {
    type Records = PdbRecords;
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<PdbRecords, PdbError> {
        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let text = line.trim_end_matches(['\r', '\n']);
            lines.push(Line {
                number: index + 1,
                text: format!("{text:<RECORD_WIDTH$}"),
            });
        }
        if lines.is_empty() {
            return Err(PdbError::Empty);
        }

        let mut records = PdbRecords::default();

        let mut pos = skip_section(&lines, 0, TITLE_RECORDS, 6);
        pos = skip_section(&lines, pos, PRIMARY_STRUCTURE_RECORDS, 6);
        pos = skip_section(&lines, pos, HETEROGEN_RECORDS, 6);

        let ss_end = skip_section(&lines, pos, SECONDARY_STRUCTURE_RECORDS, 6);
        for line in &lines[pos..ss_end] {
            match line.record_name() {
                "HELIX " => records.helices.push(parse_helix(&line.text, line.number)?),
                "SHEET " => records.sheets.push(parse_sheet(&line.text, line.number)?),
                _ => {}
            }
        }
        pos = skip_section(&lines, ss_end, CONNECTIVITY_ANNOTATION_RECORDS, 6);
        pos = skip_section(&lines, pos, MISC_RECORDS, 6);
        pos = skip_section(&lines, pos, TRANSFORM_RECORDS, 5);

        // Coordinate section.
        let mut model_num: Option<i64> = None;
        let mut model_records: Vec<&Line> = Vec::new();
        for line in &lines[pos..] {
            if line.starts_with("MODEL") {
                model_num = Some(
                    line.text
                        .split_whitespace()
                        .nth(1)
                        .and_then(|serial| serial.parse().ok())
                        .ok_or_else(|| PdbError::CorruptModel(line.text.trim_end().to_string()))?,
                );
            }
            if line.starts_with("CONECT") {
                if let Some(conect) = parse_conect(&line.text, line.number)? {
                    records.conect.push(conect);
                }
            }

            let is_atom = line.starts_with("ATOM") || line.starts_with("HETATM");
            if !is_atom && model_records.is_empty() {
                continue;
            }
            if line.starts_with("ENDMDL") {
                records.models.push(PdbModel {
                    num: model_num,
                    molecules: split_molecules(&model_records)?,
                });
                model_records.clear();
                continue;
            }
            model_records.push(line);
        }
        if !model_records.is_empty() {
            records.models.push(PdbModel {
                num: model_num,
                molecules: split_molecules(&model_records)?,
            });
        }

        Ok(records)
    }
}

fn opt_str_value(value: &Option<String>) -> PyValue {
    value.as_deref().into()
}

fn opt_int_value(value: Option<i64>) -> PyValue {
    value.into()
}

fn list_field(items: &[PyValue], index: usize) -> &PyValue {
    items.get(index).unwrap_or(&PyValue::None)
}

impl Helix {
    /// The list form stored in XML state files.
    pub fn to_py(&self) -> PyValue {
        PyValue::List(vec![
            opt_str_value(&self.helix_id),
            opt_str_value(&self.init_chain_id),
            opt_str_value(&self.init_res_name),
            opt_int_value(self.init_seq_num),
            opt_str_value(&self.end_chain_id),
            opt_str_value(&self.end_res_name),
            opt_int_value(self.end_seq_num),
            opt_int_value(self.helix_class),
            opt_int_value(self.length),
        ])
    }

    pub fn from_py(value: &PyValue) -> Result<Self, XmlError> {
        let name = "helices";
        let items = value.to_list(name)?;
        let s = |i| list_field(items, i).to_opt_string(name);
        let n = |i| list_field(items, i).to_opt_i64(name);
        Ok(Helix {
            helix_id: s(0)?,
            init_chain_id: s(1)?,
            init_res_name: s(2)?,
            init_seq_num: n(3)?,
            end_chain_id: s(4)?,
            end_res_name: s(5)?,
            end_seq_num: n(6)?,
            helix_class: n(7)?,
            length: n(8)?,
        })
    }
}

impl Sheet {
    pub fn to_py(&self) -> PyValue {
        PyValue::List(vec![
            opt_int_value(self.strand),
            opt_str_value(&self.sheet_id),
            opt_int_value(self.num_strands),
            opt_str_value(&self.init_res_name),
            opt_str_value(&self.init_chain_id),
            opt_int_value(self.init_seq_num),
            opt_str_value(&self.init_icode),
            opt_str_value(&self.end_res_name),
            opt_str_value(&self.end_chain_id),
            opt_int_value(self.end_seq_num),
            opt_str_value(&self.end_icode),
            opt_int_value(self.sense),
            opt_str_value(&self.cur_atom),
            opt_str_value(&self.cur_res_name),
            opt_str_value(&self.cur_chain_id),
            opt_int_value(self.cur_res_seq),
            opt_str_value(&self.cur_icode),
            opt_str_value(&self.prev_atom),
            opt_str_value(&self.prev_res_name),
            opt_str_value(&self.prev_chain_id),
            opt_int_value(self.prev_res_seq),
            opt_str_value(&self.prev_icode),
        ])
    }

    pub fn from_py(value: &PyValue) -> Result<Self, XmlError> {
        let name = "sheets";
        let items = value.to_list(name)?;
        let s = |i| list_field(items, i).to_opt_string(name);
        let n = |i| list_field(items, i).to_opt_i64(name);
        Ok(Sheet {
            strand: n(0)?,
            sheet_id: s(1)?,
            num_strands: n(2)?,
            init_res_name: s(3)?,
            init_chain_id: s(4)?,
            init_seq_num: n(5)?,
            init_icode: s(6)?,
            end_res_name: s(7)?,
            end_chain_id: s(8)?,
            end_seq_num: n(9)?,
            end_icode: s(10)?,
            sense: n(11)?,
            cur_atom: s(12)?,
            cur_res_name: s(13)?,
            cur_chain_id: s(14)?,
            cur_res_seq: n(15)?,
            cur_icode: s(16)?,
            prev_atom: s(17)?,
            prev_res_name: s(18)?,
            prev_chain_id: s(19)?,
            prev_res_seq: n(20)?,
            prev_icode: s(21)?,
        })
    }
}
