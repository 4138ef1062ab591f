//! Fixed column PDB v3.30 record formatters.
//!
//! Each function formats one record, checks that it is exactly 80 columns
//! wide and writes it followed by a newline. Missing values are written as
//! blanks.

use super::pdb::{Helix, PdbError, RECORD_WIDTH, Sheet};
use std::fmt::Display;
use std::io::Write;

fn blank<T: Display>(value: Option<T>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}


fn write_record(writer: &mut impl Write, record: String) -> Result<(), PdbError> {
    let width = record.chars().count();
    if width != RECORD_WIDTH {
        return Err(PdbError::RecordLength {
            problem: if width < RECORD_WIDTH { "short" } else { "long" },
            record,
        });
    }
    writer.write_all(record.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// The fields shared by the ATOM and HETATM records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomFields<'a> {
    pub serial: Option<i64>,
    pub name: &'a str,
    pub alt_loc: Option<char>,
    pub res_name: Option<&'a str>,
    pub chain_id: Option<char>,
    pub res_seq: Option<i64>,
    pub icode: Option<char>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub occupancy: f64,
    pub temp_factor: f64,
    pub element: Option<&'a str>,
    pub charge: Option<&'a str>,
}

pub fn atom(writer: &mut impl Write, fields: &AtomFields) -> Result<(), PdbError> {
    // One letter atom names start in column 14, longer ones in column 13.
    let name = if fields.name.chars().count() == 1 {
        format!(" {}", fields.name)
    } else {
        fields.name.to_string()
    };
    write_record(
        writer,
        format!(
            "{:<6}{:>5} {:<4}{:>1}{:>3} {:>1}{:>4}{:>1}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}{:>2}",
            "ATOM",
            blank(fields.serial),
            name,
            blank(fields.alt_loc),
            blank(fields.res_name),
            blank(fields.chain_id),
            blank(fields.res_seq),
            blank(fields.icode),
            fields.x,
            fields.y,
            fields.z,
            fields.occupancy,
            fields.temp_factor,
            blank(fields.element),
            blank(fields.charge),
        ),
    )
}

pub fn hetatm(writer: &mut impl Write, fields: &AtomFields) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6}{:>5} {:>4}{:>1}{:>3} {:>1}{:>4}{:>1}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}{:>2}",
            "HETATM",
            blank(fields.serial),
            fields.name,
            blank(fields.alt_loc),
            blank(fields.res_name),
            blank(fields.chain_id),
            blank(fields.res_seq),
            blank(fields.icode),
            fields.x,
            fields.y,
            fields.z,
            fields.occupancy,
            fields.temp_factor,
            blank(fields.element),
            blank(fields.charge),
        ),
    )
}

/// At most four bonded atoms fit into one CONECT record.
pub fn conect(writer: &mut impl Write, serial: i64, bonded: &[i64]) -> Result<(), PdbError> {
    let slot = |i: usize| blank(bonded.get(i));
    write_record(
        writer,
        format!(
            "{:<6}{:>5}{:>5}{:>5}{:>5}{:>5}{:>49}",
            "CONECT",
            serial,
            slot(0),
            slot(1),
            slot(2),
            slot(3),
            ""
        ),
    )
}

pub fn end(writer: &mut impl Write) -> Result<(), PdbError> {
    write_record(writer, format!("{:<80}", "END"))
}

pub fn endmdl(writer: &mut impl Write) -> Result<(), PdbError> {
    write_record(writer, format!("{:<80}", "ENDMDL"))
}

pub fn formul(
    writer: &mut impl Write,
    comp_num: usize,
    het_id: &str,
    formula: &str,
) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6}  {:>2}  {:>3} {:>2}{:>1}{:<51}{:>10}",
            "FORMUL", comp_num, het_id, "", "", formula, ""
        ),
    )
}

pub fn helix(writer: &mut impl Write, ser_num: usize, helix: &Helix) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6} {:>3} {:>3} {:>3} {:>1} {:>4}{:>1} {:>3} {:>1} {:>4}{:>1}{:>2}{:>30} {:>5}    ",
            "HELIX",
            ser_num,
            blank(helix.helix_id.as_deref()),
            blank(helix.init_res_name.as_deref()),
            blank(helix.init_chain_id.as_deref()),
            blank(helix.init_seq_num),
            "",
            blank(helix.end_res_name.as_deref()),
            blank(helix.end_chain_id.as_deref()),
            blank(helix.end_seq_num),
            "",
            blank(helix.helix_class),
            "",
            blank(helix.length),
        ),
    )
}

pub fn het(
    writer: &mut impl Write,
    het_id: &str,
    chain_id: Option<char>,
    seq_num: Option<i64>,
    num_het_atoms: usize,
) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6} {:>3}  {:>1}{:>4}{:>1}  {:>5}     {:<40}{:>10}",
            "HET",
            het_id,
            blank(chain_id),
            blank(seq_num),
            "",
            num_het_atoms,
            "",
            ""
        ),
    )
}

pub fn hetnam(writer: &mut impl Write, het_id: &str, name: &str) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6}  {:>2} {:>3} {:<55}{:>10}",
            "HETNAM",
            "",
            het_id,
            name.to_uppercase(),
            ""
        ),
    )
}

/// The record counts of the MASTER record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterCounts {
    pub num_remark: usize,
    pub num_het: usize,
    pub num_helix: usize,
    pub num_sheet: usize,
    pub num_turn: usize,
    pub num_site: usize,
    pub num_xform: usize,
    pub num_coord: usize,
    pub num_ter: usize,
    pub num_conect: usize,
    pub num_seq: usize,
}

pub fn master(writer: &mut impl Write, counts: &MasterCounts) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6}    {:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>5}{:>10}",
            "MASTER",
            counts.num_remark,
            0,
            counts.num_het,
            counts.num_helix,
            counts.num_sheet,
            counts.num_turn,
            counts.num_site,
            counts.num_xform,
            counts.num_coord,
            counts.num_ter,
            counts.num_conect,
            counts.num_seq,
            ""
        ),
    )
}

pub fn model(writer: &mut impl Write, serial: i64) -> Result<(), PdbError> {
    write_record(writer, format!("{:<6}    {:>4}{:>66}", "MODEL", serial, ""))
}

/// Greedy word wrapping, splitting words longer than the width.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let used = current.chars().count();
            let needed = if used == 0 { word.len() } else { used + 1 + word.len() };
            if needed <= width {
                if used > 0 {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            let rest = word.split_off(width);
            lines.push(word.iter().collect());
            word = rest;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Writes a REMARK, wrapped over as many records as needed. `None` writes an
/// empty remark line.
pub fn remark(writer: &mut impl Write, num: u32, remark: Option<&str>) -> Result<(), PdbError> {
    let lines = match remark {
        None => vec![String::new()],
        Some(remark) => wrap(remark, 68)
            .into_iter()
            .map(|line| line.to_uppercase())
            .collect(),
    };
    for line in lines {
        write_record(writer, format!("{:<6} {:>3} {:<68} ", "REMARK", num, line))?;
    }
    Ok(())
}

pub fn sheet(writer: &mut impl Write, sheet: &Sheet) -> Result<(), PdbError> {
    let s = |v: &Option<String>| blank(v.as_deref());
    write_record(
        writer,
        format!(
            "{:<6} {:>3} {:>3}{:>2} {:>3} {:>1}{:>4}{:>1} {:>3} {:>1}{:>4}{:>1}{:>2} {:>4}{:>3} {:>1}{:>4}{:>1} {:>4}{:>3} {:>1}{:>4}{:>1}{:>10}",
            "SHEET",
            blank(sheet.strand),
            s(&sheet.sheet_id),
            blank(sheet.num_strands),
            s(&sheet.init_res_name),
            s(&sheet.init_chain_id),
            blank(sheet.init_seq_num),
            s(&sheet.init_icode),
            s(&sheet.end_res_name),
            s(&sheet.end_chain_id),
            blank(sheet.end_seq_num),
            s(&sheet.end_icode),
            blank(sheet.sense),
            s(&sheet.cur_atom),
            s(&sheet.cur_res_name),
            s(&sheet.cur_chain_id),
            blank(sheet.cur_res_seq),
            s(&sheet.cur_icode),
            s(&sheet.prev_atom),
            s(&sheet.prev_res_name),
            s(&sheet.prev_chain_id),
            blank(sheet.prev_res_seq),
            s(&sheet.prev_icode),
            ""
        ),
    )
}

pub fn ter(
    writer: &mut impl Write,
    serial: i64,
    res_name: Option<&str>,
    chain_id: Option<char>,
    res_seq: Option<i64>,
) -> Result<(), PdbError> {
    write_record(
        writer,
        format!(
            "{:<6}{:>5}      {:>3} {:>1}{:>4}{:>1}{:>53}",
            "TER",
            serial,
            blank(res_name),
            blank(chain_id),
            blank(res_seq),
            "",
            ""
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut Vec<u8>) -> Result<(), PdbError>) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn assert_all_records_are_80_columns(text: &str) {
        for line in text.lines() {
            assert_eq!(line.len(), 80, "record '{line}' has {} columns", line.len());
        }
    }

    fn sample_atom() -> AtomFields<'static> {
        AtomFields {
            serial: Some(1),
            name: "N",
            res_name: Some("GLY"),
            chain_id: Some('A'),
            res_seq: Some(1),
            x: 1.0,
            y: -2.5,
            z: 10.125,
            occupancy: 1.0,
            element: Some("N"),
            ..AtomFields::default()
        }
    }

    mod records {
        use super::*;

        #[test]
        fn atom_record_columns() {
            let text = written(|w| atom(w, &sample_atom()));
            assert_eq!(
                text,
                "ATOM      1  N   GLY A   1       1.000  -2.500  10.125  1.00  0.00           N  \n"
            );
        }

        #[test]
        fn hetatm_names_are_right_aligned() {
            let fields = AtomFields {
                name: "R",
                res_name: Some("COM"),
                ..sample_atom()
            };
            let text = written(|w| hetatm(w, &fields));
            assert_eq!(&text[0..6], "HETATM");
            assert_eq!(&text[12..16], "   R");
            assert_eq!(&text[17..20], "COM");
        }

        #[test]
        fn conect_records_leave_empty_slots_blank() {
            let text = written(|w| conect(w, 12, &[13, 14]));
            assert_eq!(&text[0..21], "CONECT   12   13   14");
            assert_eq!(text[21..80].trim(), "");
        }

        #[test]
        fn every_record_is_80_columns() {
            let helix_record = Helix {
                helix_id: Some("1".into()),
                init_res_name: Some("ALA".into()),
                init_chain_id: Some("A".into()),
                init_seq_num: Some(2),
                end_res_name: Some("GLY".into()),
                end_chain_id: Some("A".into()),
                end_seq_num: Some(10),
                helix_class: Some(1),
                length: Some(9),
            };
            let text = written(|w| {
                remark(w, 4, Some("This file complies with format v. 3.30, Jul-2011."))?;
                remark(w, 40, None)?;
                het(w, "COM", Some('A'), Some(1), 1)?;
                hetnam(w, "COM", "Centre of mass")?;
                formul(w, 1, "COM", "C1")?;
                helix(w, 1, &helix_record)?;
                sheet(w, &Sheet::default())?;
                model(w, 1)?;
                atom(w, &sample_atom())?;
                ter(w, 2, Some("GLY"), Some('A'), Some(1))?;
                hetatm(w, &sample_atom())?;
                endmdl(w)?;
                conect(w, 1, &[2, 3, 4, 5])?;
                master(w, &MasterCounts::default())?;
                end(w)
            });
            assert_eq!(text.lines().count(), 15);
            assert_all_records_are_80_columns(&text);
        }

        #[test]
        fn hetnam_text_is_capitalised() {
            let text = written(|w| hetnam(w, "PIV", "Pivot point"));
            assert!(text.contains("PIV PIVOT POINT"));
        }

        #[test]
        fn overlong_fields_are_rejected() {
            let fields = AtomFields {
                res_name: Some("LONGNAME"),
                ..sample_atom()
            };
            let mut buffer = Vec::new();
            assert!(matches!(
                atom(&mut buffer, &fields),
                Err(PdbError::RecordLength { problem: "long", .. })
            ));
            assert!(buffer.is_empty());
        }
    }

    mod remarks {
        use super::*;

        #[test]
        fn long_remarks_wrap_at_68_columns() {
            let remark_text = "word ".repeat(30);
            let text = written(|w| remark(w, 40, Some(&remark_text)));
            assert_eq!(text.lines().count(), 3);
            assert_all_records_are_80_columns(&text);
            assert!(text.starts_with("REMARK  40 WORD WORD"));
        }

        #[test]
        fn wrap_splits_words_longer_than_the_width() {
            assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
            assert_eq!(wrap("a bb ccc", 4), vec!["a bb", "ccc"]);
            assert!(wrap("", 10).is_empty());
        }
    }
}
