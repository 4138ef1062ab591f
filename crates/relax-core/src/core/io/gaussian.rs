use crate::core::constants::element_symbol;
use crate::core::io::traits::StructureFile;
use nalgebra::Point3;
use std::io::{self, BufRead};
use thiserror::Error;

const ORIENTATION_HEADER: &str = "Standard orientation";
const SEPARATOR: &str = "---------";
/// Lines between the header and the first atom: separator, two column
/// title lines and another separator.
const TITLE_LINES: usize = 4;

#[derive(Debug, Error)]
pub enum GaussianError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("The Gaussian log file is empty.")]
    Empty,
    #[error("No 'Standard orientation' block could be found in the Gaussian log file.")]
    NoStructure,
    #[error("Invalid field on line {line} (value: '{value}')")]
    InvalidField { line: usize, value: String },
    #[error("The atomic number {0} is unknown.")]
    UnknownAtomicNumber(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianAtom {
    pub center: i64,
    pub element: &'static str,
    pub pos: Point3<f64>,
}

/// Gaussian log reader, keeping only the final "Standard orientation"
/// geometry.
pub struct GaussianLog;

fn parse_atom(line: &str, line_num: usize) -> Result<Option<GaussianAtom>, GaussianError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() != 6 {
        return Ok(None);
    }
    let invalid = |value: &str| GaussianError::InvalidField {
        line: line_num,
        value: value.to_string(),
    };
    let center: i64 = words[0].parse().map_err(|_| invalid(words[0]))?;
    let atomic_number: usize = words[1].parse().map_err(|_| invalid(words[1]))?;
    let coord = |value: &str| value.parse::<f64>().map_err(|_| invalid(value));
    Ok(Some(GaussianAtom {
        center,
        element: element_symbol(atomic_number)
            .ok_or(GaussianError::UnknownAtomicNumber(atomic_number))?,
        pos: Point3::new(coord(words[3])?, coord(words[4])?, coord(words[5])?),
    }))
}

impl StructureFile for GaussianLog {
    type Records = Vec<GaussianAtom>;
    type Error = GaussianError;

    fn read_from(reader: &mut impl BufRead) -> Result<Vec<GaussianAtom>, GaussianError> {
        let mut last_block: Option<Vec<GaussianAtom>> = None;
        let mut current: Option<Vec<GaussianAtom>> = None;
        let mut block_line = 0;
        let mut empty = true;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            empty = false;

            if line.contains(ORIENTATION_HEADER) {
                current = Some(Vec::new());
                block_line = 0;
                continue;
            }
            let Some(atoms) = current.as_mut() else {
                continue;
            };
            if block_line >= TITLE_LINES && line.contains(SEPARATOR) {
                last_block = current.take();
                continue;
            }
            if block_line >= TITLE_LINES {
                if let Some(atom) = parse_atom(&line, index + 1)? {
                    atoms.push(atom);
                }
            }
            block_line += 1;
        }

        if empty {
            return Err(GaussianError::Empty);
        }
        last_block.ok_or(GaussianError::NoStructure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn block(x: f64) -> String {
        format!(
            "                         Standard orientation:
 ---------------------------------------------------------------------
 Center     Atomic      Atomic             Coordinates (Angstroms)
 Number     Number       Type             X           Y           Z
 ---------------------------------------------------------------------
      1          8           0        {x:.6}    0.000000    0.119262
      2          1           0        0.000000    0.763239   -0.477047
 ---------------------------------------------------------------------
"
        )
    }

    #[test]
    fn the_last_orientation_block_is_kept() {
        let text = format!(" Entering Gaussian System\n{}{}", block(0.0), block(0.25));
        let atoms = GaussianLog::read_from(&mut Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms[0].element, "O");
        assert_eq!(atoms[0].pos.x, 0.25);
        assert_eq!(atoms[1].element, "H");
        assert_eq!(atoms[1].center, 2);
    }

    #[test]
    fn logs_without_geometry_are_errors() {
        let read = |text: &str| GaussianLog::read_from(&mut Cursor::new(text.as_bytes()));
        assert!(matches!(read(""), Err(GaussianError::Empty)));
        assert!(matches!(read(" SCF Done\n"), Err(GaussianError::NoStructure)));
    }
}
