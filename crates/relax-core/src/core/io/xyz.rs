use crate::core::io::traits::StructureFile;
use nalgebra::Point3;
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("The XYZ file is empty.")]
    Empty,
    #[error("The MODEL record '{0}' is corrupt, cannot read the XYZ file.")]
    CorruptModel(String),
    #[error("Invalid coordinate on line {line} (value: '{value}')")]
    InvalidFloat { line: usize, value: String },
}

/// One `element x y z` record.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzAtom {
    pub element: String,
    pub pos: Point3<f64>,
}

/// XYZ reader. The first line holds the atom count of each model; every
/// following line with exactly four fields is an atom record.
pub struct XyzFile;

impl StructureFile for XyzFile {
    /// The atoms of each model in file order.
    type Records = Vec<Vec<XyzAtom>>;
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<Self::Records, XyzError> {
        let mut models = Vec::new();
        let mut atoms = Vec::new();
        let mut atoms_per_model: Option<usize> = None;
        let mut empty = true;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            empty = false;
            let words: Vec<&str> = line.split_whitespace().collect();

            if index == 0 && words.len() == 1 {
                atoms_per_model = Some(
                    words[0]
                        .parse()
                        .map_err(|_| XyzError::CorruptModel(line.clone()))?,
                );
                continue;
            }
            if words.len() != 4 {
                continue;
            }

            let coord = |value: &str| {
                value.parse::<f64>().map_err(|_| XyzError::InvalidFloat {
                    line: index + 1,
                    value: value.to_string(),
                })
            };
            atoms.push(XyzAtom {
                element: words[0].to_string(),
                pos: Point3::new(coord(words[1])?, coord(words[2])?, coord(words[3])?),
            });

            if atoms_per_model.is_some_and(|n| atoms.len() == n) {
                models.push(std::mem::take(&mut atoms));
            }
        }

        if empty {
            return Err(XyzError::Empty);
        }
        if !atoms.is_empty() {
            models.push(atoms);
        }
        Ok(models)
    }
}
