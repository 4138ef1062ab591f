//! Connectivity inference for molecules loaded without CONECT records.

use super::containers::{MolContainer, MolType};
use crate::core::constants::max_connections;
use crate::core::error::{RelaxError, Result};
use crate::core::models::selection::wildcard_match;
use itertools::Itertools;

/// Bonds searched for within each residue of a protein.
const PROTEIN_BONDS: [(&str, &str); 6] = [
    ("N", "HN"),
    ("N", "H"),
    ("N", "CA"),
    ("CA", "HA"),
    ("CA", "C"),
    ("C", "O"),
];

/// Default search radius (Å) for distance based bonding.
pub const BOND_RADIUS: f64 = 2.0;

/// Connects the backbone atoms of each residue. Residues are the runs of
/// consecutive atoms sharing a residue number.
pub fn protein_connect(mol: &mut MolContainer) {
    let runs: Vec<(usize, usize)> = mol
        .res_num
        .iter()
        .enumerate()
        .chunk_by(|(_, num)| **num)
        .into_iter()
        .filter_map(|(_, mut run)| {
            let (start, _) = run.next()?;
            let end = run.last().map_or(start, |(i, _)| i);
            Some((start, end))
        })
        .collect();

    let mut pairs = Vec::new();
    for (start, end) in runs {
        let last_named = |name: &str| {
            (start..=end)
                .rev()
                .find(|&i| mol.atom_name[i].as_deref() == Some(name))
        };
        for (a, b) in PROTEIN_BONDS {
            if let (Some(i), Some(j)) = (last_named(a), last_named(b)) {
                pairs.push((i, j));
            }
        }
    }
    for (i, j) in pairs {
        mol.atom_connect(i, j);
    }
}

/// Bonds atom `index` to its nearest neighbours within `radius`, up to the
/// element's maximum connectivity. Hydrogen pairs are never bonded.
pub fn find_bonded_atoms(mol: &mut MolContainer, index: usize, radius: f64) {
    let pos = mol.pos(index);
    let element = mol.element[index].clone().unwrap_or_default();
    let is_h = |e: &Option<String>| e.as_deref() == Some("H");

    let neighbours: Vec<(usize, f64)> = (0..mol.len())
        .filter(|&i| i != index)
        .filter(|&i| !(element == "H" && is_h(&mol.element[i])))
        .map(|i| (i, (mol.pos(i) - pos).norm()))
        .filter(|&(_, dist)| dist < radius)
        .sorted_by(|a, b| a.1.total_cmp(&b.1))
        .collect();

    let max = max_connections(&element);
    for (i, _) in neighbours.into_iter().take(max) {
        mol.atom_connect(index, i);
    }
}

/// Builds the connectivity of a molecule: the backbone template for
/// proteins, otherwise a distance search around every atom.
pub fn build_connectivity(mol: &mut MolContainer, index: usize) {
    match mol.mol_type() {
        MolType::Protein => protein_connect(mol),
        MolType::Other => find_bonded_atoms(mol, index, BOND_RADIUS),
    }
}

/// The index of the atom bonded to `index` whose name matches the pattern
/// `attached_atom`.
pub fn bonded_atom(mol: &mut MolContainer, index: usize, attached_atom: &str) -> Result<usize> {
    if mol.bonded[index].is_empty() {
        build_connectivity(mol, index);
    }

    let matches: Vec<usize> = mol.bonded[index]
        .iter()
        .copied()
        .filter(|&b| {
            mol.atom_name[b]
                .as_deref()
                .is_some_and(|name| wildcard_match(attached_atom, name))
        })
        .collect();

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(RelaxError::Structure(
            "No attached atom could be found".to_string(),
        )),
        many => {
            let names = many
                .iter()
                .map(|&b| format!("'{}'", mol.atom_name[b].as_deref().unwrap_or("None")))
                .join(", ");
            Err(RelaxError::Structure(format!(
                "More than one attached atom found: [{names}]"
            )))
        }
    }
}
