use phf::{phf_map, phf_set};
use std::f64::consts::PI;

/// Planck's constant (J s).
pub const H: f64 = 6.62606876e-34;

/// Dirac's constant, `h / 2π`.
pub const H_BAR: f64 = H / (2.0 * PI);

/// The permeability of free space (T m / A).
pub const MU0: f64 = 4.0 * PI * 1e-7;

/// Default N-H bond length (m).
pub const NH_BOND_LENGTH: f64 = 1.02e-10;

/// Default 15N chemical shift anisotropy (unitless).
pub const N15_CSA: f64 = -172e-6;

/// Chain identifiers in the order they are assigned to molecules.
pub const CHAIN_ID_LIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789abcdefghijklmnopqrstuvwxyz";

/// Unit conversion used when reporting bond lengths.
pub const METRE_TO_ANGSTROM: f64 = 1e10;

/// Unit conversion used when reporting chemical shift anisotropies.
pub const UNITLESS_TO_PPM: f64 = 1e6;

static GYROMAGNETIC_RATIOS: phf::Map<&'static str, f64> = phf_map! {
    "1H" => 26.7522212e7,
    "2H" => 4.10662791e7,
    "13C" => 6.728e7,
    "15N" => -2.7126e7,
    "17O" => -3.628e7,
    "19F" => 25.18148e7,
    "31P" => 10.841e7,
};

/// Returns the gyromagnetic ratio (rad s⁻¹ T⁻¹) of an isotope such as `"15N"`.
pub fn gyromagnetic_ratio(isotope: &str) -> Option<f64> {
    GYROMAGNETIC_RATIOS.get(isotope).copied()
}

/// Standard residue names and their one letter codes, including common
/// protonation and disulfide variants.
static AMINO_ACIDS: phf::Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
    "HSD" => 'H', "HSE" => 'H', "HSP" => 'H', "HID" => 'H', "HIE" => 'H',
    "HIP" => 'H', "CYX" => 'C',
};

pub fn is_amino_acid(res_name: &str) -> bool {
    AMINO_ACIDS.contains_key(res_name)
}

pub fn one_letter_code(res_name: &str) -> Option<char> {
    AMINO_ACIDS.get(res_name).copied()
}

static MAX_CONNECTIONS: phf::Map<&'static str, usize> = phf_map! {
    "H" => 1,
    "O" => 2,
    "N" => 3,
    "C" => 4,
};

/// Maximum number of bonds inferred for an element. Unknown elements are
/// effectively unbounded.
pub fn max_connections(element: &str) -> usize {
    MAX_CONNECTIONS.get(element).copied().unwrap_or(1000)
}

static HET_NAMES: phf::Map<&'static str, &'static str> = phf_map! {
    "TNS" => "Tensor",
    "COM" => "Centre of mass",
    "AXS" => "Tensor axes",
    "SIM" => "Monte Carlo simulation tensor axes",
    "PIV" => "Pivot point",
    "CON" => "Cone",
    "AVE" => "Average vector",
};

/// The chemical name written to HETNAM records for relax specific hetIDs.
pub fn het_name(het_id: &str) -> &'static str {
    HET_NAMES.get(het_id).copied().unwrap_or("Unknown")
}

/// Residue names skipped in the heterogen section of written PDB files.
static SKIPPED_HET: phf::Set<&'static str> = phf_set! { "HOH" };

pub fn is_skipped_het(res_name: &str) -> bool {
    SKIPPED_HET.contains(res_name)
}

static ATOMIC_MASSES: phf::Map<&'static str, f64> = phf_map! {
    "H" => 1.00794,
    "C" => 12.0107,
    "N" => 14.0067,
    "O" => 15.9994,
    "F" => 18.9984032,
    "Na" => 22.98976928,
    "Mg" => 24.3050,
    "P" => 30.973762,
    "S" => 32.065,
    "Cl" => 35.453,
    "K" => 39.0983,
    "Ca" => 40.078,
    "Mn" => 54.938045,
    "Fe" => 55.845,
    "Co" => 58.933195,
    "Ni" => 58.6934,
    "Cu" => 63.546,
    "Zn" => 65.38,
    "Se" => 78.96,
    "Br" => 79.904,
    "I" => 126.90447,
};

/// Standard atomic weight (g/mol) of an element.
pub fn atomic_mass(element: &str) -> Option<f64> {
    ATOMIC_MASSES.get(element).copied()
}

const ELEMENTS: [&str; 54] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe",
];

/// Element symbol for an atomic number.
pub fn element_symbol(atomic_number: usize) -> Option<&'static str> {
    atomic_number
        .checked_sub(1)
        .and_then(|index| ELEMENTS.get(index))
        .copied()
}

/// Whether `symbol` (case insensitive) is a known element.
pub fn is_element(symbol: &str) -> bool {
    ELEMENTS.iter().any(|e| e.eq_ignore_ascii_case(symbol))
}

/// Canonical capitalisation of an element symbol, e.g. `"FE"` to `"Fe"`.
pub fn normalise_element(symbol: &str) -> Option<&'static str> {
    ELEMENTS
        .iter()
        .find(|e| e.eq_ignore_ascii_case(symbol))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_constants_follow_their_definitions() {
        assert!((H_BAR - 1.0545716e-34).abs() < 1e-40);
        assert!((MU0 - 1.2566370614359173e-6).abs() < 1e-20);
    }

    #[test]
    fn gyromagnetic_ratio_lookup_returns_signed_values() {
        assert_eq!(gyromagnetic_ratio("1H"), Some(26.7522212e7));
        assert_eq!(gyromagnetic_ratio("15N"), Some(-2.7126e7));
        assert_eq!(gyromagnetic_ratio("14N"), None);
    }

    #[test]
    fn amino_acid_table_includes_variants() {
        assert!(is_amino_acid("GLY"));
        assert!(is_amino_acid("HSD"));
        assert!(!is_amino_acid("HOH"));
        assert_eq!(one_letter_code("TRP"), Some('W'));
    }

    #[test]
    fn max_connections_defaults_to_unbounded() {
        assert_eq!(max_connections("N"), 3);
        assert_eq!(max_connections("Fe"), 1000);
    }

    #[test]
    fn element_symbols_are_indexed_by_atomic_number() {
        assert_eq!(element_symbol(1), Some("H"));
        assert_eq!(element_symbol(8), Some("O"));
        assert_eq!(element_symbol(0), None);
        assert_eq!(normalise_element("FE"), Some("Fe"));
    }

    #[test]
    fn atomic_masses_cover_biomolecular_elements() {
        assert_eq!(atomic_mass("C"), Some(12.0107));
        assert!(atomic_mass("Xe").is_none());
    }

    #[test]
    fn het_names_fall_back_to_unknown() {
        assert_eq!(het_name("COM"), "Centre of mass");
        assert_eq!(het_name("XYZ"), "Unknown");
        assert!(is_skipped_het("HOH"));
    }
}
