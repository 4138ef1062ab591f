use crate::core::error::{RelaxError, Result};
use std::fmt;

/// One element of a comma separated identifier list.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Range(i64, i64),
    Name(String),
}

impl Token {
    fn parse(text: &str) -> Self {
        if let Ok(number) = text.parse::<i64>() {
            return Token::Number(number);
        }
        // A range separator is any '-' that is not a leading sign.
        if let Some(split) = text
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)
        {
            let (start, end) = (&text[..split], &text[split + 1..]);
            if let (Ok(start), Ok(end)) = (start.parse::<i64>(), end.parse::<i64>()) {
                return Token::Range(start, end);
            }
        }
        Token::Name(text.to_string())
    }

    fn matches(&self, number: Option<i64>, name: Option<&str>) -> bool {
        match self {
            Token::Number(n) => number == Some(*n),
            Token::Range(start, end) => number.is_some_and(|n| (*start..=*end).contains(&n)),
            Token::Name(pattern) => name.is_some_and(|name| wildcard_match(pattern, name)),
        }
    }
}

/// Glob matching with `*` (any run) and `?` (any single character).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// A parsed `#mol:res@spin` identifier. Missing parts match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    text: String,
    molecules: Option<Vec<Token>>,
    residues: Option<Vec<Token>>,
    spins: Option<Vec<Token>>,
}

fn tokens(part: &str) -> Option<Vec<Token>> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    Some(part.split(',').map(|t| Token::parse(t.trim())).collect())
}

impl Selection {
    /// Parses `#mol:res@spin`, e.g. `#Ap4Aase:2-10,15@N` or `:GLY@*H*`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut selection = Selection {
            text: text.to_string(),
            ..Self::default()
        };
        if text.is_empty() {
            return Ok(selection);
        }

        let invalid = || RelaxError::InvalidData(format!("The selection string '{text}' is invalid."));
        let mol_start = text.find('#');
        let res_start = text.find(':');
        let spin_start = text.find('@');

        if text.matches('#').count() > 1
            || text.matches(':').count() > 1
            || text.matches('@').count() > 1
        {
            return Err(invalid());
        }
        if let (Some(m), Some(r)) = (mol_start, res_start) {
            if r < m {
                return Err(invalid());
            }
        }
        if let Some(s) = spin_start {
            if mol_start.is_some_and(|m| s < m) || res_start.is_some_and(|r| s < r) {
                return Err(invalid());
            }
        }
        if mol_start.or(res_start).or(spin_start) != Some(0) {
            return Err(invalid());
        }

        let end_of = |start: usize, next: &[Option<usize>]| {
            next.iter().flatten().copied().find(|&n| n > start).unwrap_or(text.len())
        };
        if let Some(m) = mol_start {
            selection.molecules = tokens(&text[m + 1..end_of(m, &[res_start, spin_start])]);
        }
        if let Some(r) = res_start {
            selection.residues = tokens(&text[r + 1..end_of(r, &[spin_start])]);
        }
        if let Some(s) = spin_start {
            selection.spins = tokens(&text[s + 1..]);
        }
        Ok(selection)
    }

    /// A selection matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn has_molecule_part(&self) -> bool {
        self.molecules.is_some()
    }

    pub fn contains_mol(&self, name: Option<&str>) -> bool {
        match &self.molecules {
            None => true,
            Some(tokens) => tokens.iter().any(|t| t.matches(None, name)),
        }
    }

    pub fn contains_res(&self, number: Option<i64>, name: Option<&str>) -> bool {
        match &self.residues {
            None => true,
            Some(tokens) => tokens.iter().any(|t| t.matches(number, name)),
        }
    }

    pub fn contains_spin(&self, number: Option<i64>, name: Option<&str>) -> bool {
        match &self.spins {
            None => true,
            Some(tokens) => tokens.iter().any(|t| t.matches(number, name)),
        }
    }

    pub fn contains(
        &self,
        mol_name: Option<&str>,
        res_num: Option<i64>,
        res_name: Option<&str>,
        spin_num: Option<i64>,
        spin_name: Option<&str>,
    ) -> bool {
        self.contains_mol(mol_name)
            && self.contains_res(res_num, res_name)
            && self.contains_spin(spin_num, spin_name)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parses an optional identifier, `None` selecting everything.
pub fn parse_optional(text: Option<&str>) -> Result<Selection> {
    text.map_or_else(|| Ok(Selection::all()), Selection::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_matches_everything() {
        let sel = Selection::parse("").unwrap();
        assert!(sel.contains(Some("x"), Some(1), Some("GLY"), Some(5), Some("N")));
        assert!(sel.contains(None, None, None, None, None));
    }

    #[test]
    fn residue_numbers_ranges_and_names() {
        let sel = Selection::parse(":2-4,7,GLY").unwrap();
        assert!(sel.contains_res(Some(3), Some("ALA")));
        assert!(sel.contains_res(Some(7), None));
        assert!(sel.contains_res(Some(100), Some("GLY")));
        assert!(!sel.contains_res(Some(5), Some("ALA")));
    }

    #[test]
    fn negative_numbers_and_ranges() {
        let sel = Selection::parse(":-5--2").unwrap();
        assert!(sel.contains_res(Some(-3), None));
        assert!(!sel.contains_res(Some(0), None));
        let sel = Selection::parse(":-1").unwrap();
        assert!(sel.contains_res(Some(-1), None));
    }

    #[test]
    fn full_identifier_with_wildcards() {
        let sel = Selection::parse("#Ap4Aase_mol1:10@H*").unwrap();
        assert!(sel.has_molecule_part());
        assert!(sel.contains(Some("Ap4Aase_mol1"), Some(10), None, None, Some("HA2")));
        assert!(!sel.contains(Some("other"), Some(10), None, None, Some("HA2")));
        assert!(!sel.contains(Some("Ap4Aase_mol1"), Some(10), None, None, Some("N")));
    }

    #[test]
    fn spin_only_selection() {
        let sel = Selection::parse("@N,CA").unwrap();
        assert!(sel.contains_spin(None, Some("CA")));
        assert!(!sel.contains_spin(Some(3), Some("C")));
        assert!(sel.contains_res(Some(1), None));
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(Selection::parse("N").is_err());
        assert!(Selection::parse("@N:5").is_err());
        assert!(Selection::parse("::5").is_err());
        assert!(Selection::parse(":5#mol").is_err());
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("H?", "HN"));
        assert!(wildcard_match("*A*", "HA2"));
        assert!(!wildcard_match("H?", "HA2"));
    }
}
