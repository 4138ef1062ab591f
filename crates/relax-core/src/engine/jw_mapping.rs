use super::ri_comps::{ZERO_BOND_LENGTH_CONST, csa_const_fixed, dip_const_fixed, larmor_frequencies};

/// The reduced spectral density mapping equations at a single proton
/// frequency.
///
/// Everything that does not depend on the per-spin bond length and CSA is
/// computed once in [`Mapping::new`]; [`Mapping::func`] then inverts the
/// reduced R1, R2 and NOE expressions for J(0), J(ωX) and J(ωH).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mapping {
    gx: f64,
    gh: f64,
    dip_const_fixed: f64,
    csa_const_fixed: f64,
}

impl Mapping {
    pub fn new(frq: f64, gx: f64, gh: f64, mu0: f64, h_bar: f64) -> Self {
        let (_, wx) = larmor_frequencies(frq, gx, gh);
        Self {
            gx,
            gh,
            dip_const_fixed: dip_const_fixed(gx, gh, mu0, h_bar),
            csa_const_fixed: csa_const_fixed(wx),
        }
    }

    pub fn dip_const_fixed(&self) -> f64 {
        self.dip_const_fixed
    }

    pub fn csa_const_fixed(&self) -> f64 {
        self.csa_const_fixed
    }

    /// Returns `(J(0), J(ωX), J(ωH))` for one spin.
    pub fn func(&self, r: f64, csa: f64, r1: f64, r2: f64, noe: f64) -> (f64, f64, f64) {
        let d = if r == 0.0 {
            ZERO_BOND_LENGTH_CONST
        } else {
            0.25 * self.dip_const_fixed * r.powi(-6)
        };
        let c = self.csa_const_fixed * csa * csa;

        let sigma_noe = (noe - 1.0) * r1 * (self.gx / self.gh);

        let jwh = sigma_noe / (5.0 * d);
        let jwx = (r1 - 1.4 * sigma_noe) / (3.0 * d + c);
        let j0 = -1.5 / (3.0 * d + c) * (0.5 * r1 - r2 + 0.6 * sigma_noe);

        (j0, jwx, jwh)
    }
}
