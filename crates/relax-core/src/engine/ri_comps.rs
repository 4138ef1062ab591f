//! Relaxation rate components of an X-H spin pair.
//!
//! The dipolar and CSA interaction constants (with their first and second
//! derivatives with respect to the bond length and CSA), the chemical exchange
//! constant, and the forward R1, R2 and NOE formulae expressed in terms of the
//! spectral density function evaluated at the five frequencies
//! 0, ωX, ωH − ωX, ωH and ωH + ωX.

use crate::core::constants::{H_BAR, MU0};
use std::f64::consts::PI;

/// Value substituted for the dipolar constant and its derivatives at a zero
/// bond length.
pub const ZERO_BOND_LENGTH_CONST: f64 = 1e99;

/// Spectral density values at the frequencies entering R1, R2 and the NOE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralDensities {
    pub j0: f64,
    pub jwx: f64,
    pub jwh_minus_wx: f64,
    pub jwh: f64,
    pub jwh_plus_wx: f64,
}

impl SpectralDensities {
    /// The reduced form, where J(ωH − ωX), J(ωH) and J(ωH + ωX) are all
    /// approximated by J(ωH).
    pub fn reduced(j0: f64, jwx: f64, jwh: f64) -> Self {
        Self {
            j0,
            jwx,
            jwh_minus_wx: jwh,
            jwh,
            jwh_plus_wx: jwh,
        }
    }
}

/// The R1, R2 and steady-state NOE of a spin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationRates {
    pub r1: f64,
    pub r2: f64,
    pub noe: f64,
}

/// Angular Larmor frequencies `(ωH, ωX)` for a proton frequency `frq` in Hz.
#[inline]
pub fn larmor_frequencies(frq: f64, gx: f64, gh: f64) -> (f64, f64) {
    let wh = 2.0 * PI * frq;
    (wh, wh * gx / gh)
}

/// `((μ0/4π)·ħ·γH·γX)²`, the part of the dipolar constant independent of the bond length.
#[inline]
pub fn dip_const_fixed(gx: f64, gh: f64, mu0: f64, h_bar: f64) -> f64 {
    ((mu0 / (4.0 * PI)) * h_bar * gh * gx).powi(2)
}

/// `ωX²/3`, the part of the CSA constant independent of the CSA value.
#[inline]
pub fn csa_const_fixed(wx: f64) -> f64 {
    wx * wx / 3.0
}

/// Dipolar constant `¼ (μ0/4π)² (γX·γH·ħ)² / r⁶`.
#[inline]
pub fn dip_const_func(gx: f64, gh: f64, r: f64) -> f64 {
    if r == 0.0 {
        return ZERO_BOND_LENGTH_CONST;
    }
    0.25 * dip_const_fixed(gx, gh, MU0, H_BAR) * r.powi(-6)
}

/// Derivative of the dipolar constant with respect to the bond length.
#[inline]
pub fn dip_const_grad(gx: f64, gh: f64, r: f64) -> f64 {
    if r == 0.0 {
        return ZERO_BOND_LENGTH_CONST;
    }
    -1.5 * dip_const_fixed(gx, gh, MU0, H_BAR) * r.powi(-7)
}

/// Second derivative of the dipolar constant with respect to the bond length.
#[inline]
pub fn dip_const_hess(gx: f64, gh: f64, r: f64) -> f64 {
    if r == 0.0 {
        return ZERO_BOND_LENGTH_CONST;
    }
    10.5 * dip_const_fixed(gx, gh, MU0, H_BAR) * r.powi(-8)
}

/// CSA constant `(ωX·csa)²/3`.
#[inline]
pub fn csa_const_func(wx: f64, csa: f64) -> f64 {
    csa_const_fixed(wx) * csa * csa
}

#[inline]
pub fn csa_const_grad(wx: f64, csa: f64) -> f64 {
    2.0 * csa_const_fixed(wx) * csa
}

#[inline]
pub fn csa_const_hess(wx: f64) -> f64 {
    2.0 * csa_const_fixed(wx)
}

/// Chemical exchange contribution `ρex·(2π·frq)²`.
#[inline]
pub fn rex_const_func(rhoex: f64, frq: f64) -> f64 {
    rhoex * (2.0 * PI * frq).powi(2)
}

#[inline]
pub fn rex_const_grad(frq: f64) -> f64 {
    (2.0 * PI * frq).powi(2)
}

/// `R1 = d(J(ωH−ωX) + 3J(ωX) + 6J(ωH+ωX)) + c·J(ωX)`.
#[inline]
pub fn r1(dip: f64, csa: f64, j: &SpectralDensities) -> f64 {
    dip * (j.jwh_minus_wx + 3.0 * j.jwx + 6.0 * j.jwh_plus_wx) + csa * j.jwx
}

/// `R2 = d/2(4J(0) + J(ωH−ωX) + 3J(ωX) + 6J(ωH) + 6J(ωH+ωX)) + c/6(4J(0) + 3J(ωX)) + Rex`.
#[inline]
pub fn r2(dip: f64, csa: f64, rex: f64, j: &SpectralDensities) -> f64 {
    let dip_jw = 4.0 * j.j0 + j.jwh_minus_wx + 3.0 * j.jwx + 6.0 * j.jwh + 6.0 * j.jwh_plus_wx;
    let csa_jw = 4.0 * j.j0 + 3.0 * j.jwx;
    dip / 2.0 * dip_jw + csa / 6.0 * csa_jw + rex
}

/// Cross relaxation rate `σNOE = d(6J(ωH+ωX) − J(ωH−ωX))`.
#[inline]
pub fn sigma_noe(dip: f64, j: &SpectralDensities) -> f64 {
    dip * (6.0 * j.jwh_plus_wx - j.jwh_minus_wx)
}

/// `NOE = 1 + (γH/γX)·σNOE/R1`.
#[inline]
pub fn noe(gx: f64, gh: f64, sigma_noe: f64, r1: f64) -> f64 {
    1.0 + (gh / gx) * sigma_noe / r1
}

/// Evaluates all three relaxation rates from the interaction constants.
pub fn relaxation_rates(dip: f64, csa: f64, rex: f64, gx: f64, gh: f64, j: &SpectralDensities) -> RelaxationRates {
    let r1 = r1(dip, csa, j);
    RelaxationRates {
        r1,
        r2: r2(dip, csa, rex, j),
        noe: noe(gx, gh, sigma_noe(dip, j), r1),
    }
}
