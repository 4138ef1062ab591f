//! The reduced spectral density mapping analysis of a data pipe.
//!
//! The analysis maps the R1, R2 and NOE measured at one spectrometer
//! frequency onto J(0), J(ωX) and J(ωH) for every selected spin, with
//! optional Monte Carlo simulations to propagate the relaxation data errors.

use crate::core::constants::{H_BAR, MU0, N15_CSA, NH_BOND_LENGTH, gyromagnetic_ratio};
use crate::core::error::{RelaxError, Result};
use crate::core::models::mol_res_spin::{SpinContainer, SpinParam};
use crate::core::models::pipe::{PipeContainer, PipeType, RiType};
use crate::core::models::selection::{Selection, parse_optional};
use crate::core::store::DataStore;
use crate::engine::config::JwMappingConfig;
use crate::engine::jw_mapping::Mapping;
use crate::engine::monte_carlo::{NoiseGenerator, SimPoint, map_simulations, std_dev};
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument, warn};

/// The isotope of the proton of the X-H pair.
const PROTON: &str = "1H";

/// Minimum number of relaxation data points for a spin to stay selected.
const MIN_DATA_POINTS: usize = 3;

/// Outcome of [`run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JwMappingReport {
    pub deselected: usize,
    pub calculated: usize,
    pub simulations: usize,
}

fn current_pipe_name(store: &DataStore) -> String {
    store.current_name().unwrap_or_default().to_string()
}

/// Sets the proton frequency (Hz) whose relaxation data is mapped.
pub fn set_frq(store: &mut DataStore, frq: f64) -> Result<()> {
    let pipe_name = current_pipe_name(store);
    let pipe = store.current_mut()?;
    if pipe.pipe_type != PipeType::JwMapping {
        return Err(RelaxError::PipeType {
            expected: PipeType::JwMapping.as_str(),
            found: pipe.pipe_type.to_string(),
        });
    }
    if pipe.jw_frq.is_some() {
        return Err(RelaxError::FrequencyAlreadySet { pipe: pipe_name });
    }
    pipe.jw_frq = Some(frq);
    info!(frq, "Set the spectral density mapping frequency");
    Ok(())
}

/// Sets the bond length and CSA of the selected spins to the N-H defaults.
pub fn set_default_values(store: &mut DataStore, spin_id: Option<&str>) -> Result<usize> {
    let selection = parse_optional(spin_id)?;
    let pipe = store.current_mut()?;
    let mut count = 0;
    for entry in pipe.spin_loop_mut(&selection) {
        if !entry.spin.select {
            continue;
        }
        entry.spin.csa.value = Some(N15_CSA);
        entry.spin.r.value = Some(NH_BOND_LENGTH);
        count += 1;
    }
    Ok(count)
}

/// The names of the per-spin data structures of the analysis.
pub fn data_names() -> Vec<&'static str> {
    SpinParam::ALL.iter().map(|p| p.name()).collect()
}

type CharClass = fn(char) -> bool;

fn letter_j(c: char) -> bool {
    matches!(c, 'J' | 'j')
}
fn letter_w(c: char) -> bool {
    c == 'w'
}
fn letter_x(c: char) -> bool {
    matches!(c, 'X' | 'x')
}
fn letter_h(c: char) -> bool {
    matches!(c, 'H' | 'h')
}
fn zero(c: char) -> bool {
    c == '0'
}
fn open(c: char) -> bool {
    c == '('
}
fn close(c: char) -> bool {
    c == ')'
}

/// True when the whole name matches the character classes.
fn full_match(name: &str, pattern: &[CharClass]) -> bool {
    let chars: Vec<char> = name.chars().collect();
    chars.len() == pattern.len() && chars.iter().zip(pattern).all(|(&c, class)| class(c))
}

/// True when the classes match anywhere in the name.
fn search(name: &str, pattern: &[CharClass]) -> bool {
    let chars: Vec<char> = name.chars().collect();
    chars
        .windows(pattern.len())
        .any(|window| window.iter().zip(pattern).all(|(&c, class)| class(c)))
}

fn is_bond_length(name: &str) -> bool {
    let bond_length: [CharClass; 11] = [
        |c| matches!(c, 'B' | 'b'),
        |c| c == 'o',
        |c| c == 'n',
        |c| c == 'd',
        // Any character from the space to the underscore.
        |c| (' '..='_').contains(&c),
        |c| matches!(c, 'L' | 'l'),
        |c| c == 'e',
        |c| c == 'n',
        |c| c == 'g',
        |c| c == 't',
        |c| c == 'h',
    ];
    search(name, &bond_length)
}

/// Maps a user supplied data type name onto the spin parameter it denotes.
pub fn return_data_name(name: &str) -> Option<SpinParam> {
    if full_match(name, &[letter_j, zero]) || search(name, &[letter_j, open, zero, close]) {
        return Some(SpinParam::J0);
    }
    if full_match(name, &[letter_j, letter_w, letter_x])
        || search(name, &[letter_j, open, letter_w, letter_x, close])
    {
        return Some(SpinParam::Jwx);
    }
    if full_match(name, &[letter_j, letter_w, letter_h])
        || search(name, &[letter_j, open, letter_w, letter_h, close])
    {
        return Some(SpinParam::Jwh);
    }
    if name == "r" || is_bond_length(name) {
        return Some(SpinParam::R);
    }
    if name.eq_ignore_ascii_case("csa") {
        return Some(SpinParam::Csa);
    }
    None
}

/// The external units of a data type.
pub fn return_units(name: &str) -> Option<&'static str> {
    match return_data_name(name)? {
        SpinParam::R => Some("Angstrom"),
        SpinParam::Csa => Some("ppm"),
        _ => None,
    }
}

pub fn default_value(name: &str) -> Option<f64> {
    match return_data_name(name)? {
        SpinParam::R => Some(NH_BOND_LENGTH),
        SpinParam::Csa => Some(N15_CSA),
        _ => None,
    }
}

/// Sets a parameter value, and optionally its error, on the selected spins.
/// A missing value falls back to the default of the parameter.
pub fn set_value(
    store: &mut DataStore,
    spin_id: Option<&str>,
    name: &str,
    value: Option<f64>,
    error: Option<f64>,
) -> Result<usize> {
    let param = return_data_name(name).ok_or_else(|| RelaxError::UnknownDataName(name.to_string()))?;
    let value = value
        .or_else(|| default_value(name))
        .ok_or_else(|| RelaxError::NoValue {
            name: param.name().to_string(),
        })?;
    let selection = parse_optional(spin_id)?;
    let pipe = store.current_mut()?;
    let mut count = 0;
    for entry in pipe.spin_loop_mut(&selection) {
        if !entry.spin.select {
            continue;
        }
        let target = entry.spin.param_mut(param);
        target.value = Some(value);
        if error.is_some() {
            target.error = error;
        }
        count += 1;
    }
    debug!(param = %param, value, spins = count, "Set a spin parameter");
    Ok(count)
}

/// Deselects spins without enough relaxation data for the mapping. Returns
/// the number of spins deselected.
pub fn overfit_deselect(store: &mut DataStore) -> Result<usize> {
    let pipe_name = current_pipe_name(store);
    let pipe = store.current_mut()?;
    if !pipe.exists_mol_res_spin_data() {
        return Err(RelaxError::NoSequence { pipe: pipe_name });
    }

    let mut deselected = 0;
    for entry in pipe.spin_loop_mut(&Selection::all()) {
        if !entry.spin.select {
            continue;
        }
        if entry.spin.ri_data.is_empty() {
            warn!("No relaxation data could be found, deselecting the spin '{}'.", entry.id);
        } else if entry.spin.ri_data.len() < MIN_DATA_POINTS {
            warn!(
                "Insufficient relaxation data, {} points, deselecting the spin '{}'.",
                entry.spin.ri_data.len(),
                entry.id
            );
        } else {
            continue;
        }
        entry.spin.select = false;
        deselected += 1;
    }
    Ok(deselected)
}

/// The ri ids of each relaxation data type measured at the frequency.
struct FrequencyIds {
    r1: Vec<String>,
    r2: Vec<String>,
    noe: Vec<String>,
}

impl FrequencyIds {
    fn new(pipe: &PipeContainer, frq: f64) -> Self {
        let ids = |ri_type: RiType| -> Vec<String> {
            pipe.ri_ids
                .iter()
                .filter(|id| pipe.spectrometer_frq.get(*id) == Some(&frq))
                .filter(|id| pipe.ri_type.get(*id) == Some(&ri_type))
                .cloned()
                .collect()
        };
        Self {
            r1: ids(RiType::R1),
            r2: ids(RiType::R2),
            noe: ids(RiType::Noe),
        }
    }

    /// The last data set of each type present for the spin.
    fn values(&self, spin: &SpinContainer, sim_index: Option<usize>) -> Option<(f64, f64, f64)> {
        let value = |ids: &[String]| {
            ids.iter().rev().find_map(|id| match sim_index {
                None => spin.ri_data.get(id).copied(),
                Some(i) => spin.ri_data_sim.get(id).and_then(|sims| sims.get(i)).copied(),
            })
        };
        Some((value(&self.r1)?, value(&self.r2)?, value(&self.noe)?))
    }
}

/// Checks everything the mapping needs and returns the frequency.
fn check_calculation(store: &DataStore, selection: &Selection) -> Result<f64> {
    let pipe = store.current()?;
    let frq = pipe.jw_frq.ok_or(RelaxError::NoFrequency)?;

    let spins = pipe.spin_loop(selection);
    if spins
        .iter()
        .any(|view| view.spin.select && view.spin.isotope.is_none())
    {
        return Err(RelaxError::Nucleus);
    }
    if !pipe.exists_mol_res_spin_data() {
        return Err(RelaxError::NoSequence {
            pipe: current_pipe_name(store),
        });
    }
    for view in spins.iter().filter(|view| view.spin.select) {
        if view.spin.csa.value.is_none() {
            return Err(RelaxError::NoValue { name: "CSA".to_string() });
        }
        if view.spin.r.value.is_none() {
            return Err(RelaxError::NoValue {
                name: "bond length".to_string(),
            });
        }
    }
    if !pipe.frequencies().contains(&frq) {
        return Err(RelaxError::NoRiData { frequency: frq });
    }
    Ok(frq)
}

fn check_sim_index(pipe: &PipeContainer, sim_index: Option<usize>) -> Result<()> {
    if let Some(index) = sim_index {
        let num = pipe.sim_number.ok_or(RelaxError::NoSimulations)?;
        if index >= num {
            return Err(RelaxError::SimIndex { index, num });
        }
    }
    Ok(())
}

fn gyro(isotope: &str) -> Result<f64> {
    gyromagnetic_ratio(isotope).ok_or_else(|| {
        RelaxError::General(format!(
            "The gyromagnetic ratio of the isotope '{isotope}' is unknown."
        ))
    })
}

fn store_sim(sim: &mut Vec<f64>, index: usize, value: f64) {
    if index >= sim.len() {
        sim.resize(index + 1, f64::NAN);
    }
    sim[index] = value;
}

fn calculate_with_proton(
    store: &mut DataStore,
    selection: &Selection,
    sim_index: Option<usize>,
    gh: f64,
) -> Result<usize> {
    let frq = check_calculation(store, selection)?;
    let pipe = store.current_mut()?;
    check_sim_index(pipe, sim_index)?;
    let ids = FrequencyIds::new(pipe, frq);

    let mut calculated = 0;
    for entry in pipe.spin_loop_mut(selection) {
        let spin = entry.spin;
        if !spin.select {
            continue;
        }
        let Some((r1, r2, noe)) = ids.values(spin, sim_index) else {
            debug!(spin = entry.id, "Missing R1, R2 or NOE, skipping the spin");
            continue;
        };
        let (Some(r), Some(csa), Some(isotope)) = (spin.r.value, spin.csa.value, spin.isotope.as_deref()) else {
            continue;
        };
        let mapping = Mapping::new(frq, gyro(isotope)?, gh, MU0, H_BAR);
        let (j0, jwx, jwh) = match sim_index {
            None => mapping.func(r, csa, r1, r2, noe),
            Some(i) => mapping.func(
                spin.r.sim.get(i).copied().unwrap_or(r),
                spin.csa.sim.get(i).copied().unwrap_or(csa),
                r1,
                r2,
                noe,
            ),
        };

        match sim_index {
            None => {
                spin.j0.value = Some(j0);
                spin.jwx.value = Some(jwx);
                spin.jwh.value = Some(jwh);
            }
            Some(i) => {
                store_sim(&mut spin.j0.sim, i, j0);
                store_sim(&mut spin.jwx.sim, i, jwx);
                store_sim(&mut spin.jwh.sim, i, jwh);
            }
        }
        calculated += 1;
    }
    Ok(calculated)
}

/// Calculates J(0), J(ωX) and J(ωH) of the selected spins, from the
/// measured data or, with `sim_index`, from one Monte Carlo simulation.
/// Returns the number of spins calculated.
pub fn calculate(store: &mut DataStore, spin_id: Option<&str>, sim_index: Option<usize>) -> Result<usize> {
    let selection = parse_optional(spin_id)?;
    calculate_with_proton(store, &selection, sim_index, gyro(PROTON)?)
}

/// Sets up `number` Monte Carlo simulations for the current pipe.
pub fn monte_carlo_setup(store: &mut DataStore, number: usize) -> Result<()> {
    if number == 0 {
        return Err(RelaxError::InvalidData(
            "The number of Monte Carlo simulations must be at least one.".to_string(),
        ));
    }
    let pipe = store.current_mut()?;
    pipe.sim_number = Some(number);
    pipe.sim_state = true;
    info!(number, "Set up the Monte Carlo simulations");
    Ok(())
}

/// Randomises the relaxation data of the selected spins, drawing each
/// simulated value from a normal distribution centred on the measured value
/// with the measurement error as standard deviation.
pub fn monte_carlo_create_data(store: &mut DataStore, seed: Option<u64>) -> Result<()> {
    create_sim_data(store, &Selection::all(), seed)
}

fn create_sim_data(store: &mut DataStore, selection: &Selection, seed: Option<u64>) -> Result<()> {
    let pipe = store.current_mut()?;
    let number = pipe.sim_number.ok_or(RelaxError::NoSimulations)?;
    if pipe
        .spin_loop(selection)
        .iter()
        .any(|view| view.spin.select && !view.spin.ri_data_sim.is_empty())
    {
        return Err(RelaxError::General(
            "Monte Carlo simulation data already exists.".to_string(),
        ));
    }
    let mut generator = NoiseGenerator::new(seed);

    for entry in pipe.spin_loop_mut(selection) {
        let spin = entry.spin;
        if !spin.select {
            continue;
        }
        let mut sims = Vec::with_capacity(spin.ri_data.len());
        for (ri_id, &value) in &spin.ri_data {
            let error = spin.ri_data_err.get(ri_id).copied().ok_or_else(|| {
                RelaxError::NoValue {
                    name: format!("relaxation data error of '{ri_id}' for the spin '{}'", entry.id),
                }
            })?;
            sims.push((ri_id.clone(), generator.simulate(value, error, number)?));
        }
        spin.ri_data_sim.extend(sims);
    }
    Ok(())
}

/// Copies the bond length and CSA of the selected spins into every
/// simulation.
pub fn monte_carlo_initial_values(store: &mut DataStore) -> Result<()> {
    copy_initial_values(store, &Selection::all())
}

fn copy_initial_values(store: &mut DataStore, selection: &Selection) -> Result<()> {
    let pipe = store.current_mut()?;
    let number = pipe.sim_number.ok_or(RelaxError::NoSimulations)?;
    for entry in pipe.spin_loop_mut(selection) {
        let spin = entry.spin;
        if !spin.select {
            continue;
        }
        for param in [SpinParam::R, SpinParam::Csa] {
            let target = spin.param_mut(param);
            if let Some(value) = target.value {
                target.sim = vec![value; number];
            }
        }
    }
    Ok(())
}

/// Calculates every simulation of the selected spins at once, evaluating the
/// simulations of a spin in parallel.
fn monte_carlo_calculate(
    store: &mut DataStore,
    selection: &Selection,
    gh: f64,
    reporter: &ProgressReporter,
) -> Result<usize> {
    let frq = check_calculation(store, selection)?;
    let pipe = store.current_mut()?;
    let number = pipe.sim_number.ok_or(RelaxError::NoSimulations)?;
    let ids = FrequencyIds::new(pipe, frq);

    let mut calculated = 0;
    for entry in pipe.spin_loop_mut(selection) {
        reporter.report(Progress::TaskIncrement);
        let spin = entry.spin;
        if !spin.select {
            continue;
        }
        let (Some(r), Some(csa), Some(isotope)) = (spin.r.value, spin.csa.value, spin.isotope.clone()) else {
            continue;
        };
        let points: Option<Vec<SimPoint>> = (0..number)
            .map(|i| {
                let (r1, r2, noe) = ids.values(spin, Some(i))?;
                Some(SimPoint {
                    r: spin.r.sim.get(i).copied().unwrap_or(r),
                    csa: spin.csa.sim.get(i).copied().unwrap_or(csa),
                    r1,
                    r2,
                    noe,
                })
            })
            .collect();
        let Some(points) = points else {
            debug!(spin = entry.id, "Incomplete simulation data, skipping the spin");
            continue;
        };

        let mapping = Mapping::new(frq, gyro(&isotope)?, gh, MU0, H_BAR);
        let results = map_simulations(&mapping, &points);
        spin.j0.sim = results.iter().map(|j| j.0).collect();
        spin.jwx.sim = results.iter().map(|j| j.1).collect();
        spin.jwh.sim = results.iter().map(|j| j.2).collect();
        calculated += 1;
    }
    Ok(calculated)
}

/// Sets the error of each mapped value to the standard deviation of its
/// simulations and ends the simulation state.
pub fn monte_carlo_error_analysis(store: &mut DataStore) -> Result<()> {
    analyse_sim_errors(store, &Selection::all())
}

fn analyse_sim_errors(store: &mut DataStore, selection: &Selection) -> Result<()> {
    let pipe = store.current_mut()?;
    if pipe.sim_number.is_none() {
        return Err(RelaxError::NoSimulations);
    }
    for entry in pipe.spin_loop_mut(selection) {
        let spin = entry.spin;
        if !spin.select {
            continue;
        }
        for param in [SpinParam::J0, SpinParam::Jwx, SpinParam::Jwh] {
            let target = spin.param_mut(param);
            if let Some(sd) = std_dev(&target.sim) {
                target.error = Some(sd);
            }
        }
    }
    pipe.sim_state = false;
    Ok(())
}

/// Runs the complete analysis on the current pipe: frequency, nucleus and
/// parameter setup, optional deselection, the mapping itself and the Monte
/// Carlo error analysis.
#[instrument(skip_all, name = "jw_mapping_workflow")]
pub fn run(store: &mut DataStore, config: &JwMappingConfig, reporter: &ProgressReporter) -> Result<JwMappingReport> {
    let selection = parse_optional(config.spin_id.as_deref())?;
    let spin_id = config.spin_id.as_deref();
    let gh = gyro(&config.proton)?;
    let mut report = JwMappingReport::default();

    reporter.phase("Setup", || -> Result<()> {
        if store.current()?.jw_frq != Some(config.frequency) {
            set_frq(store, config.frequency)?;
        }
        let pipe_name = current_pipe_name(store);
        let pipe = store.current_mut()?;
        if !pipe.exists_mol_res_spin_data() {
            return Err(RelaxError::NoSequence { pipe: pipe_name });
        }
        for entry in pipe.spin_loop_mut(&selection) {
            if entry.spin.isotope.is_none() {
                entry.spin.isotope = Some(config.heteronucleus.clone());
            }
        }
        set_value(store, spin_id, "r", Some(config.bond_length), None)?;
        set_value(store, spin_id, "csa", Some(config.csa), None)?;
        if config.overfit_deselect {
            report.deselected = overfit_deselect(store)?;
        }
        Ok(())
    })?;

    report.calculated = reporter.phase("Mapping", || {
        calculate_with_proton(store, &selection, None, gh)
    })?;
    info!(
        spins = report.calculated,
        deselected = report.deselected,
        "Reduced spectral density mapping complete"
    );

    if config.simulations > 0 {
        reporter.phase("Monte Carlo", || -> Result<()> {
            monte_carlo_setup(store, config.simulations)?;
            create_sim_data(store, &selection, config.seed)?;
            copy_initial_values(store, &selection)?;
            let total = store.current()?.count_spins(&selection) as u64;
            reporter.report(Progress::TaskStart { total_steps: total });
            monte_carlo_calculate(store, &selection, gh, reporter)?;
            reporter.report(Progress::TaskFinish);
            analyse_sim_errors(store, &selection)
        })?;
        report.simulations = config.simulations;
        info!(simulations = config.simulations, "Monte Carlo error analysis complete");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::JwMappingConfigBuilder;
    use crate::engine::ri_comps::{
        SpectralDensities, csa_const_func, dip_const_func, larmor_frequencies, relaxation_rates,
    };

    const FRQ: f64 = 600e6;

    fn rates_for(j0: f64, jwx: f64, jwh: f64) -> (f64, f64, f64) {
        let gx = gyromagnetic_ratio("15N").unwrap();
        let gh = gyromagnetic_ratio("1H").unwrap();
        let (_, wx) = larmor_frequencies(FRQ, gx, gh);
        let rates = relaxation_rates(
            dip_const_func(gx, gh, NH_BOND_LENGTH),
            csa_const_func(wx, N15_CSA),
            0.0,
            gx,
            gh,
            &SpectralDensities::reduced(j0, jwx, jwh),
        );
        (rates.r1, rates.r2, rates.noe)
    }

    /// A jw pipe with two complete spins and one spin lacking the NOE.
    fn loaded_store() -> DataStore {
        let mut store = DataStore::new();
        store.add("jw", "jw", None, true).unwrap();
        let pipe = store.current_mut().unwrap();
        for id in ["R1_600", "R2_600", "NOE_600"] {
            pipe.ri_ids.push(id.to_string());
            pipe.spectrometer_frq.insert(id.to_string(), FRQ);
        }
        pipe.ri_type.insert("R1_600".into(), RiType::R1);
        pipe.ri_type.insert("R2_600".into(), RiType::R2);
        pipe.ri_type.insert("NOE_600".into(), RiType::Noe);

        for (num, j) in [(1, (4.0e-9, 2.5e-10, 5.0e-12)), (2, (6.0e-9, 3.0e-10, 3.0e-12))] {
            let (r1, r2, noe) = rates_for(j.0, j.1, j.2);
            let spin = pipe
                .generate_spin(Some("Ubi"), Some(num), Some("ALA"), None, Some("N"), true)
                .unwrap();
            spin.isotope = Some("15N".into());
            spin.ri_data.insert("R1_600".into(), r1);
            spin.ri_data.insert("R2_600".into(), r2);
            spin.ri_data.insert("NOE_600".into(), noe);
            spin.ri_data_err.insert("R1_600".into(), 0.02);
            spin.ri_data_err.insert("R2_600".into(), 0.3);
            spin.ri_data_err.insert("NOE_600".into(), 0.05);
        }
        let spin = pipe
            .generate_spin(Some("Ubi"), Some(3), Some("GLY"), None, Some("N"), true)
            .unwrap();
        spin.isotope = Some("15N".into());
        spin.ri_data.insert("R1_600".into(), 1.1);
        spin.ri_data.insert("R2_600".into(), 11.0);
        spin.ri_data_err.insert("R1_600".into(), 0.02);
        spin.ri_data_err.insert("R2_600".into(), 0.3);
        store
    }

    fn spin<'a>(store: &'a DataStore, id: &str) -> &'a SpinContainer {
        store.current().unwrap().return_spin(id).unwrap().unwrap().spin
    }

    mod setup {
        use super::*;

        #[test]
        fn frequency_requires_a_jw_pipe_and_is_set_once() {
            let mut store = DataStore::new();
            store.add("mf", "mf", None, true).unwrap();
            assert!(matches!(
                set_frq(&mut store, FRQ),
                Err(RelaxError::PipeType { expected: "jw", .. })
            ));

            store.add("jw", "jw", None, true).unwrap();
            set_frq(&mut store, FRQ).unwrap();
            assert_eq!(store.current().unwrap().jw_frq, Some(FRQ));
            assert!(matches!(
                set_frq(&mut store, FRQ),
                Err(RelaxError::FrequencyAlreadySet { .. })
            ));
        }

        #[test]
        fn default_values_skip_deselected_spins() {
            let mut store = loaded_store();
            store
                .current_mut()
                .unwrap()
                .spin_loop_mut(&Selection::parse(":3").unwrap())[0]
                .spin
                .select = false;
            assert_eq!(set_default_values(&mut store, None).unwrap(), 2);
            assert_eq!(spin(&store, ":1").r.value, Some(1.02e-10));
            assert_eq!(spin(&store, ":2").csa.value, Some(-172e-6));
            assert_eq!(spin(&store, ":3").r.value, None);
        }

        #[test]
        fn overfit_deselect_needs_three_data_points() {
            let mut store = loaded_store();
            assert_eq!(overfit_deselect(&mut store).unwrap(), 1);
            assert!(spin(&store, ":1").select);
            assert!(!spin(&store, ":3").select);

            let mut empty = DataStore::new();
            empty.add("jw", "jw", None, true).unwrap();
            assert!(matches!(
                overfit_deselect(&mut empty),
                Err(RelaxError::NoSequence { .. })
            ));
        }
    }

    mod data_names {
        use super::*;

        #[test]
        fn patterns_map_onto_parameters() {
            assert_eq!(data_names(), vec!["r", "csa", "j0", "jwx", "jwh"]);
            for (name, param) in [
                ("J0", SpinParam::J0),
                ("j0", SpinParam::J0),
                ("J(0)", SpinParam::J0),
                ("JwX", SpinParam::Jwx),
                ("my j(wx) data", SpinParam::Jwx),
                ("jwh", SpinParam::Jwh),
                ("J(wH)", SpinParam::Jwh),
                ("r", SpinParam::R),
                ("Bond length", SpinParam::R),
                ("bond-Length", SpinParam::R),
                ("bond_length", SpinParam::R),
                ("CSA", SpinParam::Csa),
                ("cSa", SpinParam::Csa),
            ] {
                assert_eq!(return_data_name(name), Some(param), "{name}");
            }
            for name in ["J00", "Jw", "R", "csa2", "bondlength", "JWx"] {
                assert_eq!(return_data_name(name), None, "{name}");
            }
        }

        #[test]
        fn units_and_defaults() {
            assert_eq!(return_units("r"), Some("Angstrom"));
            assert_eq!(return_units("CSA"), Some("ppm"));
            assert_eq!(return_units("j0"), None);
            assert_eq!(default_value("bond length"), Some(1.02e-10));
            assert_eq!(default_value("csa"), Some(-172e-6));
            assert_eq!(default_value("J(0)"), None);
        }

        #[test]
        fn set_value_goes_through_the_name_matching() {
            let mut store = loaded_store();
            assert_eq!(set_value(&mut store, Some(":1"), "Bond length", Some(1.04e-10), Some(1e-12)).unwrap(), 1);
            let r = &spin(&store, ":1").r;
            assert_eq!(r.value, Some(1.04e-10));
            assert_eq!(r.error, Some(1e-12));

            assert_eq!(set_value(&mut store, None, "csa", None, None).unwrap(), 3);
            assert_eq!(spin(&store, ":2").csa.value, Some(-172e-6));

            assert!(matches!(
                set_value(&mut store, None, "S2", Some(0.8), None),
                Err(RelaxError::UnknownDataName(_))
            ));
            assert!(matches!(
                set_value(&mut store, None, "j0", None, None),
                Err(RelaxError::NoValue { .. })
            ));
        }
    }

    mod calculation {
        use super::*;

        fn ready_store() -> DataStore {
            let mut store = loaded_store();
            set_frq(&mut store, FRQ).unwrap();
            set_default_values(&mut store, None).unwrap();
            store
        }

        #[test]
        fn preconditions_are_checked_in_order() {
            let mut store = DataStore::new();
            assert!(matches!(calculate(&mut store, None, None), Err(RelaxError::NoCurrentPipe)));

            let mut store = loaded_store();
            assert!(matches!(calculate(&mut store, None, None), Err(RelaxError::NoFrequency)));

            set_frq(&mut store, FRQ).unwrap();
            store
                .current_mut()
                .unwrap()
                .spin_loop_mut(&Selection::parse(":2").unwrap())[0]
                .spin
                .isotope = None;
            assert!(matches!(calculate(&mut store, None, None), Err(RelaxError::Nucleus)));

            let mut empty = DataStore::new();
            empty.add("jw", "jw", None, true).unwrap();
            set_frq(&mut empty, FRQ).unwrap();
            assert!(matches!(calculate(&mut empty, None, None), Err(RelaxError::NoSequence { .. })));

            let mut store = loaded_store();
            set_frq(&mut store, FRQ).unwrap();
            set_value(&mut store, None, "r", None, None).unwrap();
            assert!(matches!(
                calculate(&mut store, None, None),
                Err(RelaxError::NoValue { ref name }) if name == "CSA"
            ));
            set_value(&mut store, None, "csa", None, None).unwrap();
            set_value(&mut store, None, "r", None, None).unwrap();
            store.current_mut().unwrap().jw_frq = Some(500e6);
            assert!(matches!(
                calculate(&mut store, None, None),
                Err(RelaxError::NoRiData { frequency }) if frequency == 500e6
            ));
        }

        #[test]
        fn missing_bond_length_is_reported() {
            let mut store = loaded_store();
            set_frq(&mut store, FRQ).unwrap();
            set_value(&mut store, None, "csa", None, None).unwrap();
            assert!(matches!(
                calculate(&mut store, None, None),
                Err(RelaxError::NoValue { ref name }) if name == "bond length"
            ));
        }

        #[test]
        fn recovers_the_spectral_densities() {
            let mut store = ready_store();
            assert_eq!(calculate(&mut store, None, None).unwrap(), 2);

            let first = spin(&store, ":1");
            assert!((first.j0.value.unwrap() / 4.0e-9 - 1.0).abs() < 1e-9);
            assert!((first.jwx.value.unwrap() / 2.5e-10 - 1.0).abs() < 1e-9);
            assert!((first.jwh.value.unwrap() / 5.0e-12 - 1.0).abs() < 1e-9);
            assert!((spin(&store, ":2").j0.value.unwrap() / 6.0e-9 - 1.0).abs() < 1e-9);
            assert_eq!(spin(&store, ":3").j0.value, None);
        }

        #[test]
        fn simulation_indices_are_validated() {
            let mut store = ready_store();
            assert!(matches!(
                calculate(&mut store, None, Some(0)),
                Err(RelaxError::NoSimulations)
            ));
            monte_carlo_setup(&mut store, 2).unwrap();
            assert!(matches!(
                calculate(&mut store, None, Some(2)),
                Err(RelaxError::SimIndex { index: 2, num: 2 })
            ));
        }

        #[test]
        fn single_simulations_match_the_batched_evaluation() {
            let mut store = ready_store();
            monte_carlo_setup(&mut store, 5).unwrap();
            monte_carlo_create_data(&mut store, Some(3)).unwrap();
            monte_carlo_initial_values(&mut store).unwrap();

            let mut stepwise = store.clone();
            for i in 0..5 {
                calculate(&mut stepwise, None, Some(i)).unwrap();
            }
            let gh = gyromagnetic_ratio("1H").unwrap();
            let batched = monte_carlo_calculate(&mut store, &Selection::all(), gh, &ProgressReporter::new()).unwrap();
            assert_eq!(batched, 2);

            for id in [":1", ":2"] {
                assert_eq!(spin(&store, id).j0.sim, spin(&stepwise, id).j0.sim);
                assert_eq!(spin(&store, id).jwh.sim.len(), 5);
            }
        }
    }

    mod monte_carlo {
        use super::*;

        #[test]
        fn setup_requires_simulations() {
            let mut store = loaded_store();
            assert!(matches!(
                monte_carlo_create_data(&mut store, None),
                Err(RelaxError::NoSimulations)
            ));
            assert!(matches!(monte_carlo_setup(&mut store, 0), Err(RelaxError::InvalidData(_))));
            monte_carlo_setup(&mut store, 10).unwrap();
            let pipe = store.current().unwrap();
            assert_eq!(pipe.sim_number, Some(10));
            assert!(pipe.sim_state);
        }

        #[test]
        fn created_data_is_seeded() {
            let mut a = loaded_store();
            monte_carlo_setup(&mut a, 4).unwrap();
            let mut b = a.clone();
            monte_carlo_create_data(&mut a, Some(99)).unwrap();
            monte_carlo_create_data(&mut b, Some(99)).unwrap();
            let sims = &spin(&a, ":1").ri_data_sim["R1_600"];
            assert_eq!(sims.len(), 4);
            assert_eq!(sims, &spin(&b, ":1").ri_data_sim["R1_600"]);
            assert_eq!(spin(&a, ":3").ri_data_sim.len(), 2);
        }

        #[test]
        fn existing_simulation_data_is_kept() {
            let mut store = loaded_store();
            monte_carlo_setup(&mut store, 4).unwrap();
            monte_carlo_create_data(&mut store, Some(5)).unwrap();
            let before = spin(&store, ":1").ri_data_sim.clone();

            let err = monte_carlo_create_data(&mut store, Some(6)).unwrap_err();
            assert_eq!(err.to_string(), "Monte Carlo simulation data already exists.");
            assert_eq!(spin(&store, ":1").ri_data_sim, before);
        }

        #[test]
        fn initial_values_fill_the_simulations() {
            let mut store = loaded_store();
            set_default_values(&mut store, None).unwrap();
            monte_carlo_setup(&mut store, 3).unwrap();
            monte_carlo_initial_values(&mut store).unwrap();
            assert_eq!(spin(&store, ":1").r.sim, vec![1.02e-10; 3]);
            assert_eq!(spin(&store, ":1").csa.sim, vec![-172e-6; 3]);
        }
    }

    mod workflow {
        use super::*;
        use std::sync::Mutex;

        #[test]
        fn full_analysis_with_error_propagation() {
            let mut store = loaded_store();
            let config = JwMappingConfigBuilder::new()
                .frequency(FRQ)
                .heteronucleus("15N")
                .simulations(200)
                .seed(1)
                .build()
                .unwrap();
            let events = Mutex::new(Vec::new());
            let reporter = ProgressReporter::with_callback(Box::new(|e| events.lock().unwrap().push(e)));

            let report = run(&mut store, &config, &reporter).unwrap();
            drop(reporter);
            assert_eq!(
                report,
                JwMappingReport {
                    deselected: 1,
                    calculated: 2,
                    simulations: 200
                }
            );

            let first = spin(&store, ":1");
            assert!((first.j0.value.unwrap() / 4.0e-9 - 1.0).abs() < 1e-9);
            let err = first.j0.error.unwrap();
            assert!(err > 0.0 && err < first.j0.value.unwrap());
            assert_eq!(first.jwx.sim.len(), 200);
            assert!(!spin(&store, ":3").select);
            assert!(!store.current().unwrap().sim_state);

            let events = events.into_inner().unwrap();
            assert_eq!(events[0], Progress::PhaseStart { name: "Setup" });
            assert!(events.contains(&Progress::PhaseStart { name: "Monte Carlo" }));
            assert_eq!(
                events.iter().filter(|e| **e == Progress::TaskIncrement).count(),
                3
            );
        }

        #[test]
        fn simulations_stay_within_the_spin_selection() {
            let mut store = loaded_store();
            for entry in store.current_mut().unwrap().spin_loop_mut(&Selection::parse(":2").unwrap()) {
                entry.spin.ri_data_err.clear();
                entry.spin.j0.error = Some(1.0);
            }
            let config = JwMappingConfigBuilder::new()
                .frequency(FRQ)
                .heteronucleus("15N")
                .spin_id(":1")
                .simulations(5)
                .seed(2)
                .overfit_deselect(false)
                .build()
                .unwrap();

            let report = run(&mut store, &config, &ProgressReporter::new()).unwrap();
            assert_eq!(report.calculated, 1);
            assert_eq!(spin(&store, ":1").j0.sim.len(), 5);
            assert!(spin(&store, ":1").j0.error.is_some());
            assert!(spin(&store, ":2").ri_data_sim.is_empty());
            assert_eq!(spin(&store, ":2").j0.error, Some(1.0));
        }

        #[test]
        fn rerunning_with_the_same_frequency_is_allowed() {
            let mut store = loaded_store();
            set_frq(&mut store, FRQ).unwrap();
            let config = JwMappingConfigBuilder::new()
                .frequency(FRQ)
                .heteronucleus("15N")
                .overfit_deselect(false)
                .build()
                .unwrap();
            let report = run(&mut store, &config, &ProgressReporter::new()).unwrap();
            assert_eq!(report.calculated, 2);
            assert_eq!(report.simulations, 0);
            assert_eq!(spin(&store, ":1").j0.error, None);
        }
    }
}
