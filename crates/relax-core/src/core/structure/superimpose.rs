//! Superposition of structural models with the Kabsch algorithm.

use super::internal::Internal;
use crate::core::constants::atomic_mass;
use crate::core::error::{RelaxError, Result};
use crate::core::models::selection::Selection;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Convergence limits of the fit to mean iterations. The angle limit sits
/// above the resolution of the angle recovered from a rotation matrix.
const FIT_TO_MEAN_DIST_TOLERANCE: f64 = 1e-10;
const FIT_TO_MEAN_ANGLE_TOLERANCE: f64 = 1e-7;
const FIT_TO_MEAN_MAX_ITER: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperimposeMethod {
    FitToFirst,
    FitToMean,
}

impl fmt::Display for SuperimposeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SuperimposeMethod::FitToFirst => "fit to first",
            SuperimposeMethod::FitToMean => "fit to mean",
        })
    }
}

impl FromStr for SuperimposeMethod {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.replace('-', " ").as_str() {
            "fit to first" => Ok(SuperimposeMethod::FitToFirst),
            "fit to mean" => Ok(SuperimposeMethod::FitToMean),
            _ => Err(RelaxError::InvalidData(format!(
                "The superimposition method '{s}' is unknown.  It must be one of ['fit to mean', 'fit to first']."
            ))),
        }
    }
}

/// The centre each structure is superimposed over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CentreType {
    Centroid,
    CentreOfMass,
    /// A fixed pivot shared by all structures.
    Fixed(Point3<f64>),
}

/// The rigid body displacement of one model onto its target. A position
/// moves as `R (pos + T − pivot) + pivot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    pub model: Option<i64>,
    pub translation: Vector3<f64>,
    pub rotation: Matrix3<f64>,
    pub pivot: Point3<f64>,
}

impl Displacement {
    fn identity(model: Option<i64>) -> Self {
        Self {
            model,
            translation: Vector3::zeros(),
            rotation: Matrix3::identity(),
            pivot: Point3::origin(),
        }
    }

    pub fn apply(&self, pos: &Point3<f64>) -> Point3<f64> {
        self.pivot + self.rotation * ((*pos + self.translation) - self.pivot)
    }

    pub fn angle(&self) -> f64 {
        Rotation3::from_matrix_unchecked(self.rotation).angle()
    }
}

fn centre(points: &[Point3<f64>], masses: Option<&[f64]>) -> Point3<f64> {
    match masses {
        Some(masses) => {
            let total: f64 = masses.iter().sum();
            let sum: Vector3<f64> = points.iter().zip(masses).map(|(p, m)| p.coords * *m).sum();
            Point3::from(sum / total)
        }
        None => {
            let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
            Point3::from(sum / points.len() as f64)
        }
    }
}

/// The optimal rotation of `from` onto `to` about the given centres.
fn kabsch_rotation(
    from_points: &[Point3<f64>],
    to_points: &[Point3<f64>],
    from_centre: &Point3<f64>,
    to_centre: &Point3<f64>,
) -> Result<Matrix3<f64>> {
    let h = from_points
        .iter()
        .zip(to_points)
        .fold(Matrix3::zeros(), |acc, (f, t)| {
            acc + (*t - *to_centre) * (*f - *from_centre).transpose()
        });

    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(RelaxError::Structure(
            "The singular value decomposition of the covariance matrix failed.".to_string(),
        ));
    };

    let d = (u * v_t).determinant();
    let mut correction = Matrix3::identity();
    if d < 0.0 {
        correction[(2, 2)] = -1.0;
    }
    Ok(u * correction * v_t)
}

/// The displacement taking `from` onto `to`. The pivot is the target centre.
pub fn kabsch(
    from_points: &[Point3<f64>],
    to_points: &[Point3<f64>],
    centre_type: CentreType,
    masses: Option<&[f64]>,
) -> Result<Displacement> {
    if from_points.len() != to_points.len() || from_points.is_empty() {
        return Err(RelaxError::Structure(
            "No common atoms could be found between the structures.".to_string(),
        ));
    }
    let (from_centre, to_centre) = match centre_type {
        CentreType::Fixed(pivot) => (pivot, pivot),
        CentreType::Centroid => (centre(from_points, None), centre(to_points, None)),
        CentreType::CentreOfMass => (centre(from_points, masses), centre(to_points, masses)),
    };

    Ok(Displacement {
        model: None,
        translation: to_centre - from_centre,
        rotation: kabsch_rotation(from_points, to_points, &from_centre, &to_centre)?,
        pivot: to_centre,
    })
}

fn mean_structure(coords: &[Vec<Point3<f64>>]) -> Vec<Point3<f64>> {
    let n = coords.first().map_or(0, Vec::len);
    (0..n)
        .map(|j| {
            let sum: Vector3<f64> = coords.iter().map(|c| c[j].coords).sum();
            Point3::from(sum / coords.len() as f64)
        })
        .collect()
}

/// Fits every structure onto the first.
pub fn fit_to_first(
    coords: &[Vec<Point3<f64>>],
    centre_type: CentreType,
    masses: Option<&[f64]>,
) -> Result<Vec<Displacement>> {
    let Some(first) = coords.first() else {
        return Ok(Vec::new());
    };
    let mut displacements = vec![Displacement::identity(None)];
    for coord in &coords[1..] {
        displacements.push(kabsch(coord, first, centre_type, masses)?);
    }
    Ok(displacements)
}

/// Iteratively fits every structure onto the mean structure until the
/// displacements vanish, then returns the displacements from the original
/// coordinates onto the converged mean.
pub fn fit_to_mean(
    coords: &[Vec<Point3<f64>>],
    centre_type: CentreType,
    masses: Option<&[f64]>,
) -> Result<Vec<Displacement>> {
    let mut fitted = coords.to_vec();

    for iteration in 0..FIT_TO_MEAN_MAX_ITER {
        let mean = mean_structure(&fitted);
        let mut converged = true;
        for (i, coord) in fitted.iter_mut().enumerate() {
            let displacement = kabsch(coord, &mean, centre_type, masses)?;
            let (dist, angle) = (displacement.translation.norm(), displacement.angle());
            debug!("Iteration {iteration}, structure {i}: {dist:.3e} Å, {:.3e} deg", angle.to_degrees());
            for pos in coord.iter_mut() {
                *pos = displacement.apply(pos);
            }
            if dist > FIT_TO_MEAN_DIST_TOLERANCE || angle > FIT_TO_MEAN_ANGLE_TOLERANCE {
                converged = false;
            }
        }
        if converged {
            break;
        }
    }

    let mean = mean_structure(&fitted);
    coords
        .iter()
        .map(|coord| kabsch(coord, &mean, centre_type, masses))
        .collect()
}

/// The RMSD of each model from the mean structure, averaged over models.
pub fn atomic_rmsd(coords: &[Vec<Point3<f64>>]) -> f64 {
    if coords.is_empty() || coords[0].is_empty() {
        return 0.0;
    }
    let mean = mean_structure(coords);
    let n = mean.len() as f64;
    let model_rmsd: f64 = coords
        .iter()
        .map(|coord| {
            let sum: f64 = coord.iter().zip(&mean).map(|(p, m)| (p - m).norm_squared()).sum();
            (sum / n).sqrt()
        })
        .sum();
    model_rmsd / coords.len() as f64
}

/// The RMSD of each atom from its mean position over the models.
pub fn per_atom_rmsd(coords: &[Vec<Point3<f64>>]) -> Vec<f64> {
    let mean = mean_structure(coords);
    let m = coords.len() as f64;
    mean.iter()
        .enumerate()
        .map(|(j, centre)| {
            let sum: f64 = coords.iter().map(|c| (c[j] - centre).norm_squared()).sum();
            (sum / m).sqrt()
        })
        .collect()
}

impl Internal {
    /// The positions of the selected atoms of each model, with the elements
    /// of the first model.
    fn selected_coordinates(
        &self,
        models: &[Option<i64>],
        selection: &Selection,
    ) -> Result<(Vec<Vec<Point3<f64>>>, Vec<Option<String>>)> {
        let mut coords = Vec::with_capacity(models.len());
        let mut elements = Vec::new();
        for (i, &num) in models.iter().enumerate() {
            let model = self
                .models()
                .iter()
                .find(|m| m.num == num)
                .ok_or_else(|| {
                    RelaxError::Structure(format!(
                        "The model {} does not exist.",
                        num.map_or_else(|| "None".to_string(), |n| n.to_string())
                    ))
                })?;
            let mut points = Vec::new();
            for mol in &model.mol {
                for j in 0..mol.len() {
                    let chosen = selection.contains(
                        mol.mol_name.as_deref(),
                        mol.res_num[j],
                        mol.res_name[j].as_deref(),
                        mol.atom_num[j],
                        mol.atom_name[j].as_deref(),
                    );
                    if chosen {
                        points.push(mol.pos(j));
                        if i == 0 {
                            elements.push(mol.element[j].clone());
                        }
                    }
                }
            }
            coords.push(points);
        }
        Ok((coords, elements))
    }

    /// Superimposes the models over the selected atoms, moving every atom of
    /// each model. Returns the applied displacements.
    pub fn superimpose(
        &mut self,
        models: Option<&[i64]>,
        selection: &Selection,
        method: SuperimposeMethod,
        centre_type: CentreType,
    ) -> Result<Vec<Displacement>> {
        if self.empty() {
            return Err(RelaxError::NoPdb);
        }
        let nums: Vec<Option<i64>> = match models {
            Some(models) => models.iter().copied().map(Some).collect(),
            None => self.model_loop(None).iter().map(|m| m.num).collect(),
        };
        let (coords, elements) = self.selected_coordinates(&nums, selection)?;
        if coords.iter().any(|c| c.len() != coords[0].len()) {
            return Err(RelaxError::Structure(
                "The models do not contain the same number of selected atoms.".to_string(),
            ));
        }

        let masses = match centre_type {
            CentreType::CentreOfMass => Some(
                elements
                    .iter()
                    .map(|e| {
                        e.as_deref().and_then(atomic_mass).ok_or_else(|| {
                            RelaxError::Structure(format!(
                                "The atomic mass of the element '{}' is unknown.",
                                e.as_deref().unwrap_or("None")
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()?,
            ),
            _ => None,
        };

        info!("Superimposition of structural models {nums:?} using the '{method}' algorithm.");
        let mut displacements = match method {
            SuperimposeMethod::FitToFirst => fit_to_first(&coords, centre_type, masses.as_deref())?,
            SuperimposeMethod::FitToMean => fit_to_mean(&coords, centre_type, masses.as_deref())?,
        };

        for (displacement, num) in displacements.iter_mut().zip(&nums) {
            displacement.model = *num;
            info!(
                "Model {}: translation {:.3} Å, rotation {:.3} deg",
                num.map_or_else(|| "None".to_string(), |n| n.to_string()),
                displacement.translation.norm(),
                displacement.angle().to_degrees()
            );
            let all = Selection::all();
            self.translate(&displacement.translation, *num, &all);
            self.rotate(&displacement.rotation, &displacement.pivot, *num, &all);
        }
        Ok(displacements)
    }

    /// The RMSD of the selected atoms across all models.
    pub fn rmsd(&self, selection: &Selection) -> Result<f64> {
        if self.empty() {
            return Err(RelaxError::NoPdb);
        }
        let nums: Vec<Option<i64>> = self.model_loop(None).iter().map(|m| m.num).collect();
        let (coords, _) = self.selected_coordinates(&nums, selection)?;
        if coords.iter().any(|c| c.len() != coords[0].len()) {
            return Err(RelaxError::Structure(
                "The models do not contain the same number of selected atoms.".to_string(),
            ));
        }
        Ok(atomic_rmsd(&coords))
    }
}
