//! Alignment tensors with dependency tracked recomputation.
//!
//! Only the five independent elements `Axx`, `Ayy`, `Axy`, `Axz` and `Ayz`
//! (and the descriptive metadata) can be modified. Every other representation
//! of the tensor is derived from them through the [`DEPENDENCIES`] table and
//! recomputed whenever one of its inputs is set, separately for the values,
//! the errors and each Monte Carlo simulation.

use crate::core::error::{RelaxError, Result};
use crate::core::io::xml::{PyValue, XmlElement, XmlObject, fill_object_contents, xml_to_object};
use crate::core::utils::geometry::matrix_to_euler_zyz;
use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// The independent tensor elements.
pub const PRIMITIVES: [&str; 5] = ["Axx", "Ayy", "Axy", "Axz", "Ayz"];

const METADATA: [&str; 5] = ["name", "align_id", "domain", "red", "fixed"];

const A_COMPS: &[&str] = &["Axx", "Ayy", "Azz", "Axy", "Axz", "Ayz"];
const S_COMPS: &[&str] = &["Sxx", "Syy", "Szz", "Sxy", "Sxz", "Syz"];
const XX_YY: &[&str] = &["Axx", "Ayy"];

/// Where a value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Val,
    Err,
    Sim,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorValue {
    Scalar(f64),
    Complex(Complex64),
    Vector(Vector3<f64>),
    Vector5([f64; 5]),
    Matrix(Matrix3<f64>),
}

impl TensorValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            TensorValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            TensorValue::Complex(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector3<f64>> {
        match self {
            TensorValue::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector5(&self) -> Option<[f64; 5]> {
        match self {
            TensorValue::Vector5(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Matrix3<f64>> {
        match self {
            TensorValue::Matrix(v) => Some(*v),
            _ => None,
        }
    }
}

/// A value accepted by [`AlignTensorData::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorField {
    Float(f64),
    Text(Option<String>),
    Flag(bool),
}

impl From<f64> for TensorField {
    fn from(v: f64) -> Self {
        TensorField::Float(v)
    }
}

impl From<bool> for TensorField {
    fn from(v: bool) -> Self {
        TensorField::Flag(v)
    }
}

impl From<&str> for TensorField {
    fn from(v: &str) -> Self {
        TensorField::Text(Some(v.to_string()))
    }
}

impl From<String> for TensorField {
    fn from(v: String) -> Self {
        TensorField::Text(Some(v))
    }
}

impl From<Option<String>> for TensorField {
    fn from(v: Option<String>) -> Self {
        TensorField::Text(v)
    }
}

/// One row of the dependency table: `target` is recomputed after any
/// parameter in `update_if_set` changes, provided every name in `depends`
/// is available.
#[derive(Debug)]
pub struct Dependency {
    pub target: &'static str,
    pub update_if_set: &'static [&'static str],
    pub depends: &'static [&'static str],
}

const fn dep(
    target: &'static str,
    update_if_set: &'static [&'static str],
    depends: &'static [&'static str],
) -> Dependency {
    Dependency {
        target,
        update_if_set,
        depends,
    }
}

/// The dependency table in evaluation order. `Azz` precedes every target that
/// consumes it and `Szz` precedes `S`.
pub static DEPENDENCIES: &[Dependency] = &[
    // Primary.
    dep("Axxyy", XX_YY, XX_YY),
    dep("Azz", XX_YY, XX_YY),
    dep("A", &PRIMITIVES, A_COMPS),
    dep("A_5D", &PRIMITIVES, A_COMPS),
    dep("P", &PRIMITIVES, A_COMPS),
    dep("P_5D", &PRIMITIVES, A_COMPS),
    dep("Pxx", &["Axx"], &["Axx"]),
    dep("Pxxyy", XX_YY, XX_YY),
    dep("Pxy", &["Axy"], &["Axy"]),
    dep("Pxz", &["Axz"], &["Axz"]),
    dep("Pyy", &["Ayy"], &["Ayy"]),
    dep("Pyz", &["Ayz"], &["Ayz"]),
    dep("Sxx", &["Axx"], &["Axx"]),
    dep("Sxxyy", XX_YY, XX_YY),
    dep("Sxy", &["Axy"], &["Axy"]),
    dep("Sxz", &["Axz"], &["Axz"]),
    dep("Syy", &["Ayy"], &["Ayy"]),
    dep("Syz", &["Ayz"], &["Ayz"]),
    // Secondary.
    dep("A_diag", &PRIMITIVES, &["A"]),
    dep("eigvals", &PRIMITIVES, &["A"]),
    dep("rotation", &PRIMITIVES, &["A"]),
    dep("P_diag", &PRIMITIVES, &["P"]),
    dep("Pzz", XX_YY, &["Pxx", "Pyy"]),
    dep("Szz", XX_YY, &["Sxx", "Syy"]),
    dep("S", &PRIMITIVES, S_COMPS),
    dep("S_5D", &PRIMITIVES, S_COMPS),
    dep("S_diag", &PRIMITIVES, &["S"]),
    dep("Am2", &["Axx", "Ayy", "Axy"], &["Sxx", "Syy", "Sxy"]),
    dep("Am1", &["Axz", "Ayz"], &["Sxz", "Syz"]),
    dep("A0", XX_YY, &["Szz"]),
    dep("A1", &["Axz", "Ayz"], &["Sxz", "Syz"]),
    dep("A2", &["Axx", "Ayy", "Axy"], &["Sxx", "Syy", "Sxy"]),
    // Tertiary.
    dep("Aa", &PRIMITIVES, &["A_diag"]),
    dep("Ar", &PRIMITIVES, &["A_diag"]),
    dep("eta", &PRIMITIVES, &["A_diag"]),
    dep("unit_x", &PRIMITIVES, &["rotation"]),
    dep("unit_y", &PRIMITIVES, &["rotation"]),
    dep("unit_z", &PRIMITIVES, &["rotation"]),
    dep("euler", &PRIMITIVES, &["rotation"]),
    // Quaternary.
    dep("R", &PRIMITIVES, &["Aa", "Ar"]),
];

type ValueSet = BTreeMap<&'static str, TensorValue>;

fn is_derived(name: &str) -> bool {
    DEPENDENCIES.iter().any(|d| d.target == name)
}

fn scalar(set: &ValueSet, name: &str) -> Option<f64> {
    set.get(name).and_then(TensorValue::as_scalar)
}

fn matrix(set: &ValueSet, name: &str) -> Option<Matrix3<f64>> {
    set.get(name).and_then(TensorValue::as_matrix)
}

fn symmetric(xx: f64, yy: f64, zz: f64, xy: f64, xz: f64, yz: f64) -> Matrix3<f64> {
    Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
}

/// Indices of the eigenvalues ordered so that `|x| <= |y| <= |z|`, ties
/// resolved by first occurrence.
fn abs_order(values: &Vector3<f64>) -> [usize; 3] {
    let abs = values.map(f64::abs);
    let mut x = 0;
    let mut z = 0;
    for i in 1..3 {
        if abs[i] < abs[x] {
            x = i;
        }
        if abs[i] > abs[z] {
            z = i;
        }
    }
    if x == z {
        z = if x == 2 { 1 } else { 2 };
    }
    [x, 3 - x - z, z]
}

fn sorted_eigen(m: &Matrix3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
    let eigen = m.symmetric_eigen();
    let order = abs_order(&eigen.eigenvalues);
    let values = Vector3::new(
        eigen.eigenvalues[order[0]],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    );
    let mut vectors = Matrix3::zeros();
    for (j, &index) in order.iter().enumerate() {
        vectors.set_column(j, &eigen.eigenvectors.column(index));
    }
    (values, vectors)
}

fn diagonal(m: &Matrix3<f64>) -> Matrix3<f64> {
    Matrix3::from_diagonal(&sorted_eigen(m).0)
}

/// Evaluates one derived quantity from an already populated value set.
fn calculate(target: &str, set: &ValueSet) -> Option<TensorValue> {
    let s = |name: &str| scalar(set, name);
    let third = 1.0 / 3.0;
    let fact_a2 = (2.0 * PI / 15.0).sqrt();
    let fact_a1 = (8.0 * PI / 15.0).sqrt();
    let fact_a0 = (4.0 * PI / 5.0).sqrt();

    let value = match target {
        "Axxyy" | "Pxxyy" => TensorValue::Scalar(s("Axx")? - s("Ayy")?),
        "Azz" => TensorValue::Scalar(-s("Axx")? - s("Ayy")?),
        "A" => TensorValue::Matrix(symmetric(
            s("Axx")?,
            s("Ayy")?,
            s("Azz")?,
            s("Axy")?,
            s("Axz")?,
            s("Ayz")?,
        )),
        "A_5D" => TensorValue::Vector5([s("Axx")?, s("Ayy")?, s("Axy")?, s("Axz")?, s("Ayz")?]),
        "P" => TensorValue::Matrix(
            symmetric(
                s("Axx")?,
                s("Ayy")?,
                s("Azz")?,
                s("Axy")?,
                s("Axz")?,
                s("Ayz")?,
            ) + Matrix3::identity() * third,
        ),
        "P_5D" => TensorValue::Vector5([
            s("Axx")? + third,
            s("Ayy")? + third,
            s("Axy")?,
            s("Axz")?,
            s("Ayz")?,
        ]),
        "Pxx" => TensorValue::Scalar(s("Axx")? + third),
        "Pyy" => TensorValue::Scalar(s("Ayy")? + third),
        "Pxy" => TensorValue::Scalar(s("Axy")?),
        "Pxz" => TensorValue::Scalar(s("Axz")?),
        "Pyz" => TensorValue::Scalar(s("Ayz")?),
        "Sxx" => TensorValue::Scalar(1.5 * s("Axx")?),
        "Syy" => TensorValue::Scalar(1.5 * s("Ayy")?),
        "Sxy" => TensorValue::Scalar(1.5 * s("Axy")?),
        "Sxz" => TensorValue::Scalar(1.5 * s("Axz")?),
        "Syz" => TensorValue::Scalar(1.5 * s("Ayz")?),
        "Sxxyy" => TensorValue::Scalar(1.5 * (s("Axx")? - s("Ayy")?)),
        "A_diag" => TensorValue::Matrix(diagonal(&matrix(set, "A")?)),
        "P_diag" => TensorValue::Matrix(diagonal(&matrix(set, "P")?)),
        "S_diag" => TensorValue::Matrix(diagonal(&matrix(set, "S")?)),
        "eigvals" => TensorValue::Vector(sorted_eigen(&matrix(set, "A")?).0),
        "rotation" => {
            let mut rotation = sorted_eigen(&matrix(set, "A")?).1;
            if (rotation.determinant() - 1.0).abs() > 1e-7 {
                let flipped = -rotation.column(0);
                rotation.set_column(0, &flipped);
            }
            TensorValue::Matrix(rotation)
        }
        "Pzz" => TensorValue::Scalar(1.0 - s("Pxx")? - s("Pyy")?),
        "Szz" => TensorValue::Scalar(-s("Sxx")? - s("Syy")?),
        "S" => TensorValue::Matrix(symmetric(
            s("Sxx")?,
            s("Syy")?,
            s("Szz")?,
            s("Sxy")?,
            s("Sxz")?,
            s("Syz")?,
        )),
        "S_5D" => TensorValue::Vector5([s("Sxx")?, s("Syy")?, s("Sxy")?, s("Sxz")?, s("Syz")?]),
        "Am2" => TensorValue::Complex(
            Complex64::new(s("Sxx")? - s("Syy")?, -2.0 * s("Sxy")?) * fact_a2,
        ),
        "Am1" => TensorValue::Complex(Complex64::new(s("Sxz")?, -s("Syz")?) * -fact_a1),
        "A0" => TensorValue::Scalar(fact_a0 * s("Szz")?),
        "A1" => TensorValue::Complex(Complex64::new(s("Sxz")?, s("Syz")?) * fact_a1),
        "A2" => TensorValue::Complex(
            Complex64::new(s("Sxx")? - s("Syy")?, 2.0 * s("Sxy")?) * fact_a2,
        ),
        "Aa" => TensorValue::Scalar(1.5 * matrix(set, "A_diag")?[(2, 2)]),
        "Ar" => {
            let diag = matrix(set, "A_diag")?;
            TensorValue::Scalar(diag[(0, 0)] - diag[(1, 1)])
        }
        "eta" => {
            let diag = matrix(set, "A_diag")?;
            TensorValue::Scalar(if diag[(2, 2)] == 0.0 {
                f64::NAN
            } else {
                (diag[(0, 0)] - diag[(1, 1)]) / diag[(2, 2)]
            })
        }
        "unit_x" => TensorValue::Vector(matrix(set, "rotation")?.column(0).into_owned()),
        "unit_y" => TensorValue::Vector(matrix(set, "rotation")?.column(1).into_owned()),
        "unit_z" => TensorValue::Vector(matrix(set, "rotation")?.column(2).into_owned()),
        "euler" => TensorValue::Vector(matrix_to_euler_zyz(&matrix(set, "rotation")?)),
        "R" => {
            let aa = s("Aa")?;
            TensorValue::Scalar(if aa == 0.0 { f64::NAN } else { s("Ar")? / aa })
        }
        _ => return None,
    };
    Some(value)
}

fn update_dependents(set: &mut ValueSet, param: &str) {
    for dependency in DEPENDENCIES {
        if !dependency.update_if_set.contains(&param) {
            continue;
        }
        if dependency.depends.iter().any(|d| !set.contains_key(d)) {
            continue;
        }
        match calculate(dependency.target, set) {
            Some(value) => {
                set.insert(dependency.target, value);
            }
            None => {
                set.remove(dependency.target);
            }
        }
    }
}

/// A single alignment tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignTensorData {
    name: String,
    align_id: Option<String>,
    domain: Option<String>,
    red: bool,
    fixed: bool,
    values: ValueSet,
    errors: ValueSet,
    sims: Option<Vec<ValueSet>>,
}

impl AlignTensorData {
    pub fn new(name: impl Into<String>, sim_num: Option<usize>) -> Self {
        Self {
            name: name.into(),
            align_id: None,
            domain: None,
            red: false,
            fixed: false,
            values: ValueSet::new(),
            errors: ValueSet::new(),
            sims: sim_num.map(|n| vec![ValueSet::new(); n]),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn align_id(&self) -> Option<&str> {
        self.align_id.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn red(&self) -> bool {
        self.red
    }

    pub fn fixed(&self) -> bool {
        self.fixed
    }

    pub fn sim_num(&self) -> Option<usize> {
        self.sims.as_ref().map(Vec::len)
    }

    /// Sizes the simulation storage. Existing simulations are kept up to the
    /// new length.
    pub fn set_sim_num(&mut self, sim_num: usize) {
        let sims = self.sims.get_or_insert_with(Vec::new);
        sims.resize(sim_num, ValueSet::new());
    }

    pub fn value(&self, param: &str) -> Option<TensorValue> {
        self.values.get(param).copied()
    }

    pub fn error(&self, param: &str) -> Option<TensorValue> {
        self.errors.get(param).copied()
    }

    pub fn sim(&self, param: &str, index: usize) -> Option<TensorValue> {
        self.sims
            .as_ref()
            .and_then(|sims| sims.get(index))
            .and_then(|set| set.get(param).copied())
    }

    /// Shortcut for scalar values such as `Azz`, `Aa` or `R`.
    pub fn scalar(&self, param: &str) -> Option<f64> {
        self.value(param).and_then(|v| v.as_scalar())
    }

    /// Shortcut for matrix values such as `A`, `S_diag` or `rotation`.
    pub fn matrix(&self, param: &str) -> Option<Matrix3<f64>> {
        self.value(param).and_then(|v| v.as_matrix())
    }

    /// The only mutation path of the tensor.
    ///
    /// Metadata may only be set as values. Setting a simulation value requires
    /// [`set_sim_num`](Self::set_sim_num) to have been called and a valid
    /// `sim_index`. With `update` every derived quantity depending on `param`
    /// is recomputed for the same category and simulation.
    pub fn set(
        &mut self,
        param: &str,
        value: impl Into<TensorField>,
        category: Category,
        sim_index: Option<usize>,
        update: bool,
    ) -> Result<()> {
        let value = value.into();

        if METADATA.contains(&param) {
            if category != Category::Val {
                return Err(RelaxError::InvalidData(format!(
                    "The alignment tensor metadata '{param}' can only be set as a value."
                )));
            }
            return self.set_metadata(param, value);
        }

        let Some(&primitive) = PRIMITIVES.iter().find(|&&p| p == param) else {
            return Err(if is_derived(param) {
                RelaxError::ReadOnly(param.to_string())
            } else {
                RelaxError::UnknownParameter(param.to_string())
            });
        };
        let TensorField::Float(number) = value else {
            return Err(RelaxError::InvalidData(format!(
                "The alignment tensor element '{param}' must be a float."
            )));
        };

        let set = self.value_set_mut(category, sim_index)?;
        set.insert(primitive, TensorValue::Scalar(number));
        if update {
            update_dependents(set, primitive);
        }
        Ok(())
    }

    fn set_metadata(&mut self, param: &str, value: TensorField) -> Result<()> {
        match (param, value) {
            ("name", TensorField::Text(Some(name))) => self.name = name,
            ("align_id", TensorField::Text(id)) => self.align_id = id,
            ("domain", TensorField::Text(domain)) => self.domain = domain,
            ("red", TensorField::Flag(flag)) => self.red = flag,
            ("fixed", TensorField::Flag(flag)) => self.fixed = flag,
            (param, value) => {
                return Err(RelaxError::InvalidData(format!(
                    "The value {value:?} is invalid for the alignment tensor metadata '{param}'."
                )));
            }
        }
        Ok(())
    }

    fn value_set_mut(
        &mut self,
        category: Category,
        sim_index: Option<usize>,
    ) -> Result<&mut ValueSet> {
        match category {
            Category::Val => Ok(&mut self.values),
            Category::Err => Ok(&mut self.errors),
            Category::Sim => {
                let sims = self.sims.as_mut().ok_or(RelaxError::NoSimulations)?;
                let num = sims.len();
                let index = sim_index.ok_or_else(|| {
                    RelaxError::InvalidData("A simulation index is required.".into())
                })?;
                sims.get_mut(index)
                    .ok_or(RelaxError::SimIndex { index, num })
            }
        }
    }
}

impl XmlObject for AlignTensorData {
    type Error = RelaxError;

    fn xml_fields(&self) -> Vec<(String, PyValue)> {
        let mut fields = vec![
            ("name".to_string(), PyValue::Str(self.name.clone())),
            ("align_id".to_string(), self.align_id.clone().into()),
            ("domain".to_string(), self.domain.clone().into()),
            ("red".to_string(), self.red.into()),
            ("fixed".to_string(), self.fixed.into()),
        ];
        for param in PRIMITIVES {
            fields.push((param.to_string(), scalar(&self.values, param).into()));
        }
        for param in PRIMITIVES {
            fields.push((format!("{param}_err"), scalar(&self.errors, param).into()));
        }
        if let Some(sims) = &self.sims {
            for param in PRIMITIVES {
                let values: Vec<Option<f64>> = sims.iter().map(|set| scalar(set, param)).collect();
                fields.push((format!("{param}_sim"), PyValue::opt_float_list(&values)));
            }
        }
        fields
    }

    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<()> {
        match name {
            "name" | "align_id" | "domain" => {
                let text = value.to_opt_string(name)?;
                self.set(name, text, Category::Val, None, true)
            }
            "red" | "fixed" => {
                let flag = value.to_bool(name)?;
                self.set(name, flag, Category::Val, None, true)
            }
            _ => {
                let (param, category) = match name.rsplit_once('_') {
                    Some((param, "err")) => (param, Category::Err),
                    Some((param, "sim")) => (param, Category::Sim),
                    _ => (name, Category::Val),
                };
                if is_derived(param) {
                    return Ok(());
                }
                match category {
                    Category::Sim => {
                        let values = value.to_opt_f64_list(name)?;
                        if self.sim_num().is_none_or(|n| n < values.len()) {
                            self.set_sim_num(values.len());
                        }
                        for (index, v) in values.into_iter().enumerate() {
                            if let Some(v) = v {
                                self.set(param, v, Category::Sim, Some(index), true)?;
                            }
                        }
                        Ok(())
                    }
                    _ => match value.to_opt_f64(name)? {
                        Some(v) => self.set(param, v, category, None, true),
                        None => Ok(()),
                    },
                }
            }
        }
    }
}

/// The alignment tensors of a data pipe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignTensorList {
    tensors: Vec<AlignTensorData>,
}

impl AlignTensorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, name: &str, sim_num: Option<usize>) -> Result<&mut AlignTensorData> {
        if self.get(name).is_some() {
            return Err(RelaxError::InvalidData(format!(
                "The alignment tensor '{name}' already exists."
            )));
        }
        self.tensors.push(AlignTensorData::new(name, sim_num));
        let last = self.tensors.len() - 1;
        Ok(&mut self.tensors[last])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tensors.iter().map(|t| t.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AlignTensorData> {
        self.tensors.iter().find(|t| t.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AlignTensorData> {
        self.tensors.iter_mut().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignTensorData> {
        self.tensors.iter()
    }

    pub fn remove(&mut self, name: &str) -> Option<AlignTensorData> {
        let index = self.tensors.iter().position(|t| t.name == name)?;
        Some(self.tensors.remove(index))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn to_xml(&self, parent: &mut XmlElement) {
        let mut list = XmlElement::new("align_tensors")
            .with_attribute("desc", "Alignment tensor list");
        for tensor in &self.tensors {
            let mut element = XmlElement::new("align_tensor")
                .with_attribute("desc", "Alignment tensor")
                .with_attribute("name", tensor.name());
            fill_object_contents(&mut element, tensor, &[]);
            list.children.push(element);
        }
        parent.children.push(list);
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut list = Self::new();
        for child in element.children_named("align_tensor") {
            let name = child.require_attribute("name")?.to_string();
            let tensor = list.add_item(&name, None)?;
            xml_to_object(child, tensor, &[])?;
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn full_tensor() -> AlignTensorData {
        let mut tensor = AlignTensorData::new("Pf1", None);
        let params = [
            ("Axx", -16.6278e-4),
            ("Ayy", 6.13037e-4),
            ("Axy", 7.65639e-4),
            ("Axz", -1.89157e-4),
            ("Ayz", 19.2561e-4),
        ];
        for (param, value) in params {
            tensor.set(param, value, Category::Val, None, true).unwrap();
        }
        tensor
    }

    mod dependencies {
        use super::*;

        #[test]
        fn every_dependency_is_computed_before_use() {
            for (i, dependency) in DEPENDENCIES.iter().enumerate() {
                for name in dependency.depends {
                    if PRIMITIVES.contains(name) {
                        continue;
                    }
                    let position = DEPENDENCIES.iter().position(|d| d.target == *name);
                    assert!(
                        position.is_some_and(|p| p < i),
                        "{} is used by {} before it is computed",
                        name,
                        dependency.target
                    );
                }
            }
        }

        #[test]
        fn partial_tensors_only_get_partial_derivations() {
            let mut tensor = AlignTensorData::new("t", None);
            tensor.set("Axx", 1e-3, Category::Val, None, true).unwrap();
            assert!(approx(tensor.scalar("Sxx").unwrap(), 1.5e-3));
            assert!(approx(tensor.scalar("Pxx").unwrap(), 1e-3 + 1.0 / 3.0));
            assert!(tensor.value("Azz").is_none());
            assert!(tensor.value("A").is_none());

            tensor.set("Ayy", 2e-3, Category::Val, None, true).unwrap();
            assert!(approx(tensor.scalar("Azz").unwrap(), -3e-3));
            assert!(approx(tensor.scalar("Szz").unwrap(), -4.5e-3));
            assert!(tensor.value("A").is_none());
        }
    }

    mod derived_values {
        use super::*;

        #[test]
        fn cartesian_forms_satisfy_their_closed_relations() {
            let t = full_tensor();
            let axx = t.scalar("Axx").unwrap();
            let ayy = t.scalar("Ayy").unwrap();
            assert!(approx(t.scalar("Azz").unwrap(), -axx - ayy));
            assert!(approx(t.scalar("Axxyy").unwrap(), axx - ayy));
            assert!(approx(
                t.scalar("Pzz").unwrap(),
                1.0 - t.scalar("Pxx").unwrap() - t.scalar("Pyy").unwrap()
            ));

            let a = t.matrix("A").unwrap();
            assert!((a - a.transpose()).norm() < TOLERANCE);
            assert!(a.trace().abs() < TOLERANCE);
            assert!((t.matrix("S").unwrap() - a * 1.5).norm() < TOLERANCE);
            assert!((t.matrix("P").unwrap() - (a + Matrix3::identity() / 3.0)).norm() < TOLERANCE);

            let a_5d = t.value("A_5D").unwrap().as_vector5().unwrap();
            assert_eq!(a_5d[0], axx);
            assert_eq!(a_5d[2], t.scalar("Axy").unwrap());
        }

        #[test]
        fn eigen_system_reproduces_the_tensor() {
            let t = full_tensor();
            let a = t.matrix("A").unwrap();
            let rotation = t.matrix("rotation").unwrap();
            let diag = t.matrix("A_diag").unwrap();

            assert!((rotation.determinant() - 1.0).abs() < 1e-7);
            assert!((rotation * diag * rotation.transpose() - a).norm() < 1e-12);

            let eigvals = t.value("eigvals").unwrap().as_vector().unwrap();
            assert!(eigvals[0].abs() <= eigvals[1].abs());
            assert!(eigvals[1].abs() <= eigvals[2].abs());
            assert!(approx(eigvals[2], diag[(2, 2)]));

            let unit_z = t.value("unit_z").unwrap().as_vector().unwrap();
            assert!((unit_z - rotation.column(2)).norm() < TOLERANCE);
        }

        #[test]
        fn geometric_parameters_follow_the_diagonal_tensor() {
            let t = full_tensor();
            let diag = t.matrix("A_diag").unwrap();
            let aa = t.scalar("Aa").unwrap();
            let ar = t.scalar("Ar").unwrap();
            assert!(approx(aa, 1.5 * diag[(2, 2)]));
            assert!(approx(ar, diag[(0, 0)] - diag[(1, 1)]));
            assert!(approx(t.scalar("R").unwrap(), ar / aa));
            assert!(approx(
                t.scalar("eta").unwrap(),
                (diag[(0, 0)] - diag[(1, 1)]) / diag[(2, 2)]
            ));
        }

        #[test]
        fn irreducible_components_match_their_definitions() {
            let t = full_tensor();
            let sxx = t.scalar("Sxx").unwrap();
            let syy = t.scalar("Syy").unwrap();
            let sxy = t.scalar("Sxy").unwrap();
            let sxz = t.scalar("Sxz").unwrap();
            let syz = t.scalar("Syz").unwrap();
            let szz = t.scalar("Szz").unwrap();

            let a2 = t.value("A2").unwrap().as_complex().unwrap();
            let am2 = t.value("Am2").unwrap().as_complex().unwrap();
            let a1 = t.value("A1").unwrap().as_complex().unwrap();
            let am1 = t.value("Am1").unwrap().as_complex().unwrap();
            let f2 = (2.0 * PI / 15.0).sqrt();
            let f1 = (8.0 * PI / 15.0).sqrt();

            assert!(approx(a2.re, f2 * (sxx - syy)));
            assert!(approx(a2.im, f2 * 2.0 * sxy));
            assert!(approx(am2.im, -a2.im));
            assert!(approx(a1.re, f1 * sxz));
            assert!(approx(a1.im, f1 * syz));
            assert!(approx(am1.re, -f1 * sxz));
            assert!(approx(am1.im, f1 * syz));
            assert!(approx(
                t.scalar("A0").unwrap(),
                (4.0 * PI / 5.0).sqrt() * szz
            ));
        }

        #[test]
        fn euler_angles_rebuild_the_rotation() {
            let t = full_tensor();
            let euler = t.value("euler").unwrap().as_vector().unwrap();
            let rebuilt =
                crate::core::utils::geometry::euler_zyz_to_matrix(euler.x, euler.y, euler.z);
            assert!((rebuilt - t.matrix("rotation").unwrap()).norm() < 1e-10);
        }

        #[test]
        fn zero_tensor_gives_nan_ratios() {
            let mut t = AlignTensorData::new("zero", None);
            for param in PRIMITIVES {
                t.set(param, 0.0, Category::Val, None, true).unwrap();
            }
            assert!(t.scalar("eta").unwrap().is_nan());
            assert!(t.scalar("R").unwrap().is_nan());
        }

        #[test]
        fn resetting_a_primitive_refreshes_dependents() {
            let mut t = full_tensor();
            t.set("Axx", 1e-3, Category::Val, None, true).unwrap();
            let ayy = t.scalar("Ayy").unwrap();
            assert!(approx(t.scalar("Azz").unwrap(), -1e-3 - ayy));
            assert!(approx(t.matrix("A").unwrap()[(2, 2)], -1e-3 - ayy));
        }
    }

    mod mutation {
        use super::*;

        #[test]
        fn derived_parameters_are_read_only() {
            let mut t = full_tensor();
            let err = t.set("Azz", 1.0, Category::Val, None, true).unwrap_err();
            assert_eq!(err.to_string(), "The object 'Azz' is not modifiable.");
            assert!(matches!(
                t.set("bogus", 1.0, Category::Val, None, true),
                Err(RelaxError::UnknownParameter(_))
            ));
        }

        #[test]
        fn errors_are_tracked_separately() {
            let mut t = full_tensor();
            t.set("Axx", 1e-5, Category::Err, None, true).unwrap();
            t.set("Ayy", 2e-5, Category::Err, None, true).unwrap();
            assert!(approx(
                t.error("Azz").unwrap().as_scalar().unwrap(),
                -3e-5
            ));
            assert!(approx(t.scalar("Axx").unwrap(), -16.6278e-4));
        }

        #[test]
        fn simulations_require_setup_and_valid_index() {
            let mut t = AlignTensorData::new("t", None);
            assert!(matches!(
                t.set("Axx", 1.0, Category::Sim, Some(0), true),
                Err(RelaxError::NoSimulations)
            ));
            t.set_sim_num(3);
            assert!(matches!(
                t.set("Axx", 1.0, Category::Sim, Some(3), true),
                Err(RelaxError::SimIndex { index: 3, num: 3 })
            ));
            t.set("Axx", 1.0, Category::Sim, Some(1), true).unwrap();
            t.set("Ayy", 2.0, Category::Sim, Some(1), true).unwrap();
            assert_eq!(t.sim("Azz", 1).unwrap().as_scalar(), Some(-3.0));
            assert!(t.sim("Azz", 0).is_none());
            assert!(t.value("Azz").is_none());
        }

        #[test]
        fn metadata_is_only_settable_as_value() {
            let mut t = AlignTensorData::new("t", None);
            t.set("align_id", "Pf1", Category::Val, None, true).unwrap();
            t.set("red", true, Category::Val, None, true).unwrap();
            assert_eq!(t.align_id(), Some("Pf1"));
            assert!(t.red());
            assert!(t.set("domain", "N", Category::Err, None, true).is_err());
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn xml_round_trip_rebuilds_derived_values() {
            let mut list = AlignTensorList::new();
            let tensor = list.add_item("Pf1", Some(2)).unwrap();
            for (i, param) in PRIMITIVES.iter().enumerate() {
                let value = (i as f64 + 1.0) * 1.1e-4;
                tensor.set(param, value, Category::Val, None, true).unwrap();
                tensor.set(param, value / 10.0, Category::Err, None, true).unwrap();
                tensor.set(param, value * 1.01, Category::Sim, Some(1), true).unwrap();
            }

            let mut parent = XmlElement::new("pipe");
            list.to_xml(&mut parent);
            let restored = AlignTensorList::from_xml(&parent.children[0]).unwrap();
            let back = restored.get("Pf1").unwrap();
            let original = list.get("Pf1").unwrap();

            assert_eq!(back.sim_num(), Some(2));
            for param in ["Axx", "Azz", "A", "rotation", "euler", "R"] {
                assert_eq!(back.value(param), original.value(param), "{param}");
            }
            assert_eq!(back.error("Azz"), original.error("Azz"));
            assert_eq!(back.sim("Azz", 1), original.sim("Azz", 1));
            assert!(back.sim("Axx", 0).is_none());
        }

        #[test]
        fn duplicate_tensor_names_are_rejected() {
            let mut list = AlignTensorList::new();
            list.add_item("a", None).unwrap();
            assert!(list.add_item("a", None).is_err());
            assert_eq!(list.names(), vec!["a"]);
        }
    }
}
