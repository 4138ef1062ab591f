use crate::core::error::{RelaxError, Result};
use crate::core::models::align_tensor::{AlignTensorList, Category, PRIMITIVES};
use crate::core::store::DataStore;
use tracing::info;

/// The commonly reported quantities of an alignment tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSummary {
    pub name: String,
    pub align_id: Option<String>,
    pub aa: Option<f64>,
    pub ar: Option<f64>,
    pub eta: Option<f64>,
    pub rhombicity: Option<f64>,
    /// z-y-z Euler angles of the eigenframe, in radians.
    pub euler: Option<[f64; 3]>,
}

/// Creates the tensor `tensor` in the current pipe from the five elements
/// `[Axx, Ayy, Axy, Axz, Ayz]`, optionally with their errors.
pub fn init(
    store: &mut DataStore,
    tensor: &str,
    align_id: Option<&str>,
    params: [f64; 5],
    errors: Option<[f64; 5]>,
) -> Result<()> {
    let pipe = store.current_mut()?;
    let list = pipe.align_tensors.get_or_insert_with(AlignTensorList::new);
    let data = list.add_item(tensor, None)?;
    if let Some(align_id) = align_id {
        data.set("align_id", align_id, Category::Val, None, false)?;
    }
    for (param, value) in PRIMITIVES.iter().zip(params) {
        data.set(param, value, Category::Val, None, true)?;
    }
    if let Some(errors) = errors {
        for (param, error) in PRIMITIVES.iter().zip(errors) {
            data.set(param, error, Category::Err, None, true)?;
        }
    }
    info!(tensor, "Initialised the alignment tensor");
    Ok(())
}

/// Summaries of every tensor of the current pipe.
pub fn display(store: &DataStore) -> Result<Vec<TensorSummary>> {
    let Some(list) = store.current()?.align_tensors.as_ref() else {
        return Ok(Vec::new());
    };
    Ok(list
        .iter()
        .map(|t| TensorSummary {
            name: t.name().to_string(),
            align_id: t.align_id().map(str::to_string),
            aa: t.scalar("Aa"),
            ar: t.scalar("Ar"),
            eta: t.scalar("eta"),
            rhombicity: t.scalar("R"),
            euler: t
                .value("euler")
                .and_then(|v| v.as_vector())
                .map(|v| [v.x, v.y, v.z]),
        })
        .collect())
}

/// Deletes one tensor, or all of them.
pub fn delete(store: &mut DataStore, tensor: Option<&str>) -> Result<()> {
    let pipe = store.current_mut()?;
    match tensor {
        None => pipe.align_tensors = None,
        Some(name) => {
            let list = pipe
                .align_tensors
                .as_mut()
                .filter(|list| list.get(name).is_some())
                .ok_or_else(|| RelaxError::NoTensor {
                    tensor: name.to_string(),
                })?;
            list.remove(name);
            if list.is_empty() {
                pipe.align_tensors = None;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DataStore {
        let mut store = DataStore::new();
        store.add("rdc", "N-state", None, true).unwrap();
        store
    }

    #[test]
    fn initialised_tensors_carry_derived_values() {
        let mut store = store();
        init(&mut store, "Pf1", Some("pf1"), [-1e-4, -2e-4, 0.0, 0.0, 0.0], None).unwrap();

        let tensors = display(&store).unwrap();
        assert_eq!(tensors.len(), 1);
        let pf1 = &tensors[0];
        assert_eq!(pf1.align_id.as_deref(), Some("pf1"));
        // Azz = 3e-4 is the largest eigenvalue, Aa = 1.5 Azz.
        assert!((pf1.aa.unwrap() - 4.5e-4).abs() < 1e-12);
        assert!((pf1.ar.unwrap().abs() - 1e-4).abs() < 1e-12);
        assert!(pf1.euler.is_some());
    }

    #[test]
    fn duplicate_names_and_unknown_deletions_fail() {
        let mut store = store();
        init(&mut store, "Pf1", None, [1e-4, 2e-4, 0.0, 0.0, 0.0], None).unwrap();
        assert!(init(&mut store, "Pf1", None, [0.0; 5], None).is_err());
        assert!(matches!(
            delete(&mut store, Some("Bicelle")),
            Err(RelaxError::NoTensor { .. })
        ));
        delete(&mut store, Some("Pf1")).unwrap();
        assert!(display(&store).unwrap().is_empty());
    }

    #[test]
    fn errors_are_propagated_to_derived_quantities() {
        let mut store = store();
        init(
            &mut store,
            "Pf1",
            None,
            [-1e-4, -2e-4, 0.0, 0.0, 0.0],
            Some([1e-6, 1e-6, 0.0, 0.0, 0.0]),
        )
        .unwrap();
        let pipe = store.current().unwrap();
        let tensor = pipe.align_tensors.as_ref().unwrap().get("Pf1").unwrap();
        let azz_err = tensor.error("Azz").and_then(|v| v.as_scalar()).unwrap();
        assert!((azz_err + 2e-6).abs() < 1e-15);
    }
}
