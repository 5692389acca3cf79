use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use log::{debug, warn};

use super::{RegistrationError, RegistrationMapping};
use crate::dataset::{columns, read_unit_file};
use crate::store::{CoordinateTable, Experiment, OpenMode, StoreConfig};

/// Write one standardized unit file at the indices the mapping assigned to it.
///
/// Every X layer of the store is written from the unit's layer of the same name, then
/// the obs rows. Returns the number of cells written.
pub fn write_unit(
    uri: &Path,
    path: &Path,
    mapping: &RegistrationMapping,
    config: &StoreConfig,
) -> Result<usize, RegistrationError> {
    let registration = mapping
        .unit(path)
        .ok_or_else(|| RegistrationError::Unregistered(path.to_path_buf()))?;
    let dataset = read_unit_file(path)?.into_cell_dataset()?;

    if dataset.num_obs() != registration.obs_joinids.len()
        || dataset.num_vars() != registration.var_joinids.len()
    {
        return Err(RegistrationError::ShapeMismatch {
            path: path.to_path_buf(),
            message: format!(
                "file holds {} x {}, registered {} x {}",
                dataset.num_obs(),
                dataset.num_vars(),
                registration.obs_joinids.len(),
                registration.var_joinids.len()
            ),
        });
    }

    let experiment = Experiment::open(uri, OpenMode::Write)?.with_config(config.clone());

    for layer in experiment.layer_names() {
        let Some(matrix) = dataset.layer(&layer) else {
            warn!("{} has no `{}` layer, skipping it", path.display(), layer);
            continue;
        };
        let table = CoordinateTable::from_matrix(
            matrix,
            &registration.obs_joinids,
            &registration.var_joinids,
        );
        experiment.write_coordinates(&experiment.layer_array(&layer), &table)?;
        debug!("Wrote {} entries of `{}` from {}", table.len(), layer, path.display());
    }

    // obs last: a sample only counts as ingested once its matrix is in place
    let index_name = experiment.manifest().obs.index_column.clone();
    let mut obs_columns: Vec<(String, ArrayRef)> = vec![(
        index_name,
        Arc::new(Int64Array::from(registration.obs_joinids.clone())),
    )];
    let schema = dataset.obs().schema();
    for (field, column) in schema.fields().iter().zip(dataset.obs().columns()) {
        obs_columns.push((field.name().clone(), Arc::clone(column)));
    }
    let obs = columns::batch_from_columns(obs_columns, dataset.num_obs())?;
    experiment.write_obs(&obs)?;

    Ok(dataset.num_obs())
}
