use std::path::Path;

use log::info;

use super::{RegistrationMapping, ResizeError};
use crate::store::{Experiment, OpenMode};

/// Grow obs and every X layer of the experiment at `uri` to the mapping's shapes.
///
/// Must run once per mapping, before any [`write_unit`](super::write_unit). Shapes only
/// grow: a dimension already larger than required is kept.
pub fn resize_store(uri: &Path, mapping: &RegistrationMapping) -> Result<(), ResizeError> {
    let rejected = |source| ResizeError::Rejected {
        uri: uri.to_path_buf(),
        source,
    };
    let mut experiment = Experiment::open(uri, OpenMode::Write).map_err(rejected)?;
    if experiment.measurement() != mapping.measurement {
        return Err(ResizeError::MeasurementMismatch {
            mapping: mapping.measurement.clone(),
            store: experiment.measurement().to_string(),
        });
    }

    let obs = mapping.required_obs_count().max(experiment.obs_domain());
    let vars = mapping.required_var_count(&mapping.measurement);
    experiment.resize_obs(obs).map_err(rejected)?;

    for layer in experiment.layer_names() {
        let array = experiment.layer_array(&layer);
        let current = experiment.array_shape(&array).map_err(rejected)?;
        let shape = [current[0].max(obs), current[1].max(vars)];
        experiment.resize_array(&array, shape).map_err(rejected)?;
    }

    info!("Resized {} to {} obs x {} vars", uri.display(), obs, vars);
    Ok(())
}
