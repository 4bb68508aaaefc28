use std::ffi::CString;

use anyhow::Result;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyModule};
use tracing::debug;

use super::{
    CvScore, CvStrategy, Estimator, FittedModel, ModelInputs, ModelKind, PlannedModel, Prepared,
    Target, TaskType, DEFAULT_SEED,
};
use crate::data::types::{ColumnData, Frame};
use crate::error::AutomlError;

/// Python glue run inside the embedded interpreter.
const HELPER_SOURCE: &str = include_str!("sklearn_bridge.py");

/// Estimator backed by scikit-learn through the embedded interpreter.
/// Every call takes the GIL and blocks until Python returns.
pub struct SklearnEstimator {
    helper: Py<PyModule>,
}

fn collaborator(what: &'static str) -> impl FnOnce(PyErr) -> AutomlError {
    move |e| AutomlError::Collaborator(format!("scikit-learn {}: {}", what, e))
}

fn rows_to_list<'py>(py: Python<'py>, x: &[Vec<f64>]) -> PyResult<Bound<'py, PyList>> {
    let rows = x
        .iter()
        .map(|row| PyList::new(py, row.iter().copied()))
        .collect::<PyResult<Vec<_>>>()?;
    PyList::new(py, rows)
}

fn target_to_list<'py>(py: Python<'py>, y: &Target) -> PyResult<Bound<'py, PyList>> {
    match y {
        Target::Classes(labels) => PyList::new(py, labels.iter().map(String::as_str)),
        Target::Values(values) => PyList::new(py, values.iter().copied()),
    }
}

/// A classifier needs class labels and a regressor needs values.
fn check_task(model: &PlannedModel, y: &Target) -> Result<(), AutomlError> {
    match (model.kind.task(), y) {
        (TaskType::Classification, Target::Classes(_)) | (TaskType::Regression, Target::Values(_)) => Ok(()),
        _ => Err(AutomlError::config(format!(
            "estimator '{}' does not match the target type",
            model.kind
        ))),
    }
}

impl SklearnEstimator {
    /// Load the helper module. Fails with a collaborator error when Python
    /// or scikit-learn is not available.
    pub fn load() -> Result<Self> {
        let code = CString::new(HELPER_SOURCE)
            .map_err(|e| anyhow::anyhow!("Invalid helper source: {}", e))?;
        let helper = Python::with_gil(|py| -> PyResult<Py<PyModule>> {
            let module = PyModule::from_code(py, &code, c"sklearn_bridge.py", c"sklearn_bridge")?;
            Ok(module.unbind())
        })
        .map_err(collaborator("import failed"))?;
        debug!("scikit-learn bridge loaded");
        Ok(Self { helper })
    }
}

impl Estimator for SklearnEstimator {
    fn prepare(
        &self,
        frame: &Frame,
        target_column: &str,
        task: TaskType,
        reduce_to: Option<usize>,
    ) -> Result<Prepared> {
        let inputs = ModelInputs::from_frame(frame, target_column, task)?;
        let reduce_to = reduce_to.filter(|&k| k > 0);

        let (x, feature_names, reduced) = Python::with_gil(
            |py| -> PyResult<(Vec<Vec<f64>>, Vec<String>, bool)> {
                let numeric = PyDict::new(py);
                let categorical = PyDict::new(py);
                for column in &inputs.features {
                    match &column.data {
                        ColumnData::Numeric(values) => numeric
                            .set_item(column.name.as_str(), PyList::new(py, values.iter().copied())?)?,
                        ColumnData::Text(values) => categorical.set_item(
                            column.name.as_str(),
                            PyList::new(py, values.iter().map(Option::as_deref))?,
                        )?,
                    }
                }
                self.helper
                    .bind(py)
                    .getattr("prepare")?
                    .call1((numeric, categorical, reduce_to, DEFAULT_SEED))?
                    .extract()
            },
        )
        .map_err(collaborator("preprocessing failed"))?;

        debug!(
            rows = x.len(),
            features = feature_names.len(),
            reduced,
            "scikit-learn preprocessing done"
        );
        Ok(Prepared {
            x,
            used_features: inputs.used_features(),
            y: inputs.target,
            feature_names,
            reduced,
            dropped_rows: inputs.dropped_rows,
        })
    }

    fn fit_and_score(
        &self,
        model: &PlannedModel,
        data: &Prepared,
        cv: &CvStrategy,
    ) -> Result<CvScore> {
        check_task(model, &data.y)?;
        cv.check_rows(data.n_rows())?;

        let scores: Vec<f64> = Python::with_gil(|py| -> PyResult<Vec<f64>> {
            let x = rows_to_list(py, &data.x)?;
            let y = target_to_list(py, &data.y)?;
            self.helper
                .bind(py)
                .getattr("score")?
                .call1((
                    model.kind.as_str(),
                    model.params.to_string(),
                    x,
                    y,
                    cv.n_splits,
                    cv.seed,
                    cv.stratified,
                    cv.metric.as_str(),
                ))?
                .extract()
        })
        .map_err(collaborator("cross-validation failed"))?;

        debug!(model = %model.kind, ?scores, "folds scored");
        Ok(CvScore::from_folds(scores, cv.metric))
    }

    fn fit(&self, model: &PlannedModel, data: &Prepared) -> Result<Box<dyn FittedModel>> {
        check_task(model, &data.y)?;

        let fitted = Python::with_gil(|py| -> PyResult<SklearnModel> {
            let x = rows_to_list(py, &data.x)?;
            let y = target_to_list(py, &data.y)?;
            let handle = self
                .helper
                .bind(py)
                .getattr("fit")?
                .call1((model.kind.as_str(), model.params.to_string(), x, y, DEFAULT_SEED))?;
            Ok(SklearnModel {
                kind: model.kind,
                handle: handle.unbind(),
                helper: self.helper.clone_ref(py),
            })
        })
        .map_err(collaborator("fit failed"))?;
        Ok(Box::new(fitted))
    }
}

/// A fitted scikit-learn estimator living in the interpreter.
pub struct SklearnModel {
    kind: ModelKind,
    handle: PyObject,
    helper: Py<PyModule>,
}

impl FittedModel for SklearnModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn raw_importances(&self) -> Result<Option<Vec<f64>>> {
        let raw = Python::with_gil(|py| -> PyResult<Option<Vec<f64>>> {
            self.helper
                .bind(py)
                .getattr("importances")?
                .call1((self.handle.bind(py),))?
                .extract()
        })
        .map_err(collaborator("reading importances failed"))?;
        Ok(raw)
    }
}
