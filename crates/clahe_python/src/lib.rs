//! PyO3 Python bindings for volumetric CLAHE.
//!
//! This crate provides thin Python bindings for the clahe_core library.
//! All algorithm logic is in clahe_core; this crate only handles
//! Python/NumPy type conversions.

use numpy::ndarray::Array6;
use numpy::{PyArray6, PyReadonlyArray6, ToPyArray};
use pyo3::prelude::*;

use clahe_core::{equalize, mask_from_bool, usize_param, ClaheConfig, ClaheError};

fn to_py_err(err: ClaheError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(err.to_string())
}

/// Read a mask argument as float32 or bool 6-D array.
///
/// Anything else (wrong rank, dtype, or a placeholder such as `np.zeros(1)`)
/// disables masking, same as a mask of mismatched shape.
fn extract_mask(mask: Option<&PyAny>) -> Option<Array6<f32>> {
    let obj = mask.filter(|obj| !obj.is_none())?;

    if let Ok(array) = obj.extract::<PyReadonlyArray6<f32>>() {
        return Some(array.as_array().to_owned());
    }
    if let Ok(array) = obj.extract::<PyReadonlyArray6<bool>>() {
        return Some(mask_from_bool(array.as_array()));
    }

    log::debug!(
        "mask of type {} is not a 6-D float32/bool array; masking disabled",
        obj.get_type().name().unwrap_or("<unknown>")
    );
    None
}

/// Contrast-limited adaptive histogram equalization of a pre-blocked volume.
///
/// `volume` has shape (batch, channel, block, x, y, z). `mask` may be a float32
/// or bool array of the same shape; `None`, any other shape, or any other
/// array type disables masking.
#[pyfunction]
#[pyo3(signature = (volume, mask=None, clip_limit=0.2, nbins=256, overlap=0, adjust_edges=true, block_norm=false))]
#[allow(clippy::too_many_arguments)]
pub fn compute_clahe<'py>(
    py: Python<'py>,
    volume: PyReadonlyArray6<f32>,
    mask: Option<&PyAny>,
    clip_limit: f32,
    nbins: i64,
    overlap: i64,
    adjust_edges: bool,
    block_norm: bool,
) -> PyResult<&'py PyArray6<f32>> {
    let config = ClaheConfig::new()
        .with_clip_limit(clip_limit)
        .with_nbins(usize_param("nbins", nbins).map_err(to_py_err)?)
        .with_overlap(usize_param("overlap", overlap).map_err(to_py_err)?)
        .with_adjust_edges(adjust_edges)
        .with_block_norm(block_norm);

    let mask = extract_mask(mask);
    let volume = volume.as_array();

    let output = py
        .allow_threads(|| equalize(volume, mask.as_ref().map(|m| m.view()), &config))
        .map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Volumetric CLAHE accelerator module
#[pymodule]
fn torch_clahe(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compute_clahe, m)?)?;
    Ok(())
}
