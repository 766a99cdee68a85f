mod py_index;
mod py_loss;
mod py_graph;

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use occore::error::OcError;

pub(crate) fn to_py_err(e: OcError) -> PyErr {
    match e {
        OcError::Io(e) => PyIOError::new_err(e.to_string()),
        OcError::Invariant(_) | OcError::Numerical(_) => PyRuntimeError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

#[pymodule]
fn ocpy_connector(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_index::batch_cluster_indices, m)?)?;
    m.add_function(wrap_pyfunction!(py_index::scatter_counts_to_indices, m)?)?;
    m.add_function(wrap_pyfunction!(py_index::reincrementalize, m)?)?;
    m.add_function(wrap_pyfunction!(py_index::find_cluster_id, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::get_clustering, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::calc_lv_lbeta, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::calc_energy_loss, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::calc_simple_clus_space_loss, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::connectivity_mask, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::inter_event_norms_mask, m)?)?;
    m.add_function(wrap_pyfunction!(py_loss::anti_connectivity_mask, m)?)?;
    m.add_function(wrap_pyfunction!(py_graph::create_graph_tracking_cld, m)?)?;
    Ok(())
}
