use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use occore::loss::{BetaStabilizing, CondensationConfig, CondensationInput, EnergyInput, SimpleClusSpaceConfig};

use crate::to_py_err;

type LossTuple = (f32, f32, f32, f32, f32, f32, f32);

fn condensation_config(
    q_min: f32,
    s_b: f32,
    beta_stabilizing: &str,
    use_average_cc_pos: f32,
    trace_components: bool,
) -> PyResult<CondensationConfig> {
    let beta_stabilizing: BetaStabilizing = beta_stabilizing.parse().map_err(to_py_err)?;
    Ok(CondensationConfig {
        q_min,
        s_b,
        beta_stabilizing,
        use_average_cc_pos,
        trace_components,
    })
}

#[pyfunction]
#[pyo3(signature = (betas, coords, t_beta=0.1, t_d=1.0))]
pub fn get_clustering<'py>(
    py: Python<'py>,
    betas: PyReadonlyArray1<'py, f32>,
    coords: PyReadonlyArray2<'py, f32>,
    t_beta: f32,
    t_d: f32,
) -> PyResult<Bound<'py, PyArray1<i64>>> {
    let labels = occore::clustering::get_clustering(betas.as_array(), coords.as_array(), t_beta, t_d)
        .map_err(to_py_err)?;
    Ok(labels.into_pyarray_bound(py))
}

/// Hit × cluster matrix with a 1 where the hit belongs to the cluster.
#[pyfunction]
pub fn connectivity_mask<'py>(
    py: Python<'py>,
    cluster_index: Vec<usize>,
    n_clusters: usize,
) -> PyResult<Bound<'py, PyArray2<u8>>> {
    let m = occore::loss::masks::connectivity_mask(&cluster_index, n_clusters).map_err(to_py_err)?;
    Ok(m.into_pyarray_bound(py))
}

#[pyfunction]
pub fn inter_event_norms_mask<'py>(
    py: Python<'py>,
    batch: Vec<usize>,
    n_clusters_per_event: Vec<usize>,
) -> PyResult<Bound<'py, PyArray2<u8>>> {
    let m = occore::loss::masks::inter_event_norms_mask(&batch, &n_clusters_per_event).map_err(to_py_err)?;
    Ok(m.into_pyarray_bound(py))
}

#[pyfunction]
pub fn anti_connectivity_mask<'py>(
    py: Python<'py>,
    cluster_index: Vec<usize>,
    batch: Vec<usize>,
    n_clusters_per_event: Vec<usize>,
) -> PyResult<Bound<'py, PyArray2<u8>>> {
    let m = occore::loss::masks::anti_connectivity_mask(&cluster_index, &batch, &n_clusters_per_event)
        .map_err(to_py_err)?;
    Ok(m.into_pyarray_bound(py))
}

/// Object condensation loss as `(L_V, L_beta, 0, 0, L_beta_sig, L_beta_noise, 0)`.
#[pyfunction]
#[pyo3(signature = (
    betas, coords, cluster_index_per_event, batch,
    q_min=0.1, s_b=1.0, beta_stabilizing="soft_q_scaling", use_average_cc_pos=0.0, trace_components=false
))]
#[allow(clippy::too_many_arguments)]
pub fn calc_lv_lbeta(
    betas: PyReadonlyArray1<'_, f32>,
    coords: PyReadonlyArray2<'_, f32>,
    cluster_index_per_event: Vec<usize>,
    batch: Vec<usize>,
    q_min: f32,
    s_b: f32,
    beta_stabilizing: &str,
    use_average_cc_pos: f32,
    trace_components: bool,
) -> PyResult<LossTuple> {
    let config = condensation_config(q_min, s_b, beta_stabilizing, use_average_cc_pos, trace_components)?;
    let beta = betas.as_array().to_vec();
    let input = CondensationInput {
        beta: &beta,
        coords: coords.as_array(),
        cluster_index_per_event: &cluster_index_per_event,
        batch: &batch,
        energy: None,
    };
    let t = occore::loss::calc_lv_lbeta(&input, &config).map_err(to_py_err)?.to_tuple();
    Ok((t[0], t[1], t[2], t[3], t[4], t[5], t[6]))
}

/// Energy regression term of the condensation loss.
#[pyfunction]
#[pyo3(signature = (
    betas, coords, cluster_index_per_event, batch, hit_energy_pred, hit_energy_true,
    energy_correction=None, beta_stabilizing="soft_q_scaling"
))]
#[allow(clippy::too_many_arguments)]
pub fn calc_energy_loss(
    betas: PyReadonlyArray1<'_, f32>,
    coords: PyReadonlyArray2<'_, f32>,
    cluster_index_per_event: Vec<usize>,
    batch: Vec<usize>,
    hit_energy_pred: PyReadonlyArray1<'_, f32>,
    hit_energy_true: PyReadonlyArray1<'_, f32>,
    energy_correction: Option<PyReadonlyArray1<'_, f32>>,
    beta_stabilizing: &str,
) -> PyResult<f32> {
    let config = condensation_config(0.1, 1.0, beta_stabilizing, 0.0, false)?;
    let beta = betas.as_array().to_vec();
    let pred = hit_energy_pred.as_array().to_vec();
    let truth = hit_energy_true.as_array().to_vec();
    let corr = energy_correction.map(|c| c.as_array().to_vec());
    let input = CondensationInput {
        beta: &beta,
        coords: coords.as_array(),
        cluster_index_per_event: &cluster_index_per_event,
        batch: &batch,
        energy: Some(EnergyInput {
            hit_energy_pred: &pred,
            energy_correction: corr.as_deref(),
            hit_energy_true: &truth,
        }),
    };
    let loss = occore::loss::calc_lv_lbeta(&input, &config).map_err(to_py_err)?;
    loss.l_energy
        .ok_or_else(|| PyValueError::new_err("energy term was not computed"))
}

/// Returns `(L_attractive, L_repulsive, L_edc)`, `L_edc` only with `pred_edc`.
#[pyfunction]
#[pyo3(signature = (coords, cluster_index_per_event, batch, huberize_norm_for_v_attractive=true, pred_edc=None))]
pub fn calc_simple_clus_space_loss(
    coords: PyReadonlyArray2<'_, f32>,
    cluster_index_per_event: Vec<usize>,
    batch: Vec<usize>,
    huberize_norm_for_v_attractive: bool,
    pred_edc: Option<PyReadonlyArray1<'_, f32>>,
) -> PyResult<(f32, f32, Option<f32>)> {
    let config = SimpleClusSpaceConfig {
        huberize_norm_for_v_attractive,
    };
    let edc = pred_edc.map(|e| e.as_array().to_vec());
    let loss = occore::loss::calc_simple_clus_space_loss(
        coords.as_array(),
        &cluster_index_per_event,
        &batch,
        &config,
        edc.as_deref(),
    )
    .map_err(to_py_err)?;
    Ok((loss.l_attractive, loss.l_repulsive, loss.l_edc))
}
