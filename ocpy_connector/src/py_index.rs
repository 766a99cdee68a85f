use pyo3::prelude::*;

use crate::to_py_err;

#[pyfunction]
pub fn batch_cluster_indices(cluster_id: Vec<usize>, batch: Vec<usize>) -> PyResult<(Vec<usize>, Vec<usize>)> {
    occore::index::batch_cluster_indices(&cluster_id, &batch).map_err(to_py_err)
}

#[pyfunction]
pub fn scatter_counts_to_indices(counts: Vec<usize>) -> Vec<usize> {
    occore::index::scatter_counts_to_indices(&counts)
}

#[pyfunction]
pub fn reincrementalize(y: Vec<usize>, batch: Vec<usize>) -> PyResult<Vec<usize>> {
    occore::index::reincrementalize(&y, &batch).map_err(to_py_err)
}

/// Returns `(cluster_id, particles)`; see `ocgraph::label::find_cluster_id`.
#[pyfunction]
pub fn find_cluster_id(hit_particle_link: Vec<i64>) -> (Vec<usize>, Vec<i64>) {
    let map = ocgraph::label::find_cluster_id(&hit_particle_link);
    (map.cluster_id, map.particles)
}
