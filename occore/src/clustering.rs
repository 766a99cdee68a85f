use std::cmp::Reverse;

use ndarray::{ArrayView1, ArrayView2};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, OcError, OcResult};
use crate::loss::condensation::sq_dist;

/// Label of points not claimed by any condensation point.
pub const UNASSIGNED: i64 = -1;

/// Thresholds of the greedy decoder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    /// Minimal beta of a condensation point candidate (exclusive).
    pub t_beta: f32,
    /// Claim radius in clustering space (exclusive).
    pub t_d: f32,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self { t_beta: 0.1, t_d: 1.0 }
    }
}

impl ClusteringParams {
    pub fn cluster(&self, betas: ArrayView1<f32>, coords: ArrayView2<f32>) -> OcResult<Vec<i64>> {
        get_clustering(betas, coords, self.t_beta, self.t_d)
    }
}

/// Greedy clustering of model output into hit -> condensation point labels.
///
/// Points with `beta > t_beta` are visited in descending beta order (ties in
/// input order). Each visited point claims every still unclaimed point closer
/// than `t_d`, including itself. A visited point that was already claimed
/// still claims the remaining points. Unclaimed points end up as `-1`.
pub fn get_clustering(
    betas: ArrayView1<f32>,
    coords: ArrayView2<f32>,
    t_beta: f32,
    t_d: f32,
) -> OcResult<Vec<i64>> {
    ensure_len("coords rows", betas.len(), coords.nrows())?;

    let n_points = betas.len();
    let mut candidates: Vec<usize> = (0..n_points).filter(|&i| betas[i] > t_beta).collect();
    // stable: equal betas keep input order
    candidates.sort_by_key(|&i| Reverse(OrderedFloat(betas[i])));

    let mut clustering = vec![UNASSIGNED; n_points];
    let mut unassigned: Vec<usize> = (0..n_points).collect();

    for &cp in &candidates {
        if unassigned.is_empty() {
            break;
        }
        let x_cp = coords.row(cp);
        unassigned.retain(|&j| {
            if sq_dist(coords.row(j), x_cp).sqrt() < t_d {
                clustering[j] = cp as i64;
                false
            } else {
                true
            }
        });
    }

    log::debug!(
        "greedy clustering: {} candidates, {} of {} points unassigned",
        candidates.len(),
        unassigned.len(),
        n_points
    );

    Ok(clustering)
}

/// [`get_clustering`] on flat row-major buffers, as handed over from numpy.
pub fn get_clustering_np(betas: &[f32], coords: &[f32], dim: usize, t_beta: f32, t_d: f32) -> OcResult<Vec<i64>> {
    if dim == 0 {
        return Err(OcError::InvalidInput("clustering space dimension must be > 0".to_string()));
    }
    ensure_len("coords", betas.len() * dim, coords.len())?;
    let coords = ArrayView2::from_shape((betas.len(), dim), coords)
        .map_err(|e| OcError::InvalidInput(e.to_string()))?;
    get_clustering(ArrayView1::from(betas), coords, t_beta, t_d)
}
