//! Dense hit × cluster masks.
//!
//! The loss engine itself walks event-local object ranges instead of
//! materialising these, but the dense form is handy for inspection and for
//! callers that want to reproduce the reductions with matrix products.

use ndarray::Array2;

use crate::error::{ensure_len, OcError, OcResult};
use crate::index::scatter::scatter_counts_to_indices;

/// Connectivity matrix from hit (row) to global cluster (column).
///
/// ```text
/// [1, 3, 1, 0] -> [[0, 1, 0, 0],
///                  [0, 0, 0, 1],
///                  [0, 1, 0, 0],
///                  [1, 0, 0, 0]]
/// ```
pub fn connectivity_mask(cluster_index: &[usize], n_clusters: usize) -> OcResult<Array2<u8>> {
    let mut m = Array2::<u8>::zeros((cluster_index.len(), n_clusters));
    for (row, &c) in cluster_index.iter().enumerate() {
        if c >= n_clusters {
            return Err(OcError::InvalidInput(format!(
                "cluster index {} out of range for {} clusters",
                c, n_clusters
            )));
        }
        m[(row, c)] = 1;
    }
    Ok(m)
}

/// Mask of shape (n_hits, n_clusters) that is 1 iff hit `i` is in the same
/// event as cluster `j`.
pub fn inter_event_norms_mask(
    batch: &[usize],
    n_clusters_per_event: &[usize],
) -> OcResult<Array2<u8>> {
    let cluster_event = scatter_counts_to_indices(n_clusters_per_event);
    let mut m = Array2::<u8>::zeros((batch.len(), cluster_event.len()));
    for (row, &b) in batch.iter().enumerate() {
        if b >= n_clusters_per_event.len() {
            return Err(OcError::InvalidInput(format!(
                "event id {} out of range for {} events",
                b,
                n_clusters_per_event.len()
            )));
        }
        for (col, &e) in cluster_event.iter().enumerate() {
            if e == b {
                m[(row, col)] = 1;
            }
        }
    }
    Ok(m)
}

/// Same-event, different-cluster mask (`inter_event - connectivity`).
pub fn anti_connectivity_mask(
    cluster_index: &[usize],
    batch: &[usize],
    n_clusters_per_event: &[usize],
) -> OcResult<Array2<u8>> {
    ensure_len("batch", cluster_index.len(), batch.len())?;
    let n_clusters: usize = n_clusters_per_event.iter().sum();
    let m = connectivity_mask(cluster_index, n_clusters)?;
    let inter = inter_event_norms_mask(batch, n_clusters_per_event)?;
    if m.iter().zip(inter.iter()).any(|(&a, &b)| a > b) {
        return Err(OcError::Invariant(
            "hit assigned to a cluster of another event".to_string(),
        ));
    }
    Ok(inter - m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::remap::batch_cluster_indices;
    use ndarray::array;

    #[test]
    fn test_connectivity_mask() {
        let m = connectivity_mask(&[1, 3, 1, 0], 4).unwrap();
        assert_eq!(
            m,
            array![[0u8, 1, 0, 0], [0, 0, 0, 1], [0, 1, 0, 0], [1, 0, 0, 0]]
        );
    }

    #[test]
    fn test_inter_event_norms_mask() {
        let cluster_id = [0, 0, 1, 1, 2, 0, 0, 1, 1, 1, 0, 0, 1];
        let batch = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2];
        let (_, counts) = batch_cluster_indices(&cluster_id, &batch).unwrap();
        let m = inter_event_norms_mask(&batch, &counts).unwrap();
        assert_eq!(m.dim(), (13, 7));
        assert_eq!(m.row(0).to_vec(), vec![1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(m.row(7).to_vec(), vec![0, 0, 0, 1, 1, 0, 0]);
        assert_eq!(m.row(12).to_vec(), vec![0, 0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_anti_connectivity_mask() {
        let cluster_id = [0, 1, 0, 1];
        let batch = [0, 0, 1, 1];
        let (global, counts) = batch_cluster_indices(&cluster_id, &batch).unwrap();
        let m = anti_connectivity_mask(&global, &batch, &counts).unwrap();
        assert_eq!(
            m,
            array![[0u8, 1, 0, 0], [1, 0, 0, 0], [0, 0, 0, 1], [0, 0, 1, 0]]
        );
    }
}
