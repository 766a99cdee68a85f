//! Mapping between event-local cluster ids and batch-global cluster ids.

use itertools::Itertools;

use crate::error::{ensure_len, OcError, OcResult};
use crate::index::scatter::segment_offsets;

/// Number of events spanned by `batch`, i.e. `max(batch) + 1` (0 when empty).
#[inline]
pub fn n_events(batch: &[usize]) -> usize {
    batch.iter().max().map_or(0, |&m| m + 1)
}

/// Turns cluster indices per event into an index over the whole batch.
///
/// ```text
/// cluster_id = [0, 0, 1, 1, 2, 0, 0, 1, 1, 1, 0, 0, 1]
/// batch      = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2]
/// offset     = [0, 0, 0, 0, 0, 3, 3, 3, 3, 3, 5, 5, 5]
/// output     = [0, 0, 1, 1, 2, 3, 3, 4, 4, 4, 5, 5, 6]
/// ```
///
/// Returns the global id per hit and the number of cluster slots per event
/// (`max(local id) + 1`, or 0 for an event without hits). Local ids are not
/// compacted; use [`reincrementalize`] to close gaps first.
pub fn batch_cluster_indices(
    cluster_id: &[usize],
    batch: &[usize],
) -> OcResult<(Vec<usize>, Vec<usize>)> {
    batch_cluster_indices_sized(cluster_id, batch, n_events(batch))
}

/// [`batch_cluster_indices`] with an explicit event count, so the per-event
/// array stays aligned with the batch when only a subset of hits is passed.
pub fn batch_cluster_indices_sized(
    cluster_id: &[usize],
    batch: &[usize],
    n_events: usize,
) -> OcResult<(Vec<usize>, Vec<usize>)> {
    ensure_len("batch", cluster_id.len(), batch.len())?;

    let mut n_clusters_per_event = vec![0usize; n_events];
    for (&c, &b) in cluster_id.iter().zip(batch) {
        if b >= n_events {
            return Err(OcError::InvalidInput(format!(
                "event id {} out of range for {} events",
                b, n_events
            )));
        }
        n_clusters_per_event[b] = n_clusters_per_event[b].max(c + 1);
    }

    let offsets = segment_offsets(&n_clusters_per_event);
    let global = cluster_id
        .iter()
        .zip(batch)
        .map(|(&c, &b)| offsets[b] + c)
        .collect();

    Ok((global, n_clusters_per_event))
}

/// Re-indexes `y` so that missing clusters are no longer counted.
///
/// ```text
/// y      = [0, 0, 0, 1, 1, 3, 3,  0, 0, 0, 0, 0, 2, 2, 3, 3,  0, 0, 1, 1]
/// batch  = [0, 0, 0, 0, 0, 0, 0,  1, 1, 1, 1, 1, 1, 1, 1, 1,  2, 2, 2, 2]
/// output = [0, 0, 0, 1, 1, 2, 2,  0, 0, 0, 0, 0, 1, 1, 2, 2,  0, 0, 1, 1]
/// ```
pub fn reincrementalize(y: &[usize], batch: &[usize]) -> OcResult<Vec<usize>> {
    ensure_len("batch", y.len(), batch.len())?;

    let n = n_events(batch);
    let mut present: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (&c, &b) in y.iter().zip(batch) {
        present[b].push(c);
    }
    let present: Vec<Vec<usize>> = present
        .into_iter()
        .map(|ids| ids.into_iter().sorted_unstable().dedup().collect())
        .collect();

    let out = y
        .iter()
        .zip(batch)
        .map(|(c, &b)| {
            // every id of the event is in its own sorted list
            present[b].binary_search(c).unwrap_or_default()
        })
        .collect();
    Ok(out)
}
