//! Attractive/repulsive cluster-space loss w.r.t. the arithmetic cluster
//! centers instead of the condensation points.

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, OcError, OcResult};
use crate::index::remap::{batch_cluster_indices, n_events};
use crate::index::scatter::{scatter_count, scatter_mean_rows, segment_offsets};
use crate::loss::condensation::sq_dist;
use crate::loss::config::SimpleClusSpaceConfig;

const HUBER_DELTA: f32 = 4.0;

/// Huber norm scaled by 2: `d²` inside `delta`, linear `2 delta (|d| - delta)` outside.
#[inline]
pub fn huber(d: f32, delta: f32) -> f32 {
    if d.abs() <= delta {
        d * d
    } else {
        2.0 * delta * (d.abs() - delta)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleClusSpaceLoss {
    pub l_attractive: f32,
    pub l_repulsive: f32,
    /// Estimated-distance-to-center term, only when a prediction was passed.
    pub l_edc: Option<f32>,
}

pub fn calc_simple_clus_space_loss(
    coords: ArrayView2<f32>,
    cluster_index_per_event: &[usize],
    batch: &[usize],
    config: &SimpleClusSpaceConfig,
    pred_edc: Option<&[f32]>,
) -> OcResult<SimpleClusSpaceLoss> {
    let n_hits = coords.nrows();
    if n_hits == 0 {
        return Err(OcError::InvalidInput("empty batch".to_string()));
    }
    ensure_len("cluster_index_per_event", n_hits, cluster_index_per_event.len())?;
    ensure_len("batch", n_hits, batch.len())?;
    if let Some(edc) = pred_edc {
        ensure_len("pred_edc", n_hits, edc.len())?;
    }

    let batch_size = n_events(batch);
    let (cluster_index, n_clusters_per_event) = batch_cluster_indices(cluster_index_per_event, batch)?;
    let n_clusters: usize = n_clusters_per_event.iter().sum();
    let cluster_offsets = segment_offsets(&n_clusters_per_event);
    let n_hits_per_event = scatter_count(batch, batch_size)?;
    let n_hits_per_cluster = scatter_count(&cluster_index, n_clusters)?;

    let centers = scatter_mean_rows(coords, &cluster_index, n_clusters)?;

    // a cluster slot is an object when it is not the noise slot and holds hits
    let is_object = |event: usize, global: usize| {
        global != cluster_offsets[event] && n_hits_per_cluster[global] > 0
    };

    let per_hit: Vec<(f32, f32)> = (0..n_hits)
        .into_par_iter()
        .map(|i| {
            let e = batch[i];
            let own = cluster_index[i];
            let xi = coords.row(i);

            let att = if cluster_index_per_event[i] != 0 {
                let d2 = sq_dist(xi, centers.row(own));
                if config.huberize_norm_for_v_attractive {
                    huber(d2.sqrt() + 1e-5, HUBER_DELTA)
                } else {
                    d2
                }
            } else {
                0.0
            };

            let start = cluster_offsets[e];
            let rep: f32 = (start..start + n_clusters_per_event[e])
                .filter(|&c| c != own && is_object(e, c))
                .map(|c| (-4.0 * sq_dist(xi, centers.row(c))).exp())
                .sum();

            (att, rep)
        })
        .collect();

    let mut att_per_event = vec![0.0f32; batch_size];
    let mut rep_per_event = vec![0.0f32; batch_size];
    for (i, &(att, rep)) in per_hit.iter().enumerate() {
        att_per_event[batch[i]] += att;
        rep_per_event[batch[i]] += rep;
    }
    let per_event_mean = |sums: &[f32]| -> f32 {
        sums.iter()
            .zip(&n_hits_per_event)
            .map(|(&s, &n)| s / n.max(1) as f32)
            .sum()
    };

    let l_attractive = per_event_mean(&att_per_event) / batch_size as f32;
    let l_repulsive = per_event_mean(&rep_per_event) / batch_size as f32;

    let l_edc = pred_edc.map(|edc| {
        let mut edc_per_event = vec![0.0f32; batch_size];
        for i in 0..n_hits {
            if cluster_index_per_event[i] == 0 {
                continue;
            }
            let truth = sq_dist(coords.row(i), centers.row(cluster_index[i])).sqrt();
            let d = edc[i] - truth;
            edc_per_event[batch[i]] += d * d;
        }
        per_event_mean(&edc_per_event)
    });

    Ok(SimpleClusSpaceLoss {
        l_attractive,
        l_repulsive,
        l_edc,
    })
}
