//! Object condensation loss (attractive/repulsive potential plus beta terms).
//!
//! Concepts:
//! - A hit belongs to exactly one cluster (`cluster_index_per_event`, event-local)
//!   and to exactly one event (`batch`).
//! - Cluster 0 of every event is the noise cluster; its hits are noise hits.
//!   All other hits are signal hits.
//! - An object is a cluster that is not a noise cluster.
//!
//! All reductions are segmented by event: objects of one event never act on
//! hits of another.

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, OcError, OcResult};
use crate::index::remap::{batch_cluster_indices_sized, n_events};
use crate::index::scatter::{scatter_add, scatter_any, scatter_argmax, scatter_count, segment_offsets};
use crate::loss::config::{CondensationConfig, BETA_CLIP_MAX};

/// Optional energy regression targets, all per hit.
#[derive(Clone, Copy, Debug)]
pub struct EnergyInput<'a> {
    /// Predicted energy contribution of every hit; summed per object.
    pub hit_energy_pred: &'a [f32],
    /// Multiplicative correction applied to the summed object energy per hit.
    pub energy_correction: Option<&'a [f32]>,
    /// True energy of the particle the hit belongs to.
    pub hit_energy_true: &'a [f32],
}

#[derive(Clone, Copy, Debug)]
pub struct CondensationInput<'a> {
    /// Predicted condensation likelihood per hit, in (0, 1). NaN entries are zeroed.
    pub beta: &'a [f32],
    /// Predicted clustering-space coordinates, (n_hits, dim).
    pub coords: ArrayView2<'a, f32>,
    /// Truth cluster per hit, event-local, 0 = noise.
    pub cluster_index_per_event: &'a [usize],
    /// Event id per hit.
    pub batch: &'a [usize],
    pub energy: Option<EnergyInput<'a>>,
}

/// Scalar terms of one loss evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CondensationLoss {
    pub l_v: f32,
    pub l_beta: f32,
    pub l_beta_sig: f32,
    pub l_beta_noise: f32,
    pub l_energy: Option<f32>,
    pub batch_size: usize,
    pub n_objects: usize,
}

impl CondensationLoss {
    /// Positional form handed to the training loop:
    /// `(L_V, L_beta, 0, 0, L_beta_sig, L_beta_noise, 0)`.
    pub fn to_tuple(&self) -> [f32; 7] {
        [
            self.l_v,
            self.l_beta,
            0.0,
            0.0,
            self.l_beta_sig,
            self.l_beta_noise,
            0.0,
        ]
    }

    /// Terms divided by the batch size.
    pub fn components(&self) -> LossComponents {
        let bs = self.batch_size.max(1) as f32;
        LossComponents {
            l_v: self.l_v / bs,
            l_beta: self.l_beta / bs,
            l_beta_noise: self.l_beta_noise / bs,
            l_beta_sig: self.l_beta_sig / bs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossComponents {
    pub l_v: f32,
    pub l_beta: f32,
    pub l_beta_noise: f32,
    pub l_beta_sig: f32,
}

impl fmt::Display for LossComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.l_v + self.l_beta;
        let term = |v: f32| {
            let pct = if total != 0.0 { 100.0 * v / total } else { 0.0 };
            format!("{:+.4} ({:.1}%)", v, pct)
        };
        writeln!(f, "  L_V                 = {}", term(self.l_v))?;
        writeln!(f, "  L_beta              = {}", term(self.l_beta))?;
        writeln!(f, "    L_beta_noise        = {}", term(self.l_beta_noise))?;
        write!(f, "    L_beta_sig          = {}", term(self.l_beta_sig))
    }
}

/// Signal hits grouped into batch-global objects.
#[derive(Clone, Debug)]
pub(crate) struct ObjectLayout {
    pub is_sig: Vec<bool>,
    /// Hit position of every signal hit.
    pub sig_hits: Vec<usize>,
    /// Object per signal hit (aligned with `sig_hits`).
    pub object_index: Vec<usize>,
    pub n_objects_per_event: Vec<usize>,
    pub object_offsets: Vec<usize>,
    pub n_objects: usize,
}

impl ObjectLayout {
    pub fn build(cluster_index_per_event: &[usize], batch: &[usize], batch_size: usize) -> OcResult<Self> {
        ensure_len("batch", cluster_index_per_event.len(), batch.len())?;

        let (cluster_index, n_clusters_per_event) =
            batch_cluster_indices_sized(cluster_index_per_event, batch, batch_size)?;
        let n_clusters: usize = n_clusters_per_event.iter().sum();

        let is_sig: Vec<bool> = cluster_index_per_event.iter().map(|&c| c != 0).collect();
        let is_object = scatter_any(&is_sig, &cluster_index, n_clusters)?;
        let n_objects = is_object.iter().filter(|&&o| o).count();

        let sig_hits: Vec<usize> = (0..is_sig.len()).filter(|&i| is_sig[i]).collect();
        let object_index_per_event: Vec<usize> =
            sig_hits.iter().map(|&i| cluster_index_per_event[i] - 1).collect();
        let batch_sig: Vec<usize> = sig_hits.iter().map(|&i| batch[i]).collect();

        let (object_index, n_objects_per_event) =
            batch_cluster_indices_sized(&object_index_per_event, &batch_sig, batch_size)?;
        let n_slots: usize = n_objects_per_event.iter().sum();
        let n_hits_per_object = scatter_count(&object_index, n_slots)?;

        ensure_len("object index", sig_hits.len(), object_index.len())?;
        ensure_len("object mask", n_clusters, is_object.len())?;
        if let Some(empty) = n_hits_per_object.iter().position(|&n| n == 0) {
            return Err(OcError::Invariant(format!(
                "object {} has no hits (cluster ids of its event are not contiguous)",
                empty
            )));
        }
        if n_slots != n_objects {
            return Err(OcError::Invariant(format!(
                "object index range covers {} objects, found {}",
                n_slots, n_objects
            )));
        }

        let object_offsets = segment_offsets(&n_objects_per_event);
        Ok(Self {
            is_sig,
            sig_hits,
            object_index,
            n_objects_per_event,
            object_offsets,
            n_objects,
        })
    }

    #[inline]
    pub fn event_objects(&self, event: usize) -> std::ops::Range<usize> {
        let start = self.object_offsets[event];
        start..start + self.n_objects_per_event[event]
    }
}

#[inline]
pub(crate) fn sq_dist(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Replaces NaN by 0 and re-checks; a remaining NaN is fatal.
fn sanitize_beta(beta: &[f32]) -> OcResult<Vec<f32>> {
    let n_nan = beta.iter().filter(|b| b.is_nan()).count();
    if n_nan > 0 {
        log::warn!("{} NaN values in beta, replaced by 0", n_nan);
    }
    let clean: Vec<f32> = beta.iter().map(|&b| if b.is_nan() { 0.0 } else { b }).collect();
    if clean.iter().any(|b| b.is_nan()) {
        return Err(OcError::Numerical("NaN in beta after sanitization".to_string()));
    }
    Ok(clean)
}

/// Object condensation loss over a batch of events.
///
/// For every object the signal hit with the highest charge
/// `q = artanh(beta)² + q_min` is its condensation point `x_alpha`. With
/// `k(i, a) = exp(-|x_i - x_a|²)` every signal hit contributes
/// `-q_i * ln(exp(k(i, own)) / sum_a exp(k(i, a) * [a != own]))`, the sum
/// running over the objects of the hit's event. `L_V` is the mean over signal
/// hits.
pub fn calc_lv_lbeta(input: &CondensationInput, config: &CondensationConfig) -> OcResult<CondensationLoss> {
    let n_hits = input.beta.len();
    if n_hits == 0 {
        return Err(OcError::InvalidInput("empty batch".to_string()));
    }
    ensure_len("coords rows", n_hits, input.coords.nrows())?;
    ensure_len("cluster_index_per_event", n_hits, input.cluster_index_per_event.len())?;
    ensure_len("batch", n_hits, input.batch.len())?;

    let beta = sanitize_beta(input.beta)?;
    let batch = input.batch;
    let coords = input.coords;
    let batch_size = n_events(batch);

    let layout = ObjectLayout::build(input.cluster_index_per_event, batch, batch_size)?;
    let n_objects = layout.n_objects;
    let n_sig = layout.sig_hits.len();

    let q: Vec<f32> = beta
        .iter()
        .map(|&b| config.beta_stabilizing.charge(b, config.q_min))
        .collect();
    if q.iter().any(|v| v.is_nan()) {
        return Err(OcError::Numerical("NaN in charge q".to_string()));
    }

    // condensation point per object: the first hit with maximal q
    let q_sig: Vec<f32> = layout.sig_hits.iter().map(|&i| q[i]).collect();
    let (_, arg) = scatter_argmax(&q_sig, &layout.object_index, n_objects)?;
    let mut alpha_hit = Vec::with_capacity(n_objects);
    for (o, a) in arg.iter().enumerate() {
        match a {
            Some(pos) => alpha_hit.push(layout.sig_hits[*pos]),
            None => return Err(OcError::Invariant(format!("object {} has no hits", o))),
        }
    }

    let dim = coords.ncols();
    let mut x_alpha = Array2::<f32>::zeros((n_objects, dim));
    for (o, &h) in alpha_hit.iter().enumerate() {
        x_alpha.row_mut(o).assign(&coords.row(h));
    }

    if config.use_average_cc_pos > 0.0 {
        let mut weighted = Array2::<f32>::zeros((n_objects, dim));
        let mut q_sum = vec![0.0f32; n_objects];
        for (&h, &o) in layout.sig_hits.iter().zip(&layout.object_index) {
            weighted.row_mut(o).scaled_add(q[h], &coords.row(h));
            q_sum[o] += q[h];
        }
        let f = config.use_average_cc_pos;
        for o in 0..n_objects {
            let div = 1.0 / (q_sum[o] + 1e-9);
            let div = if div.is_nan() { 0.0 } else { div };
            for d in 0..dim {
                x_alpha[(o, d)] = f * weighted[(o, d)] * div + (1.0 - f) * x_alpha[(o, d)];
            }
        }
    }

    let beta_alpha: Vec<f32> = alpha_hit.iter().map(|&h| beta[h]).collect();

    // L_V: per signal hit, then a plain sequential mean
    let v_per_hit: Vec<f32> = (0..n_sig)
        .into_par_iter()
        .map(|k| {
            let i = layout.sig_hits[k];
            let own = layout.object_index[k];
            let xi = coords.row(i);
            let k_own = (-sq_dist(xi, x_alpha.row(own))).exp();
            let v_rep: f32 = layout
                .event_objects(batch[i])
                .map(|a| {
                    if a == own {
                        1.0
                    } else {
                        (-sq_dist(xi, x_alpha.row(a))).exp().exp()
                    }
                })
                .sum();
            -q[i] * (k_own - v_rep.ln())
        })
        .collect();
    let l_v = if n_sig > 0 {
        v_per_hit.iter().sum::<f32>() / n_sig as f32
    } else {
        0.0
    };

    // beta noise term: mean beta of noise hits per event
    let mut noise_sum = vec![0.0f32; batch_size];
    let mut noise_count = vec![0usize; batch_size];
    for (i, &b) in batch.iter().enumerate() {
        if !layout.is_sig[i] {
            noise_sum[b] += beta[i];
            noise_count[b] += 1;
        }
    }
    let l_beta_noise = config.s_b
        * noise_sum
            .iter()
            .zip(&noise_count)
            .map(|(&s, &n)| s / n.max(1) as f32)
            .sum::<f32>()
        / batch_size as f32;

    // beta signal term, per object
    let beta_sig: Vec<f32> = layout.sig_hits.iter().map(|&i| beta[i]).collect();
    let beta_per_object = scatter_add(&beta_sig, &layout.object_index, n_objects)?;
    let l_beta_sig = if n_objects > 0 {
        beta_alpha
            .iter()
            .zip(&beta_per_object)
            .map(|(&ba, &bs)| 1.0 - ba + 1.0 - bs.clamp(0.0, 1.0))
            .sum::<f32>()
            / n_objects as f32
    } else {
        0.0
    };

    let l_energy = match &input.energy {
        Some(energy) => Some(energy_loss(energy, &beta, &layout, n_hits)?),
        None => None,
    };

    let loss = CondensationLoss {
        l_v,
        l_beta: l_beta_noise + l_beta_sig,
        l_beta_sig,
        l_beta_noise,
        l_energy,
        batch_size,
        n_objects,
    };

    if !loss.l_beta.is_finite() || !loss.l_v.is_finite() {
        log::warn!(
            "non-finite loss: L_V={} L_beta={} (noise={}, sig={})",
            loss.l_v, loss.l_beta, loss.l_beta_noise, loss.l_beta_sig
        );
    }
    if config.trace_components {
        log::debug!("object condensation components:\n{}", loss.components());
    }

    Ok(loss)
}

/// Relative squared error of the summed object energy, weighted per hit by
/// `(artanh(beta) / 1.01)² + 1e-3`. A zero true energy divides by 1.
fn energy_loss(energy: &EnergyInput, beta: &[f32], layout: &ObjectLayout, n_hits: usize) -> OcResult<f32> {
    ensure_len("hit_energy_pred", n_hits, energy.hit_energy_pred.len())?;
    ensure_len("hit_energy_true", n_hits, energy.hit_energy_true.len())?;
    if let Some(corr) = energy.energy_correction {
        ensure_len("energy_correction", n_hits, corr.len())?;
    }

    let pred_sig: Vec<f32> = layout
        .sig_hits
        .iter()
        .map(|&i| energy.hit_energy_pred[i])
        .collect();
    let e_pred_per_object = scatter_add(&pred_sig, &layout.object_index, layout.n_objects)?;

    let mut weighted = 0.0f32;
    let mut weights = 0.0f32;
    for (&i, &o) in layout.sig_hits.iter().zip(&layout.object_index) {
        let corr = energy.energy_correction.map_or(1.0, |c| c[i]);
        let e_pred = e_pred_per_object[o] * corr;
        let e_true = energy.hit_energy_true[i];
        if !(e_true >= 0.0) {
            return Err(OcError::InvalidInput(format!(
                "signal hit {} has negative or NaN true energy {}",
                i, e_true
            )));
        }
        let denom = if e_true > 0.0 { e_true } else { 1.0 };
        let l = (e_pred - e_true) * (e_pred - e_true) / denom;
        let a = beta[i].clamp(0.0, BETA_CLIP_MAX).atanh() / 1.01;
        let w = a * a + 1e-3;
        weighted += l * w;
        weights += w;
    }

    Ok(if weights > 0.0 { weighted / weights } else { 0.0 })
}
