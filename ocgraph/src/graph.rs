//! Per-event graph construction from an [`EventTable`].

use std::fmt;

use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};

use occore::error::{ensure_len, OcError, OcResult};

use crate::label::{create_noise_label, find_cluster_id, ClusterIdMap};
use crate::table::{
    EventTable, HIT_TYPE_COL, PARTICLE_ENERGY_ROW, PARTICLE_MOMENTUM_ROW, POS_COLS, ROW_LINK, ROW_TAU_LINK,
    ROW_TRACK_INDEX, ROW_UNIQUE_ID,
};

/// Events with fewer raw hits are not turned into graphs.
pub const MIN_RAW_HITS: usize = 10;
/// Events with fewer retained particles are not turned into graphs.
pub const MIN_PARTICLES: usize = 4;

/// Which optional columns are extracted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Inference mode: keep track index, unique id and (with `tau`) tau momentum.
    pub predict: bool,
    /// Keep the tau-ancestry link per hit.
    pub tau: bool,
    /// The last feature row is an overlay-background flag.
    pub overlay: bool,
}

impl GraphOptions {
    pub fn inference() -> Self {
        Self {
            predict: true,
            ..Self::default()
        }
    }
}

/// Columns extracted from one table, before any filtering.
#[derive(Clone, Debug)]
pub struct EventInputs {
    /// (n_particles, n_particle_features), in the order of `clusters.particles`.
    pub particle_features: Array2<f32>,
    pub clusters: ClusterIdMap,
    pub hit_particle_link: Vec<i64>,
    /// (n_hits, n_hit_features).
    pub hit_features: Array2<f32>,
    pub hit_type: Vec<i32>,
    pub track_index: Option<Vec<i64>>,
    pub unique_id: Option<Vec<i64>>,
    pub hit_particle_link_tau: Option<Vec<i64>>,
    /// Momentum of the tau ancestor per hit, 0 without one.
    pub tau_momentum: Option<Vec<f32>>,
    pub overlay_flag: Option<Vec<f32>>,
}

impl EventInputs {
    pub fn n_hits(&self) -> usize {
        self.hit_particle_link.len()
    }
}

/// Column of particle `id`; only columns marked in the particle mask are real.
fn particle_column(table: &EventTable, id: i64) -> OcResult<usize> {
    let n_particles = table.n_particles();
    match usize::try_from(id) {
        Ok(col) if col < n_particles => Ok(col),
        _ => Err(OcError::InvalidInput(format!(
            "particle id {} outside the {} real particles of the table",
            id, n_particles
        ))),
    }
}

pub fn create_inputs_from_table(table: &EventTable, options: &GraphOptions) -> OcResult<EventInputs> {
    table.validate()?;
    let n_hits = table.n_hits();

    let hit_particle_link: Vec<i64> = table.pf_vectoronly.slice(s![ROW_LINK, ..n_hits]).to_vec();
    let hit_features = table.pf_features.slice(s![.., ..n_hits]).t().to_owned();
    let hit_type: Vec<i32> = hit_features.column(HIT_TYPE_COL).iter().map(|&t| t as i32).collect();

    let hit_particle_link_tau = if options.tau {
        Some(table.pf_vectoronly.slice(s![ROW_TAU_LINK, ..n_hits]).to_vec())
    } else {
        None
    };
    let (track_index, unique_id) = if options.predict {
        (
            Some(table.pf_vectoronly.slice(s![ROW_TRACK_INDEX, ..n_hits]).to_vec()),
            Some(table.pf_vectoronly.slice(s![ROW_UNIQUE_ID, ..n_hits]).to_vec()),
        )
    } else {
        (None, None)
    };
    let overlay_flag = if options.overlay {
        hit_features.columns().into_iter().last().map(|c| c.to_vec())
    } else {
        None
    };

    let clusters = find_cluster_id(&hit_particle_link);

    let columns = clusters
        .particles
        .iter()
        .map(|&p| particle_column(table, p))
        .collect::<OcResult<Vec<usize>>>()?;
    let particle_features = table.pf_vectors.select(Axis(1), &columns).t().to_owned();

    let tau_momentum = match (&hit_particle_link_tau, options.predict) {
        (Some(tau_links), true) => {
            if table.pf_vectors.nrows() <= PARTICLE_MOMENTUM_ROW {
                return Err(OcError::InvalidInput(format!(
                    "tau momentum needs particle feature row {}",
                    PARTICLE_MOMENTUM_ROW
                )));
            }
            let mut mom = Vec::with_capacity(n_hits);
            for &l in tau_links {
                if l < 0 {
                    mom.push(0.0);
                } else {
                    mom.push(table.pf_vectors[(PARTICLE_MOMENTUM_ROW, particle_column(table, l)?)]);
                }
            }
            Some(mom)
        }
        _ => None,
    };

    Ok(EventInputs {
        particle_features,
        clusters,
        hit_particle_link,
        hit_features,
        hit_type,
        track_index,
        unique_id,
        hit_particle_link_tau,
        tau_momentum,
        overlay_flag,
    })
}

/// Inference-only node columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceColumns {
    pub track_index: Vec<i64>,
    pub unique_id: Vec<i64>,
    pub tau_momentum: Option<Vec<f32>>,
}

/// Nodes of one event; there are no edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventGraph {
    /// (n_nodes, 3).
    pub positions: Array2<f32>,
    /// (n_nodes, n_hit_features), the full raw feature rows.
    pub features: Array2<f32>,
    pub hit_type: Vec<i32>,
    /// Dense id after noise relabeling, 0 = noise.
    pub cluster_id: Vec<usize>,
    /// Raw truth link after noise relabeling, -1 = noise.
    pub particle_link: Vec<i64>,
    pub tau_link: Option<Vec<i64>>,
    pub overlay: Option<Vec<f32>>,
    pub inference: Option<InferenceColumns>,
    /// Retained particles, (n_particles, n_particle_features); row `k` belongs to cluster id `k + 1`.
    pub particles: Array2<f32>,
}

impl EventGraph {
    pub fn n_nodes(&self) -> usize {
        self.cluster_id.len()
    }

    pub fn n_particles(&self) -> usize {
        self.particles.nrows()
    }

    /// Particle row of every node, zeros for noise nodes.
    pub fn node_particle_features(&self) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.n_nodes(), self.particles.ncols()));
        for (mut row, &c) in out.rows_mut().into_iter().zip(&self.cluster_id) {
            if c > 0 {
                row.assign(&self.particles.row(c - 1));
            }
        }
        out
    }

    /// True particle energy of every node, 0 for noise nodes.
    pub fn node_true_energy(&self) -> Vec<f32> {
        self.cluster_id
            .iter()
            .map(|&c| if c > 0 { self.particles[(c - 1, PARTICLE_ENERGY_ROW)] } else { 0.0 })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyReason {
    NoHits,
    TooFewRawHits(usize),
    TooFewParticles(usize),
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoHits => write!(f, "no hits"),
            EmptyReason::TooFewRawHits(n) => write!(f, "{} raw hits (< {})", n, MIN_RAW_HITS),
            EmptyReason::TooFewParticles(n) => write!(f, "{} retained particles (< {})", n, MIN_PARTICLES),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BuiltGraph {
    Graph(EventGraph),
    Empty(EmptyReason),
}

impl BuiltGraph {
    pub fn is_empty(&self) -> bool {
        matches!(self, BuiltGraph::Empty(_))
    }

    pub fn into_graph(self) -> Option<EventGraph> {
        match self {
            BuiltGraph::Graph(g) => Some(g),
            BuiltGraph::Empty(_) => None,
        }
    }
}

/// Builds the node table of one event.
///
/// Hits of discarded particles stay in the graph as noise; only the particle
/// rows are dropped.
pub fn create_graph_tracking_cld(table: &EventTable, options: &GraphOptions) -> OcResult<BuiltGraph> {
    let inputs = create_inputs_from_table(table, options)?;
    let n_hits = inputs.n_hits();
    if n_hits == 0 {
        return Ok(BuiltGraph::Empty(EmptyReason::NoHits));
    }
    if n_hits < MIN_RAW_HITS {
        return Ok(BuiltGraph::Empty(EmptyReason::TooFewRawHits(n_hits)));
    }

    let label = create_noise_label(
        &inputs.hit_particle_link,
        inputs.particle_features.view(),
        &inputs.clusters.cluster_id,
        inputs.overlay_flag.as_deref(),
    )?;

    let particle_link: Vec<i64> = inputs
        .hit_particle_link
        .iter()
        .zip(&label.hit_noise)
        .map(|(&l, &noise)| if noise { -1 } else { l })
        .collect();

    let kept: Vec<usize> = (0..label.keep_particle.len())
        .filter(|&p| label.keep_particle[p])
        .collect();
    let particles = inputs.particle_features.select(Axis(0), &kept);

    let clusters = find_cluster_id(&particle_link);
    ensure_len("retained particles", particles.nrows(), clusters.n_particles())?;

    if particles.nrows() < MIN_PARTICLES {
        return Ok(BuiltGraph::Empty(EmptyReason::TooFewParticles(particles.nrows())));
    }

    let positions = inputs.hit_features.slice(s![.., POS_COLS]).to_owned();
    let inference = match (inputs.track_index, inputs.unique_id) {
        (Some(track_index), Some(unique_id)) => Some(InferenceColumns {
            track_index,
            unique_id,
            tau_momentum: inputs.tau_momentum,
        }),
        _ => None,
    };

    log::debug!(
        "graph: {} nodes, {} particles kept, {} dropped",
        n_hits,
        particles.nrows(),
        label.n_removed()
    );

    Ok(BuiltGraph::Graph(EventGraph {
        positions,
        features: inputs.hit_features,
        hit_type: inputs.hit_type,
        cluster_id: clusters.cluster_id,
        particle_link,
        tau_link: inputs.hit_particle_link_tau,
        overlay: inputs.overlay_flag,
        inference,
        particles,
    }))
}
