//! Concatenation of event graphs into one struct-of-arrays batch.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use occore::error::{ensure_len, OcError, OcResult};
use occore::loss::{CondensationInput, EnergyInput};

use crate::graph::EventGraph;

const POS_DIM: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphBatch {
    /// Row-major (n_hits, 3).
    positions: Vec<f32>,
    /// Row-major (n_hits, n_features).
    features: Vec<f32>,
    n_features: Option<usize>,
    hit_type: Vec<i32>,
    cluster_ids: Vec<usize>,
    particle_link: Vec<i64>,
    batch: Vec<usize>,
    true_energy: Vec<f32>,
    n_graphs: usize,
}

impl GraphBatch {
    pub fn with_capacity(n_hits: usize, n_features: usize) -> Self {
        Self {
            positions: Vec::with_capacity(n_hits * POS_DIM),
            features: Vec::with_capacity(n_hits * n_features),
            n_features: None,
            hit_type: Vec::with_capacity(n_hits),
            cluster_ids: Vec::with_capacity(n_hits),
            particle_link: Vec::with_capacity(n_hits),
            batch: Vec::with_capacity(n_hits),
            true_energy: Vec::with_capacity(n_hits),
            n_graphs: 0,
        }
    }

    pub fn from_graphs(graphs: &[EventGraph]) -> OcResult<Self> {
        let n_hits = graphs.iter().map(|g| g.n_nodes()).sum();
        let n_features = graphs.first().map_or(0, |g| g.features.ncols());
        let mut batch = Self::with_capacity(n_hits, n_features);
        for g in graphs {
            batch.push_graph(g)?;
        }
        Ok(batch)
    }

    /// Appends all nodes of `graph` as the next event.
    pub fn push_graph(&mut self, graph: &EventGraph) -> OcResult<()> {
        let n = graph.n_nodes();
        ensure_len("graph positions", n, graph.positions.nrows())?;
        ensure_len("graph position dim", POS_DIM, graph.positions.ncols())?;
        ensure_len("graph features", n, graph.features.nrows())?;
        match self.n_features {
            Some(f) => ensure_len("batch features", f, graph.features.ncols())?,
            None => self.n_features = Some(graph.features.ncols()),
        }

        let event = self.n_graphs;
        self.positions.extend(graph.positions.iter());
        self.features.extend(graph.features.iter());
        self.hit_type.extend_from_slice(&graph.hit_type);
        self.cluster_ids.extend_from_slice(&graph.cluster_id);
        self.particle_link.extend_from_slice(&graph.particle_link);
        self.batch.extend(std::iter::repeat(event).take(n));
        self.true_energy.extend(graph.node_true_energy());
        self.n_graphs += 1;
        Ok(())
    }

    pub fn n_hits(&self) -> usize {
        self.batch.len()
    }

    pub fn n_events(&self) -> usize {
        self.n_graphs
    }

    pub fn coords(&self) -> OcResult<ArrayView2<'_, f32>> {
        ArrayView2::from_shape((self.n_hits(), POS_DIM), self.positions.as_slice())
            .map_err(|e| OcError::Invariant(e.to_string()))
    }

    pub fn features(&self) -> OcResult<ArrayView2<'_, f32>> {
        ArrayView2::from_shape((self.n_hits(), self.n_features.unwrap_or(0)), self.features.as_slice())
            .map_err(|e| OcError::Invariant(e.to_string()))
    }

    pub fn hit_type(&self) -> &[i32] {
        &self.hit_type
    }

    pub fn cluster_ids(&self) -> &[usize] {
        &self.cluster_ids
    }

    pub fn particle_link(&self) -> &[i64] {
        &self.particle_link
    }

    pub fn batch(&self) -> &[usize] {
        &self.batch
    }

    pub fn true_energy(&self) -> &[f32] {
        &self.true_energy
    }

    /// Loss input for model output on this batch.
    pub fn condensation_input<'a>(
        &'a self,
        beta: &'a [f32],
        coords: ArrayView2<'a, f32>,
        hit_energy_pred: Option<&'a [f32]>,
    ) -> CondensationInput<'a> {
        CondensationInput {
            beta,
            coords,
            cluster_index_per_event: &self.cluster_ids,
            batch: &self.batch,
            energy: hit_energy_pred.map(|pred| EnergyInput {
                hit_energy_pred: pred,
                energy_correction: None,
                hit_energy_true: &self.true_energy,
            }),
        }
    }
}
