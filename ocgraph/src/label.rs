//! Dense particle ids and noise labels for one event.

use itertools::Itertools;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use occore::error::{ensure_len, OcError, OcResult};
use occore::index::scatter_count;

use crate::table::PARTICLE_ENERGY_ROW;

/// Particles leaving fewer hits are relabeled as noise.
pub const MIN_HITS_PER_PARTICLE: usize = 4;

/// Result of [`find_cluster_id`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdMap {
    /// Dense id per hit: 0 for noise, `1 + rank` of its particle otherwise.
    pub cluster_id: Vec<usize>,
    /// Sorted unique particle ids; `particles[k]` has dense id `k + 1`.
    pub particles: Vec<i64>,
    pub has_noise: bool,
}

impl ClusterIdMap {
    pub fn n_particles(&self) -> usize {
        self.particles.len()
    }
}

/// Maps raw truth links to dense ids. Any negative link is noise.
///
/// ```text
/// [5, 5, -1, 2, 5] -> [2, 2, 0, 1, 2], particles [2, 5]
/// ```
pub fn find_cluster_id(hit_particle_link: &[i64]) -> ClusterIdMap {
    let particles: Vec<i64> = hit_particle_link
        .iter()
        .copied()
        .filter(|&l| l >= 0)
        .sorted_unstable()
        .dedup()
        .collect();

    let mut has_noise = false;
    let cluster_id = hit_particle_link
        .iter()
        .map(|l| {
            if *l < 0 {
                has_noise = true;
                0
            } else {
                // present by construction
                particles.binary_search(l).map_or(0, |rank| rank + 1)
            }
        })
        .collect();

    ClusterIdMap {
        cluster_id,
        particles,
        has_noise,
    }
}

/// Hits per dense id `1..=n_particles` (noise not counted).
pub fn get_number_hits(cluster_id: &[usize], n_particles: usize) -> OcResult<Vec<usize>> {
    let counts = scatter_count(cluster_id, n_particles + 1)?;
    Ok(counts[1..].to_vec())
}

/// Which hits turn into noise and which particles survive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseLabel {
    /// Per hit: its particle is discarded.
    pub hit_noise: Vec<bool>,
    /// Per particle (sorted particle order): kept.
    pub keep_particle: Vec<bool>,
}

impl NoiseLabel {
    pub fn n_kept(&self) -> usize {
        self.keep_particle.iter().filter(|&&k| k).count()
    }

    pub fn n_removed(&self) -> usize {
        self.keep_particle.len() - self.n_kept()
    }
}

/// Labels hits of discarded particles as noise.
///
/// A particle is discarded if it left fewer than [`MIN_HITS_PER_PARTICLE`]
/// hits, if its energy `y[p, 4]` is negative, or, when overlay flags are
/// given, if every one of its hits is overlay background.
///
/// `y` is (n_particles, n_particle_features) in the order of
/// [`ClusterIdMap::particles`]; `cluster_id` are the dense ids of
/// `hit_particle_link`.
pub fn create_noise_label(
    hit_particle_link: &[i64],
    y: ArrayView2<f32>,
    cluster_id: &[usize],
    overlay_flag: Option<&[f32]>,
) -> OcResult<NoiseLabel> {
    ensure_len("cluster_id", hit_particle_link.len(), cluster_id.len())?;
    if let Some(flags) = overlay_flag {
        ensure_len("overlay_flag", hit_particle_link.len(), flags.len())?;
    }
    if y.ncols() <= PARTICLE_ENERGY_ROW {
        return Err(OcError::InvalidInput(format!(
            "particle features need an energy column {}, got {} columns",
            PARTICLE_ENERGY_ROW,
            y.ncols()
        )));
    }

    let n_particles = y.nrows();
    let n_linked = hit_particle_link
        .iter()
        .filter(|&&l| l >= 0)
        .sorted_unstable()
        .dedup()
        .count();
    ensure_len("particle rows", n_linked, n_particles)?;

    let n_hits = get_number_hits(cluster_id, n_particles)?;

    let mut n_overlay = vec![0usize; n_particles];
    if let Some(flags) = overlay_flag {
        for (&c, &f) in cluster_id.iter().zip(flags) {
            if c > 0 && f > 0.0 {
                n_overlay[c - 1] += 1;
            }
        }
    }

    let keep_particle: Vec<bool> = (0..n_particles)
        .map(|p| {
            let too_few = n_hits[p] < MIN_HITS_PER_PARTICLE;
            let invalid = y[(p, PARTICLE_ENERGY_ROW)] < 0.0;
            let all_overlay = overlay_flag.is_some() && n_overlay[p] == n_hits[p];
            !(too_few || invalid || all_overlay)
        })
        .collect();

    let hit_noise = cluster_id
        .iter()
        .map(|&c| c > 0 && !keep_particle[c - 1])
        .collect();

    let label = NoiseLabel {
        hit_noise,
        keep_particle,
    };
    log::debug!(
        "noise label: {} of {} particles discarded",
        label.n_removed(),
        n_particles
    );
    Ok(label)
}
