//! Flat, padded per-event tables as written by the ingestion step.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use occore::error::{OcError, OcResult};

/// Columns of `pf_features` holding the hit position.
pub const POS_COLS: std::ops::Range<usize> = 0..3;
pub const HIT_TYPE_COL: usize = 3;

/// Rows of `pf_vectoronly`.
pub const ROW_LINK: usize = 0;
pub const ROW_TAU_LINK: usize = 1;
pub const ROW_TRACK_INDEX: usize = 2;
pub const ROW_UNIQUE_ID: usize = 3;
pub const N_VECTORONLY_ROWS: usize = 4;

/// Rows of `pf_vectors` (particle features).
pub const PARTICLE_ENERGY_ROW: usize = 4;
pub const PARTICLE_MOMENTUM_ROW: usize = 6;

/// One event, stored column-major like the numpy arrays it comes from:
/// every hit and every particle is a column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    /// (n_hit_features, max_hits): position, hit type, raw features, overlay flag last.
    pub pf_features: Array2<f32>,
    /// (4, max_hits): truth link, tau link, track index, unique id.
    pub pf_vectoronly: Array2<i64>,
    /// (n_particle_features, max_particles), indexed by particle id.
    pub pf_vectors: Array2<f32>,
    /// (2, width): row 0 marks real hits, row 1 real particles.
    pub pf_mask: Array2<u8>,
}

impl EventTable {
    pub fn new(
        pf_features: Array2<f32>,
        pf_vectoronly: Array2<i64>,
        pf_vectors: Array2<f32>,
        pf_mask: Array2<u8>,
    ) -> OcResult<Self> {
        let table = Self {
            pf_features,
            pf_vectoronly,
            pf_vectors,
            pf_mask,
        };
        table.validate()?;
        Ok(table)
    }

    /// Unpadded table from hit columns and particle columns.
    ///
    /// `hit_features` is (n_hit_features, n_hits), `hit_links` is
    /// (4, n_hits) and `particles` (n_particle_features, n_particles).
    pub fn from_columns(
        hit_features: ArrayView2<f32>,
        hit_links: ArrayView2<i64>,
        particles: ArrayView2<f32>,
    ) -> OcResult<Self> {
        let n_hits = hit_features.ncols();
        let n_particles = particles.ncols();
        let width = n_hits.max(n_particles);
        let mut pf_mask = Array2::<u8>::zeros((2, width));
        pf_mask.row_mut(0).iter_mut().take(n_hits).for_each(|m| *m = 1);
        pf_mask.row_mut(1).iter_mut().take(n_particles).for_each(|m| *m = 1);
        Self::new(
            hit_features.to_owned(),
            hit_links.to_owned(),
            particles.to_owned(),
            pf_mask,
        )
    }

    pub fn n_hits(&self) -> usize {
        self.pf_mask.row(0).iter().filter(|&&m| m != 0).count()
    }

    pub fn n_particles(&self) -> usize {
        self.pf_mask.row(1).iter().filter(|&&m| m != 0).count()
    }

    pub fn n_hit_features(&self) -> usize {
        self.pf_features.nrows()
    }

    /// Checks the layout; real hits must fit into the padded columns.
    pub fn validate(&self) -> OcResult<()> {
        if self.pf_mask.nrows() != 2 {
            return Err(OcError::ShapeMismatch {
                what: "pf_mask rows",
                expected: 2,
                got: self.pf_mask.nrows(),
            });
        }
        if self.pf_features.nrows() <= HIT_TYPE_COL {
            return Err(OcError::InvalidInput(format!(
                "pf_features needs at least {} rows (position and hit type), got {}",
                HIT_TYPE_COL + 1,
                self.pf_features.nrows()
            )));
        }
        if self.pf_vectoronly.nrows() != N_VECTORONLY_ROWS {
            return Err(OcError::ShapeMismatch {
                what: "pf_vectoronly rows",
                expected: N_VECTORONLY_ROWS,
                got: self.pf_vectoronly.nrows(),
            });
        }
        let n_hits = self.n_hits();
        if n_hits > self.pf_features.ncols() || n_hits > self.pf_vectoronly.ncols() {
            return Err(OcError::InvalidInput(format!(
                "{} hits marked but only {} feature columns and {} link columns",
                n_hits,
                self.pf_features.ncols(),
                self.pf_vectoronly.ncols()
            )));
        }
        if self.n_particles() > self.pf_vectors.ncols() {
            return Err(OcError::InvalidInput(format!(
                "{} particles marked but only {} particle columns",
                self.n_particles(),
                self.pf_vectors.ncols()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_columns_sets_masks() {
        let hits = array![[0.0f32, 1.0, 2.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0, 2.0]];
        let links = array![[0i64, 0, -1], [-1, -1, -1], [0, 0, 0], [10, 11, 12]];
        let particles = Array2::<f32>::zeros((7, 1));
        let table = EventTable::from_columns(hits.view(), links.view(), particles.view()).unwrap();
        assert_eq!(table.n_hits(), 3);
        assert_eq!(table.n_particles(), 1);
        assert_eq!(table.pf_mask.ncols(), 3);
        assert_eq!(table.n_hit_features(), 4);
    }

    #[test]
    fn test_particle_mask_wider_than_table_is_rejected() {
        let hits = Array2::<f32>::zeros((4, 3));
        let links = Array2::<i64>::zeros((4, 3));
        let particles = Array2::<f32>::zeros((7, 1));
        let mut table = EventTable::from_columns(hits.view(), links.view(), particles.view()).unwrap();
        table.pf_mask[(1, 2)] = 1;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_layout() {
        let hits = Array2::<f32>::zeros((3, 2));
        let links = Array2::<i64>::zeros((4, 2));
        let particles = Array2::<f32>::zeros((7, 1));
        assert!(EventTable::from_columns(hits.view(), links.view(), particles.view()).is_err());

        let hits = Array2::<f32>::zeros((4, 2));
        let links = Array2::<i64>::zeros((2, 2));
        let err = EventTable::from_columns(hits.view(), links.view(), particles.view()).unwrap_err();
        assert!(matches!(err, OcError::ShapeMismatch { what: "pf_vectoronly rows", .. }));
    }

    #[test]
    fn test_padding_is_ignored() {
        let mut table = EventTable::from_columns(
            Array2::<f32>::zeros((5, 4)).view(),
            Array2::<i64>::zeros((4, 4)).view(),
            Array2::<f32>::zeros((7, 2)).view(),
        )
        .unwrap();
        table.pf_mask[(0, 3)] = 0;
        assert_eq!(table.n_hits(), 3);
        assert!(table.validate().is_ok());
    }
}
