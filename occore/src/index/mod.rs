pub mod remap;
pub mod scatter;

pub use remap::{batch_cluster_indices, batch_cluster_indices_sized, n_events, reincrementalize};
pub use scatter::{scatter_count, scatter_counts_to_indices, segment_offsets};
