pub mod table;
pub mod label;
pub mod graph;
pub mod batch;
pub mod io;

pub use batch::GraphBatch;
pub use graph::{create_graph_tracking_cld, BuiltGraph, EmptyReason, EventGraph, GraphOptions};
pub use table::EventTable;
