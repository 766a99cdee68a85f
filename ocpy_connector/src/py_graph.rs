use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use ocgraph::{BuiltGraph, EventTable, GraphOptions};

use crate::to_py_err;

/// Builds the graph of one JSON-encoded event table.
///
/// Returns the graph as JSON, or `None` when the event yields no graph.
#[pyfunction]
#[pyo3(signature = (table_json, predict=false, tau=false, overlay=false))]
pub fn create_graph_tracking_cld(table_json: &str, predict: bool, tau: bool, overlay: bool) -> PyResult<Option<String>> {
    let table: EventTable = serde_json::from_str(table_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let options = GraphOptions { predict, tau, overlay };
    match ocgraph::create_graph_tracking_cld(&table, &options).map_err(to_py_err)? {
        BuiltGraph::Graph(g) => serde_json::to_string(&g)
            .map(Some)
            .map_err(|e| PyValueError::new_err(e.to_string())),
        BuiltGraph::Empty(_) => Ok(None),
    }
}
