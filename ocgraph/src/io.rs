use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::Path;

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use occore::error::{ensure_len, OcError, OcResult};

use crate::graph::EventGraph;
use crate::table::EventTable;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Serialize, Deserialize)]
pub struct TableFile {
    pub version: u32,
    pub tables: Vec<EventTable>,
}

impl TableFile {
    pub fn new(tables: Vec<EventTable>) -> Self {
        Self { version: 1, tables }
    }
}

#[derive(Serialize, Deserialize)]
pub struct GraphFile {
    pub version: u32,
    pub graphs: Vec<EventGraph>,
}

impl GraphFile {
    pub fn new(graphs: Vec<EventGraph>) -> Self {
        Self { version: 1, graphs }
    }
}

/// Model output for a batch of hits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionFile {
    pub betas: Vec<f32>,
    /// One clustering-space row per hit.
    pub coords: Vec<Vec<f32>>,
    #[serde(default)]
    pub hit_energy: Option<Vec<f32>>,
}

impl PredictionFile {
    pub fn coords_array(&self) -> OcResult<Array2<f32>> {
        ensure_len("prediction coords", self.betas.len(), self.coords.len())?;
        let dim = self.coords.first().map_or(0, |r| r.len());
        let mut flat = Vec::with_capacity(self.coords.len() * dim);
        for row in &self.coords {
            ensure_len("prediction coords dim", dim, row.len())?;
            flat.extend_from_slice(row);
        }
        Array2::from_shape_vec((self.coords.len(), dim), flat).map_err(|e| OcError::InvalidInput(e.to_string()))
    }
}

fn ser_err<E: std::fmt::Display>(e: E) -> OcError {
    OcError::Serialization(e.to_string())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

// --- JSON (human-readable) ---
fn write_json<T: Serialize>(path: &Path, value: &T) -> OcResult<()> {
    let f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(f, value).map_err(ser_err)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> OcResult<T> {
    let f = BufReader::new(File::open(path)?);
    serde_json::from_reader(f).map_err(ser_err)
}

// --- Bincode + optional zstd compression ---
fn write_bincode<T: Serialize>(path: &Path, value: &T, compress: bool) -> OcResult<()> {
    let f = File::create(path)?;
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::serialize_into(&mut zw, value).map_err(ser_err)?;
        zw.finish()?;
        Ok(())
    } else {
        let mut bw = BufWriter::new(f);
        bincode::serialize_into(&mut bw, value).map_err(ser_err)
    }
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> OcResult<T> {
    let mut f = File::open(path)?;
    let mut magic = [0u8; 4];
    let compressed = match f.read_exact(&mut magic) {
        Ok(()) => magic == ZSTD_MAGIC,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    f.seek(SeekFrom::Start(0))?;

    if compressed {
        let mut zr = zstd::Decoder::new(f)?;
        bincode::deserialize_from(&mut zr).map_err(ser_err)
    } else {
        bincode::deserialize_from(BufReader::new(f)).map_err(ser_err)
    }
}

pub fn save_tables<P: AsRef<Path>>(path: P, tables: &[EventTable], compress: bool) -> OcResult<()> {
    let path = path.as_ref();
    let file = TableFile::new(tables.to_vec());
    if has_extension(path, "json") {
        write_json(path, &file)
    } else {
        write_bincode(path, &file, compress)
    }
}

/// Loads event tables: `.json` holds a [`TableFile`], `.jsonl` one table per
/// line, anything else bincode (zstd-compressed or plain).
pub fn load_tables<P: AsRef<Path>>(path: P) -> OcResult<Vec<EventTable>> {
    let path = path.as_ref();
    let tables = if has_extension(path, "jsonl") {
        let reader = BufReader::new(File::open(path)?);
        let mut tables = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let table: EventTable = serde_json::from_str(&line)
                .map_err(|e| OcError::Serialization(format!("line {}: {}", n + 1, e)))?;
            tables.push(table);
        }
        tables
    } else if has_extension(path, "json") {
        read_json::<TableFile>(path)?.tables
    } else {
        read_bincode::<TableFile>(path)?.tables
    };

    for table in &tables {
        table.validate()?;
    }
    log::info!("loaded {} event tables from {}", tables.len(), path.display());
    Ok(tables)
}

pub fn save_graphs<P: AsRef<Path>>(path: P, graphs: &[EventGraph], compress: bool) -> OcResult<()> {
    let path = path.as_ref();
    let file = GraphFile::new(graphs.to_vec());
    if has_extension(path, "json") {
        write_json(path, &file)
    } else {
        write_bincode(path, &file, compress)
    }
}

pub fn load_graphs<P: AsRef<Path>>(path: P) -> OcResult<Vec<EventGraph>> {
    let path = path.as_ref();
    let file: GraphFile = if has_extension(path, "json") {
        read_json(path)?
    } else {
        read_bincode(path)?
    };
    Ok(file.graphs)
}

pub fn load_predictions<P: AsRef<Path>>(path: P) -> OcResult<PredictionFile> {
    read_json(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::table_with;
    use crate::graph::{create_graph_tracking_cld, GraphOptions};
    use std::io::Write;

    fn graphs() -> Vec<EventGraph> {
        vec![create_graph_tracking_cld(&table_with(&[4, 4, 5, 4], 2, false), &GraphOptions::default())
            .unwrap()
            .into_graph()
            .unwrap()]
    }

    #[test]
    fn test_graphs_bincode_compressed_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        let graphs = graphs();
        for compress in [true, false] {
            let path = dir.path().join(format!("graphs_{}.bin", compress));
            save_graphs(&path, &graphs, compress).unwrap();
            let loaded = load_graphs(&path).unwrap();
            assert_eq!(loaded, graphs);
        }
    }

    #[test]
    fn test_compressed_file_starts_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphs.bin.zst");
        save_graphs(&path, &graphs(), true).unwrap();
        let mut magic = [0u8; 4];
        File::open(&path).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(magic, ZSTD_MAGIC);
    }

    #[test]
    fn test_tables_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.jsonl");
        let a = table_with(&[4, 4], 0, false);
        let b = table_with(&[5, 4, 4, 4], 1, true);
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "{}", serde_json::to_string(&a).unwrap()).unwrap();
            writeln!(f).unwrap();
            writeln!(f, "{}", serde_json::to_string(&b).unwrap()).unwrap();
        }
        let tables = load_tables(&path).unwrap();
        assert_eq!(tables, vec![a, b]);
    }

    #[test]
    fn test_tables_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.json");
        let tables = vec![table_with(&[4, 4, 4, 4], 3, false)];
        save_tables(&path, &tables, false).unwrap();
        assert_eq!(load_tables(&path).unwrap(), tables);
    }

    #[test]
    fn test_prediction_coords() {
        let p: PredictionFile = serde_json::from_str(r#"{"betas": [0.9, 0.1], "coords": [[0.0, 1.0], [2.0, 3.0]]}"#).unwrap();
        assert!(p.hit_energy.is_none());
        assert_eq!(p.coords_array().unwrap()[(1, 0)], 2.0);

        let ragged = PredictionFile {
            betas: vec![0.5, 0.5],
            coords: vec![vec![0.0, 1.0], vec![2.0]],
            hit_energy: None,
        };
        assert!(ragged.coords_array().is_err());
    }
}
