//! Parquet I/O for topology persistence
//!
//! Based on `DuckDB` (Raasveldt et al., SIGMOD 2019) columnar storage patterns.
//!
//! # Format
//!
//! A topology is stored as two Parquet files:
//! - `{path}_edges.parquet`: (source, target, distance, predecessor) for every
//!   finite off-diagonal pair
//! - `{path}_vertices.parquet`: (`vertex_id`), one row per vertex
//!
//! Pairs missing from the edge file are unreachable (`INF` / `NONE`).

use super::GraphTopology;
use anyhow::{bail, Context, Result};
use arrow::array::{Int32Array, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// One stored pair: (source, target, distance, predecessor)
type StoredPair = (u32, u32, i32, i32);

impl GraphTopology {
    /// Write topology to Parquet files
    ///
    /// Creates two files:
    /// - `{path}_edges.parquet`: reachable pairs (source, target, distance, predecessor)
    /// - `{path}_vertices.parquet`: vertex ids
    ///
    /// # Errors
    ///
    /// Returns error if file I/O fails or Arrow conversion fails
    #[allow(clippy::unused_async)] // Async API for future I/O operations
    pub async fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let base_path = path.as_ref();

        self.write_edges_parquet(base_path)?;
        self.write_vertices_parquet(base_path)?;

        Ok(())
    }

    /// Read topology from Parquet files
    ///
    /// # Errors
    ///
    /// Returns error if files don't exist, Arrow conversion fails or the stored
    /// pairs reference vertices outside the vertex file
    #[allow(clippy::unused_async)] // Async API for future I/O operations
    pub async fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref();

        let nvertex = Self::read_vertices_parquet(base_path)?;
        let pairs = Self::read_edges_parquet(base_path)?;

        let mut topology = Self::new(nvertex).context("Stored topology is invalid")?;
        let (distances, predecessors) = topology.matrices_mut();

        for (source, target, distance, predecessor) in pairs {
            let (src, dst) = (source as usize, target as usize);
            if src >= nvertex || dst >= nvertex {
                bail!("Stored pair {src} -> {dst} out of range for {nvertex} vertices");
            }
            distances[src * nvertex + dst] = distance;
            predecessors[src * nvertex + dst] = predecessor;
        }

        Ok(topology)
    }

    #[allow(clippy::cast_possible_truncation)] // nvertex fits i32 (checked at construction)
    fn write_edges_parquet(&self, base_path: &Path) -> Result<()> {
        let edges_path = format!("{}_edges.parquet", base_path.display());

        let mut sources = Vec::new();
        let mut targets = Vec::new();
        let mut distances = Vec::new();
        let mut predecessors = Vec::new();

        for (src, dst, distance, predecessor) in self.reachable_pairs() {
            sources.push(src as u32);
            targets.push(dst as u32);
            distances.push(distance);
            predecessors.push(predecessor);
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::UInt32, false),
            Field::new("target", DataType::UInt32, false),
            Field::new("distance", DataType::Int32, false),
            Field::new("predecessor", DataType::Int32, false),
        ]));

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(UInt32Array::from(sources)),
                Arc::new(UInt32Array::from(targets)),
                Arc::new(Int32Array::from(distances)),
                Arc::new(Int32Array::from(predecessors)),
            ],
        )
        .context("Failed to create edges RecordBatch")?;

        write_batch(&edges_path, schema, &batch)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_vertices_parquet(&self, base_path: &Path) -> Result<()> {
        let vertices_path = format!("{}_vertices.parquet", base_path.display());

        let vertex_ids: Vec<u32> = (0..self.nvertex()).map(|v| v as u32).collect();

        let schema = Arc::new(Schema::new(vec![Field::new(
            "vertex_id",
            DataType::UInt32,
            false,
        )]));

        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(UInt32Array::from(vertex_ids))])
            .context("Failed to create vertices RecordBatch")?;

        write_batch(&vertices_path, schema, &batch)
    }

    fn read_edges_parquet(base_path: &Path) -> Result<Vec<StoredPair>> {
        let edges_path = format!("{}_edges.parquet", base_path.display());

        let file =
            File::open(&edges_path).with_context(|| format!("Failed to open {edges_path}"))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut pairs = Vec::new();

        for batch_result in reader {
            let batch: RecordBatch = batch_result?;

            let sources = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid source column type")?;

            let targets = batch
                .column(1)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid target column type")?;

            let distances = batch
                .column(2)
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("Invalid distance column type")?;

            let predecessors = batch
                .column(3)
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("Invalid predecessor column type")?;

            for i in 0..batch.num_rows() {
                pairs.push((
                    sources.value(i),
                    targets.value(i),
                    distances.value(i),
                    predecessors.value(i),
                ));
            }
        }

        Ok(pairs)
    }

    fn read_vertices_parquet(base_path: &Path) -> Result<usize> {
        let vertices_path = format!("{}_vertices.parquet", base_path.display());

        let file = File::open(&vertices_path)
            .with_context(|| format!("Failed to open {vertices_path}"))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut nvertex = 0_usize;
        for batch_result in reader {
            let batch: RecordBatch = batch_result?;

            let vertex_ids = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("Invalid vertex_id column type")?;

            for i in 0..batch.num_rows() {
                if vertex_ids.value(i) as usize != nvertex {
                    bail!(
                        "Vertex ids must be dense: expected {nvertex}, found {}",
                        vertex_ids.value(i)
                    );
                }
                nvertex += 1;
            }
        }

        Ok(nvertex)
    }
}

fn write_batch(path: &str, schema: Arc<Schema>, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {path}"))?;

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::ZSTD(
            parquet::basic::ZstdLevel::try_new(3)?,
        ))
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::floyd_warshall;
    use crate::storage::NONE;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_parquet_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_topology");

        let edges = [(0, 1, 3), (1, 2, 1), (2, 3, 2), (0, 3, 100)];
        let mut topology = GraphTopology::from_edge_list(4, &edges).unwrap();
        floyd_warshall(&mut topology);

        topology.write_parquet(&path).await.unwrap();
        let loaded = GraphTopology::read_parquet(&path).await.unwrap();

        assert_eq!(loaded, topology);
        assert_eq!(loaded.path(0, 3), Some(vec![0, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_single_vertex_parquet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single");

        let topology = GraphTopology::new(1).unwrap();
        topology.write_parquet(&path).await.unwrap();

        let loaded = GraphTopology::read_parquet(&path).await.unwrap();
        assert_eq!(loaded.nvertex(), 1);
        assert_eq!(loaded.distances(), &[0]);
        assert_eq!(loaded.predecessors(), &[NONE]);
    }

    #[tokio::test]
    async fn test_empty_vertex_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");

        let schema = Arc::new(Schema::new(vec![Field::new(
            "vertex_id",
            DataType::UInt32,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(UInt32Array::from(Vec::<u32>::new()))])
                .unwrap();
        let vertices_path = format!("{}_vertices.parquet", path.display());
        write_batch(&vertices_path, schema, &batch).unwrap();
        GraphTopology::new(2).unwrap().write_edges_parquet(&path).unwrap();

        let err = GraphTopology::read_parquet(&path).await.unwrap_err();
        assert!(err.to_string().contains("Stored topology is invalid"));
    }

    #[tokio::test]
    async fn test_pair_outside_vertex_file_rejected() {
        let dir = tempdir().unwrap();
        let wide = dir.path().join("wide");
        let narrow = dir.path().join("narrow");

        let topology = GraphTopology::from_edge_list(3, &[(0, 2, 4)]).unwrap();
        topology.write_parquet(&wide).await.unwrap();
        GraphTopology::new(2).unwrap().write_parquet(&narrow).await.unwrap();
        std::fs::copy(
            format!("{}_edges.parquet", wide.display()),
            format!("{}_edges.parquet", narrow.display()),
        )
        .unwrap();

        let err = GraphTopology::read_parquet(&narrow).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_missing_files() {
        let dir = tempdir().unwrap();
        let result = GraphTopology::read_parquet(dir.path().join("absent")).await;
        assert!(result.is_err());
    }
}
