
use super::{IssueEmbeddingRecord, VectorHit};
use crate::RepolensError;
use arrow::array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const TABLE_NAME: &str = "issue_embeddings";

/// Vector database store using LanceDB for issue similarity search.
///
/// The table is deliberately unpartitioned: isolation between repositories
/// happens at query time, when hit ids are joined against the SQLite
/// `issues` table filtered to one repository.
pub struct VectorStore {
    connection: Connection,
    dimension: usize,
}

impl VectorStore {
    /// Open (or create) the vector store rooted at `path`.
    #[inline]
    pub async fn new<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self, RepolensError> {
        let db_path = path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RepolensError::Database(format!(
                    "Failed to create vector database directory: {e}"
                ))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        let store = Self {
            connection,
            dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<(), RepolensError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            debug!("Issue embeddings table already exists");
            return Ok(());
        }

        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to create table: {e}")))?;

        info!(
            "Issue embeddings table created with {} dimensions",
            self.dimension
        );
        Ok(())
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        reason = "dimension is validated to be well under i32::MAX"
    )]
    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("issue_id", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    /// Store a batch of issue embeddings. Existing records for the same
    /// issue ids are replaced, so re-indexing is idempotent.
    #[inline]
    pub async fn store_batch(
        &self,
        records: &[IssueEmbeddingRecord],
    ) -> Result<(), RepolensError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        for record in records {
            if record.vector.len() != self.dimension {
                return Err(RepolensError::Database(format!(
                    "Embedding for issue {} has dimension {}, expected {}",
                    record.issue_id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        debug!("Storing batch of {} embeddings", records.len());

        // Replace-then-insert keeps one vector per issue.
        let ids: Vec<i64> = records.iter().map(|r| r.issue_id).collect();
        self.delete_by_ids(&ids).await?;

        let record_batch = self.create_record_batch(records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to insert embeddings: {e}")))?;

        info!("Successfully stored {} embeddings", records.len());
        Ok(())
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        reason = "dimension is validated to be well under i32::MAX"
    )]
    fn create_record_batch(
        &self,
        records: &[IssueEmbeddingRecord],
    ) -> Result<RecordBatch, RepolensError> {
        let ids: Vec<i64> = records.iter().map(|r| r.issue_id).collect();

        let mut flat_values = Vec::with_capacity(records.len() * self.dimension);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RepolensError::Database(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![Arc::new(Int64Array::from(ids)), Arc::new(vector_array)];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| RepolensError::Database(format!("Failed to create record batch: {e}")))
    }

    /// Nearest-neighbor search over the whole table, ascending by distance.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, RepolensError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self.open_table().await?;

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| RepolensError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to read result stream: {e}")))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", hits.len());
        Ok(hits)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorHit>, RepolensError> {
        let issue_ids = batch
            .column_by_name("issue_id")
            .ok_or_else(|| RepolensError::Database("Missing issue_id column".to_string()))?
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| RepolensError::Database("Invalid issue_id column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            hits.push(VectorHit {
                issue_id: issue_ids.value(row),
                distance,
            });
        }

        Ok(hits)
    }

    /// Delete embeddings for the given issue ids.
    #[inline]
    pub async fn delete_by_ids(&self, issue_ids: &[i64]) -> Result<(), RepolensError> {
        if issue_ids.is_empty() {
            return Ok(());
        }

        debug!("Deleting embeddings for {} issues", issue_ids.len());

        let table = self.open_table().await?;
        let id_list = issue_ids.iter().join(", ");
        table
            .delete(&format!("issue_id IN ({id_list})"))
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to delete embeddings: {e}")))?;

        Ok(())
    }

    /// Get the total number of embeddings stored.
    #[inline]
    pub async fn count(&self) -> Result<u64, RepolensError> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to count rows: {e}")))?;

        Ok(count as u64)
    }

    async fn open_table(&self) -> Result<lancedb::Table, RepolensError> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RepolensError::Database(format!("Failed to open table: {e}")))
    }
}
