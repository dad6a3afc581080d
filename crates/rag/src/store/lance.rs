//! LanceDB-backed vector store. One table per collection.

use super::VectorStore;
use crate::types::{Chunk, EmbeddedChunk, SearchResult};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use notevault_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Embedded LanceDB database under the workspace state directory.
pub struct LanceDbStore {
    conn: Connection,
    embedding_dim: usize,
}

impl LanceDbStore {
    /// Connect to (or create) the database at `db_path`.
    pub async fn open(db_path: &Path, embedding_dim: usize) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::StoreUnreachable(format!(
                "Failed to create LanceDB directory {:?}: {}",
                db_path, e
            ))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri).execute().await.map_err(|e| {
            AppError::StoreUnreachable(format!("Failed to connect to LanceDB: {}", e))
        })?;

        tracing::debug!("Connected to LanceDB at {:?}", db_path);

        Ok(Self {
            conn,
            embedding_dim,
        })
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            // BTreeMap<String, String> as JSON
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    async fn table_names(&self) -> AppResult<Vec<String>> {
        self.conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::StoreUnreachable(format!("Failed to list tables: {}", e)))
    }

    /// Open a collection's table, or `None` if it was never created.
    async fn open_table(&self, collection: &str) -> AppResult<Option<Table>> {
        if !self.table_names().await?.iter().any(|n| n == collection) {
            return Ok(None);
        }

        let table = self
            .conn
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| AppError::StoreUnreachable(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    async fn open_or_create_table(&self, collection: &str) -> AppResult<Table> {
        if let Some(table) = self.open_table(collection).await? {
            return Ok(table);
        }

        let schema = self.schema();
        let empty_batch = RecordBatch::new_empty(schema.clone());

        let table = self
            .conn
            .create_table(
                collection,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema),
            )
            .execute()
            .await
            .map_err(|e| AppError::StoreUnreachable(format!("Failed to create table: {}", e)))?;

        tracing::info!("Created LanceDB table {}", collection);
        Ok(table)
    }

    fn chunks_to_batch(&self, chunks: &[EmbeddedChunk]) -> AppResult<RecordBatch> {
        let mut values = Vec::with_capacity(chunks.len() * self.embedding_dim);
        let mut metadata = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            if chunk.embedding.len() != self.embedding_dim {
                return Err(AppError::InvalidQuery(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.embedding_dim,
                    chunk.embedding.len()
                )));
            }
            values.extend_from_slice(&chunk.embedding);
            metadata.push(serde_json::to_string(&chunk.chunk.metadata)?);
        }

        let embedding_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.embedding_dim as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .map_err(|e| AppError::InvalidQuery(format!("Failed to build embedding array: {}", e)))?;

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.chunk.id.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.chunk.source_path.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    chunks.iter().map(|c| c.chunk.text.as_str()),
                )),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embedding_array),
            ],
        )
        .map_err(|e| AppError::InvalidQuery(format!("Failed to create RecordBatch: {}", e)))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::InvalidQuery(format!("Invalid {} column", name)))
}

/// Convert a result row back into a chunk and its cosine similarity.
fn row_to_result(batch: &RecordBatch, row: usize) -> AppResult<SearchResult> {
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(string_column(batch, "metadata")?.value(row))?;

    // Cosine distance is 1 - similarity
    let distance = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .map(|d| d.value(row))
        .unwrap_or(1.0);

    Ok(SearchResult {
        chunk: Chunk {
            id: string_column(batch, "id")?.value(row).to_string(),
            text: string_column(batch, "text")?.value(row).to_string(),
            source_path: string_column(batch, "source_path")?.value(row).to_string(),
            metadata,
        },
        score: 1.0 - distance,
    })
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait::async_trait]
impl VectorStore for LanceDbStore {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let batch = self.chunks_to_batch(chunks)?;
        let table = self.open_or_create_table(collection).await?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], self.schema());
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to upsert chunks: {}", e)))?;

        tracing::debug!("Upserted {} chunks into {}", chunks.len(), collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, chunk_ids: &[String]) -> AppResult<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let Some(table) = self.open_table(collection).await? else {
            return Ok(());
        };

        let ids = chunk_ids
            .iter()
            .map(|id| quote(id))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("id IN ({})", ids))
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to delete chunks: {}", e)))?;

        tracing::debug!("Deleted {} chunks from {}", chunk_ids.len(), collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        max_k: usize,
    ) -> AppResult<Vec<SearchResult>> {
        if query.len() != self.embedding_dim {
            return Err(AppError::InvalidQuery(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.embedding_dim,
                query.len()
            )));
        }
        if max_k == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.open_table(collection).await? else {
            return Ok(Vec::new());
        };

        let batches = table
            .vector_search(query.to_vec())
            .map_err(|e| AppError::InvalidQuery(format!("Failed to create query: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .limit(max_k)
            .execute()
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to execute search: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to collect results: {}", e)))?;

        let mut results = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                match row_to_result(&batch, row) {
                    Ok(result) => results.push(result),
                    Err(e) => tracing::warn!("Skipping unreadable row {}: {}", row, e),
                }
            }
        }

        Ok(super::rank(results, max_k))
    }

    async fn has_data(&self, collection: &str) -> AppResult<bool> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(false);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| AppError::StoreUnreachable(format!("Failed to count rows: {}", e)))?;
        Ok(count > 0)
    }

    async fn ping(&self) -> AppResult<()> {
        self.table_names().await.map(|_| ())
    }

    async fn chunk_ids_for_source(
        &self,
        collection: &str,
        source_path: &str,
    ) -> AppResult<Vec<String>> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(Vec::new());
        };

        let batches = table
            .query()
            .only_if(format!("source_path = {}", quote(source_path)))
            .select(Select::columns(&["id"]))
            .execute()
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to query chunk ids: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to collect chunk ids: {}", e)))?;

        let mut ids = Vec::new();
        for batch in batches {
            let column = string_column(&batch, "id")?;
            ids.extend((0..column.len()).map(|i| column.value(i).to_string()));
        }
        Ok(ids)
    }

    async fn drop_collection(&self, collection: &str) -> AppResult<()> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(());
        };

        table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| AppError::InvalidQuery(format!("Failed to clear table: {}", e)))?;

        tracing::info!("Cleared LanceDB table {}", collection);
        Ok(())
    }
}
