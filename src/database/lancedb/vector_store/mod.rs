#[cfg(test)]
mod tests;

use super::{EmailChunkMetadata, EmbeddingRecord};
use crate::{MailError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: EmailChunkMetadata,
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, MailError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        // Ensure the directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MailError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                // Check if this looks like a corruption error
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    // Retry connection after recovery
                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        MailError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(MailError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        let default_dimension = config.gemini.embedding_dimension as usize;

        let mut store = Self {
            connection,
            table_name: "embeddings".to_string(),
            vector_dimension: None,
        };

        store
            .initialize_table_with_recovery(default_dimension)
            .await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    /// Initialize the embeddings table with the correct schema
    async fn initialize_table(&mut self, default_dimension: usize) -> Result<(), MailError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            debug!("Embeddings table already exists, detecting vector dimension");
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    self.vector_dimension = Some(dim);
                    info!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => {
                    warn!(
                        "Could not detect vector dimension from existing table: {}",
                        e
                    );
                    self.vector_dimension = Some(default_dimension);
                }
            }
            return Ok(());
        }

        info!(
            "Creating embeddings table with {} dimensions",
            default_dimension
        );

        let schema = create_schema(default_dimension);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to create table: {}", e)))?;

        self.vector_dimension = Some(default_dimension);
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, MailError> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| MailError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(MailError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Store a single embedding with its metadata
    #[inline]
    pub async fn store_embedding(&mut self, record: EmbeddingRecord) -> Result<(), MailError> {
        self.store_embeddings_batch(vec![record]).await
    }

    /// Store multiple embeddings in a batch
    #[inline]
    pub async fn store_embeddings_batch(
        &mut self,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), MailError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        debug!("Storing batch of {} embeddings", records.len());

        // The embedding model dictates the dimension; recreate the table if it
        // does not match what is on disk
        let vector_dim = records[0].vector.len();
        if self.vector_dimension != Some(vector_dim) {
            info!(
                "Vector dimension changed from {:?} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        let record_batch = self.create_record_batch(&records)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to insert embeddings: {}", e)))?;

        info!("Successfully stored {} embeddings", records.len());
        Ok(())
    }

    /// Recreate table with new vector dimension
    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<(), MailError> {
        info!("Recreating table with vector dimension: {}", vector_dim);

        self.drop_table_if_exists().await?;

        let schema = create_schema(vector_dim);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| {
                MailError::Database(format!("Failed to create table with new dimensions: {}", e))
            })?;

        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, MailError> {
        let len = records.len();
        let vector_dim = self
            .vector_dimension
            .ok_or_else(|| MailError::Database("Vector dimension not set".to_string()))?;

        let mut ids = Vec::with_capacity(len);
        let mut vectors = Vec::with_capacity(len);
        let mut email_ids = Vec::with_capacity(len);
        let mut senders = Vec::with_capacity(len);
        let mut subjects = Vec::with_capacity(len);
        let mut received_dates = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            vectors.push(record.vector.clone());
            email_ids.push(record.metadata.email_id.as_str());
            senders.push(record.metadata.sender.as_str());
            subjects.push(record.metadata.subject.as_str());
            received_dates.push(record.metadata.received_date.as_str());
            contents.push(record.metadata.content.as_str());
            token_counts.push(record.metadata.token_count);
            chunk_indices.push(record.metadata.chunk_index);
            created_ats.push(record.metadata.created_at.as_str());
        }

        let schema = create_schema(vector_dim);

        // Create vector array using FixedSizeListArray
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for vector in &vectors {
            flat_values.extend_from_slice(vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    MailError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(email_ids)),
            Arc::new(StringArray::from(senders)),
            Arc::new(StringArray::from(subjects)),
            Arc::new(StringArray::from(received_dates)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(token_counts)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| MailError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Search for chunks similar to the query vector. When `received_after`
    /// is given (RFC 3339), only chunks from emails received at or after that
    /// instant are considered.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        received_after: Option<&str>,
    ) -> Result<Vec<SearchResult>, MailError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| MailError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit);

        if let Some(cutoff) = received_after {
            query = query.only_if(format!("received_date >= '{}'", cutoff));
        }

        let results = query
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results_stream(results).await
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, MailError> {
        let mut search_results = Vec::new();

        while let Some(batch_result) = results
            .try_next()
            .await
            .map_err(|e| MailError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let parsed_batch = parse_search_batch(&batch_result)?;
            search_results.extend(parsed_batch);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Delete all embeddings for a specific email
    #[inline]
    pub async fn delete_email_embeddings(&mut self, email_id: &str) -> Result<(), MailError> {
        debug!("Deleting embeddings for email: {}", email_id);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let predicate = format!("email_id = '{}'", email_id);
        table.delete(&predicate).await.map_err(|e| {
            MailError::Database(format!("Failed to delete email embeddings: {}", e))
        })?;

        info!("Deleted embeddings for email: {}", email_id);
        Ok(())
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64, MailError> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| MailError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Optimize the vector database by compacting and reorganizing data
    #[inline]
    pub async fn optimize(&mut self) -> Result<(), MailError> {
        debug!("Optimizing vector database");

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MailError::Database(format!("Failed to open table: {}", e)))?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| MailError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Attempt to recover from database corruption
    fn attempt_corruption_recovery(db_path: &PathBuf) -> Result<(), MailError> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        // Keep the corrupted data around rather than destroying evidence
        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                MailError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }

    /// Initialize table with corruption recovery support
    async fn initialize_table_with_recovery(
        &mut self,
        default_dimension: usize,
    ) -> Result<(), MailError> {
        match self.initialize_table(default_dimension).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("schema")
                {
                    warn!("Table corruption detected during initialization: {}", e);

                    if let Err(drop_err) = self.drop_table_if_exists().await {
                        warn!("Failed to drop corrupted table: {}", drop_err);
                    }

                    self.initialize_table(default_dimension).await.map_err(|e| {
                        MailError::Database(format!(
                            "Failed to recreate table after corruption: {}",
                            e
                        ))
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Drop the embeddings table if it exists
    async fn drop_table_if_exists(&self) -> Result<(), MailError> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                MailError::Database(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing embeddings table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| MailError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Validate database integrity
    ///
    /// # Returns
    /// * `Result<bool, MailError>` - True if database is healthy, false if corrupted
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool, MailError> {
        debug!("Validating database integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("Embeddings table missing during integrity check");
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Database integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("email_id", DataType::Utf8, false),
        Field::new("sender", DataType::Utf8, false),
        Field::new("subject", DataType::Utf8, false),
        Field::new("received_date", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("token_count", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, MailError> {
    let mut search_results = Vec::new();
    let num_rows = batch.num_rows();

    let string_column = |name: &str| -> Result<&StringArray, MailError> {
        batch
            .column_by_name(name)
            .ok_or_else(|| MailError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MailError::Database(format!("Invalid {} column type", name)))
    };

    let uint_column = |name: &str| -> Result<&UInt32Array, MailError> {
        batch
            .column_by_name(name)
            .ok_or_else(|| MailError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| MailError::Database(format!("Invalid {} column type", name)))
    };

    let email_ids = string_column("email_id")?;
    let senders = string_column("sender")?;
    let subjects = string_column("subject")?;
    let received_dates = string_column("received_date")?;
    let contents = string_column("content")?;
    let token_counts = uint_column("token_count")?;
    let chunk_indices = uint_column("chunk_index")?;
    let created_ats = string_column("created_at")?;

    // Extract distance scores if available
    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    for row in 0..num_rows {
        let chunk_metadata = EmailChunkMetadata {
            email_id: email_ids.value(row).to_string(),
            sender: senders.value(row).to_string(),
            subject: subjects.value(row).to_string(),
            received_date: received_dates.value(row).to_string(),
            content: contents.value(row).to_string(),
            token_count: token_counts.value(row),
            chunk_index: chunk_indices.value(row),
            created_at: created_ats.value(row).to_string(),
        };

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        // Convert distance to similarity score (higher is better)
        let similarity_score = 1.0 - distance;

        search_results.push(SearchResult {
            chunk_metadata,
            similarity_score,
            distance,
        });
    }

    debug!("Parsed {} search results", search_results.len());
    Ok(search_results)
}
