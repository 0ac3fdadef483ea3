//! Embeddings corpus file: building it from chunks and reading it back for upload.
//!
//! The corpus is a CSV file with the header `token,embedding,sourceDocument`. The embedding
//! column holds a JSON float array.

use std::path::Path;

use crate::embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingRequest};

use super::types::{Chunk, CorpusError, CorpusRow, EmbeddingRecord};

/// Chunks sent to the embedding provider per request.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Embed `chunks` in batches and write one corpus row per chunk to `output`.
///
/// Every vector must have `dimensions` entries when set, otherwise the length of the first
/// vector. Returns the number of rows written.
pub async fn build_corpus_file(
    chunks: &[Chunk],
    client: &dyn EmbeddingClient,
    model: &str,
    dimensions: Option<usize>,
    batch_size: usize,
    output: &Path,
) -> Result<usize, CorpusError> {
    if batch_size == 0 {
        return Err(CorpusError::InvalidBatchSize);
    }

    let mut writer = csv::Writer::from_path(output)?;
    let mut expected = dimensions;
    let mut written = 0usize;

    for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
        let input: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        tracing::debug!(
            batch = batch_index,
            size = input.len(),
            model,
            "Embedding corpus batch"
        );
        let vectors = client
            .embed(EmbeddingRequest {
                input,
                dimensions,
                model: model.to_string(),
            })
            .await?;
        if vectors.len() != batch.len() {
            return Err(CorpusError::Embedding(EmbeddingClientError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            }));
        }

        for (chunk, vector) in batch.iter().zip(vectors) {
            let width = *expected.get_or_insert(vector.len());
            if vector.len() != width {
                return Err(CorpusError::DimensionMismatch {
                    row: written,
                    expected: width,
                    actual: vector.len(),
                });
            }
            let embedding = serde_json::to_string(&vector).map_err(|source| CorpusError::Json {
                row: written,
                source,
            })?;
            writer.serialize(CorpusRow {
                token: chunk.text.clone(),
                embedding,
                source_document: Some(chunk.source_document.clone()),
            })?;
            written += 1;
        }
    }

    writer.flush().map_err(|source| CorpusError::Io {
        path: output.display().to_string(),
        source,
    })?;
    tracing::info!(
        output = %output.display(),
        rows = written,
        dimensions = ?expected,
        "Embeddings corpus written"
    );
    Ok(written)
}

/// Read a corpus file, assigning ids `"0"`, `"1"`, ... in row order.
pub fn read_corpus_file(path: &Path) -> Result<Vec<EmbeddingRecord>, CorpusError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();

    for (row, result) in reader.deserialize::<CorpusRow>().enumerate() {
        let CorpusRow {
            token,
            embedding,
            source_document,
        } = result?;
        let embedding: Vec<f32> =
            serde_json::from_str(&embedding).map_err(|source| CorpusError::Json { row, source })?;
        records.push(EmbeddingRecord {
            id: row.to_string(),
            token,
            embedding,
            source_document: source_document.filter(|source| !source.is_empty()),
        });
    }

    tracing::debug!(path = %path.display(), rows = records.len(), "Corpus file read");
    Ok(records)
}
