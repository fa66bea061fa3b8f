//! Upload batch -> text units -> chunks -> embeddings -> vector index.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::chunking::{build_chunks, TextSplitter};
use crate::context::RequestContext;
use crate::embeddings::Embedder;
use crate::error::{ChatError, IngestError, ProviderError};
use crate::ingest::{batch_fingerprint, DocumentIngestor};
use crate::models::{EmbeddedChunk, IndexSummary, UploadedDocument};
use crate::traits::VectorIndex;

pub struct IndexingPipeline {
    ingestor: DocumentIngestor,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    last_fingerprint: Mutex<Option<String>>,
}

impl IndexingPipeline {
    pub fn new(
        ingestor: DocumentIngestor,
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            ingestor,
            splitter,
            embedder,
            index,
            last_fingerprint: Mutex::new(None),
        }
    }

    pub fn index(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.index)
    }

    /// Fingerprint of the batch currently held by the index, if any.
    pub fn last_fingerprint(&self) -> Option<String> {
        self.last_fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_fingerprint(&self, fingerprint: Option<String>) {
        *self
            .last_fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fingerprint;
    }

    /// Re-indexes only when `documents` differs from the last indexed batch.
    pub async fn index_if_changed(
        &self,
        documents: &[UploadedDocument],
        ctx: &RequestContext,
    ) -> Result<Option<IndexSummary>, ChatError> {
        let fingerprint = batch_fingerprint(documents);
        if self.last_fingerprint().as_deref() == Some(fingerprint.as_str()) {
            debug!(%fingerprint, "upload batch unchanged; keeping index");
            return Ok(None);
        }
        self.index_batch(documents, ctx).await.map(Some)
    }

    /// Replaces the index contents with `documents`.
    pub async fn index_batch(
        &self,
        documents: &[UploadedDocument],
        ctx: &RequestContext,
    ) -> Result<IndexSummary, ChatError> {
        if documents.is_empty() {
            return Err(IngestError::InvalidArgument("upload batch is empty".to_string()).into());
        }
        let fingerprint = batch_fingerprint(documents);

        let ingestor = self.ingestor.clone();
        let owned = documents.to_vec();
        let units = ctx
            .run("pdf extraction", async move {
                let joined = tokio::task::spawn_blocking(move || ingestor.ingest(&owned)).await;
                let units = joined.map_err(|error| IngestError::Io(std::io::Error::other(error)))??;
                Ok(units)
            })
            .await?;

        let chunks = build_chunks(&units, &self.splitter);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = ctx
            .run("chunk embedding", async {
                Ok(self.embedder.embed_batch(&texts).await?)
            })
            .await?;
        if vectors.len() != chunks.len() {
            return Err(ProviderError::response(
                self.embedder.model_name(),
                format!("expected {} embeddings, got {}", chunks.len(), vectors.len()),
            )
            .into());
        }

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();

        // A failed rebuild can leave the index cleared.
        self.set_fingerprint(None);
        ctx.run("index rebuild", self.index.rebuild(&embedded)).await?;
        self.set_fingerprint(Some(fingerprint.clone()));

        let summary = IndexSummary {
            documents: documents.len(),
            text_units: units.len(),
            chunks: embedded.len(),
            fingerprint,
        };
        info!(
            documents = summary.documents,
            text_units = summary.text_units,
            chunks = summary.chunks,
            backend = self.index.backend(),
            "indexed upload batch"
        );
        Ok(summary)
    }
}
