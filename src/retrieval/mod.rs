//! Two-stage retrieval: a vector-similarity prefilter over the candidate
//! set, then an optional cross-encoder rerank of the survivors.

pub mod scoring;

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{Chunk, ModelKind, ScoredChunk};
use crate::resources::{ModelResource, ResourceCache};

/// Options recognized by the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub embedding_model: String,
    pub reranker_model: Option<String>,
    pub top_k: usize,
    /// Inclusive lower bound on the combined score, in [0, 1].
    pub threshold: f32,
    pub should_rerank: bool,
}

impl RetrievalOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidConfig(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run the full pipeline over caller-provided candidates.
///
/// Stage 1 embeds the query once, scores every candidate, sorts, applies the
/// threshold, and truncates to `top_k`. Stage 2, when enabled, reranks the
/// survivors and re-sorts by the reranked score. Stage 1 always completes
/// before Stage 2 starts. An empty candidate set short-circuits before any
/// model resource is touched.
pub async fn retrieve(
    cache: &ResourceCache,
    query: &str,
    candidates: Vec<Chunk>,
    options: &RetrievalOptions,
) -> Result<Vec<ScoredChunk>> {
    options.validate()?;

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let embedder = cache
        .acquire(&options.embedding_model, ModelKind::Embedding)
        .await?;
    let query_embedding = embedder.embed(query).await?;

    let mut survivors = prefilter(&query_embedding, candidates, options.threshold, options.top_k)?;

    if options.should_rerank && !survivors.is_empty() {
        let model = options.reranker_model.as_deref().ok_or_else(|| {
            Error::InvalidConfig("should_rerank requires a reranker_model".to_string())
        })?;
        let reranker = cache.acquire(model, ModelKind::Reranker).await?;
        rerank(&reranker, query, &mut survivors).await?;
        survivors.truncate(options.top_k);
    }

    Ok(survivors)
}

/// Stage 1: score candidates against the query embedding, sort descending
/// by combined score, apply the inclusive threshold, keep the top `top_k`.
///
/// The sort is stable, so candidates with equal combined scores keep their
/// input order. Also used by the persisted chunk store, which makes the
/// in-memory and store-delegated prefilters behaviorally identical.
pub fn prefilter(
    query_embedding: &[f32],
    candidates: Vec<Chunk>,
    threshold: f32,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    let mut scored = Vec::with_capacity(candidates.len());

    for chunk in candidates {
        let content_embedding = chunk.content_embedding.as_deref().ok_or_else(|| {
            Error::InvalidConfig("candidate chunk is missing its content embedding".to_string())
        })?;
        let content_score = scoring::cosine_similarity(query_embedding, content_embedding)?;

        let context_score = match chunk.context_embedding.as_deref() {
            Some(context_embedding) => {
                Some(scoring::cosine_similarity(query_embedding, context_embedding)?)
            }
            None => None,
        };

        let combined_score = scoring::combine_scores(content_score, context_score);
        scored.push(ScoredChunk {
            chunk,
            content_score,
            context_score,
            combined_score,
            reranked_score: None,
        });
    }

    scored.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
    });
    scored.retain(|s| s.combined_score >= threshold);
    scored.truncate(top_k);
    Ok(scored)
}

/// Stage 2: cross-encoder rerank of the Stage 1 survivors, in place.
///
/// The reranker contract is positional: result `index` i scores input
/// document i. The correspondence is checked rather than assumed; a
/// response with missing, duplicate, or out-of-range indices is rejected.
pub async fn rerank(
    reranker: &ModelResource,
    query: &str,
    survivors: &mut [ScoredChunk],
) -> Result<()> {
    let documents: Vec<String> = survivors.iter().map(|s| s.chunk.content.clone()).collect();
    let scores = reranker.rank(query, &documents).await?;

    if scores.len() != survivors.len() {
        return Err(Error::Runtime(anyhow::anyhow!(
            "Reranker returned {} scores for {} documents",
            scores.len(),
            survivors.len()
        )));
    }

    for rank in &scores {
        let slot = survivors.get_mut(rank.index).ok_or_else(|| {
            Error::Runtime(anyhow::anyhow!(
                "Reranker returned out-of-range index {}",
                rank.index
            ))
        })?;
        if slot.reranked_score.is_some() {
            return Err(Error::Runtime(anyhow::anyhow!(
                "Reranker returned index {} twice",
                rank.index
            )));
        }
        slot.reranked_score = Some(rank.score);
    }

    survivors.sort_by(|a, b| {
        b.sort_key()
            .partial_cmp(&a.sort_key())
            .unwrap_or(Ordering::Equal)
    });
    Ok(())
}

/// Attach embedding vectors to chunks: one for the content and, when a
/// situating context is present, one for the context.
///
/// Processing is per chunk, in order; the first failure aborts the batch so
/// a document is never left with a mix of embedded and bare chunks.
pub async fn embed_chunks(
    cache: &ResourceCache,
    model: &str,
    chunks: &mut [Chunk],
) -> Result<()> {
    if chunks.is_empty() {
        return Ok(());
    }

    let embedder = cache.acquire(model, ModelKind::Embedding).await?;

    for (i, chunk) in chunks.iter_mut().enumerate() {
        let result = async {
            chunk.content_embedding = Some(embedder.embed(&chunk.content).await?);
            if let Some(context) = chunk.context.clone() {
                chunk.context_embedding = Some(embedder.embed(&context).await?);
            }
            Ok::<_, Error>(())
        }
        .await;

        result.map_err(|e| Error::PartialBatch {
            failed_index: i,
            source: Box::new(e),
        })?;
    }

    Ok(())
}
