//! Situating-context generation: ask a chat model to describe where a chunk
//! sits within its source document, so the description can be embedded
//! alongside the chunk content.

use crate::error::{Error, Result};
use crate::llm::SamplingOptions;
use crate::models::{ChatMessage, Chunk};
use crate::resources::ModelResource;

/// Keep context answers short; they are embedded, not displayed.
const CONTEXT_MAX_TOKENS: u32 = 200;
const CONTEXT_TEMPERATURE: f32 = 0.3;

/// Build the situating prompt for one chunk of `document`.
fn build_context_prompt(document: &str, chunk: &str) -> String {
    format!(
        "<document>\n{document}\n</document>\n\n\
         Here is the chunk we want to situate within the whole document:\n\
         <chunk>\n{chunk}\n</chunk>\n\n\
         Please give a short succinct context to situate this chunk within \
         the overall document for the purposes of improving search retrieval \
         of the chunk. Answer only with the succinct context and nothing else."
    )
}

/// Generate a situating context for every chunk, sequentially.
///
/// The calls are deliberately not parallelized: they all compete for the
/// same chat resource slot. A failure on any chunk aborts the whole batch
/// so callers never persist a document with partially situated chunks.
pub async fn generate_contexts(
    chat: &ModelResource,
    document: &str,
    chunks: &mut [Chunk],
) -> Result<()> {
    let sampling = SamplingOptions {
        temperature: CONTEXT_TEMPERATURE,
        max_tokens: Some(CONTEXT_MAX_TOKENS),
    };

    for (i, chunk) in chunks.iter_mut().enumerate() {
        let prompt = build_context_prompt(document, &chunk.content);
        let messages = [ChatMessage::user(prompt)];

        let response = chat
            .chat(&messages, &sampling)
            .await
            .map_err(|e| Error::PartialBatch {
                failed_index: i,
                source: Box::new(e),
            })?;

        chunk.context = Some(response.trim().to_string());
    }

    Ok(())
}
