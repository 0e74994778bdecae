use serde_json::{Map, Value};

use crate::agent::AgentContext;
use crate::error::{PilotError, Result};
use crate::llm::types::ExtractRequest;

pub(crate) struct ExtractParams {
    pub instruction: String,
    pub schema: Value,
    pub model_name: String,
    pub request_id: String,
}

/// Multi-chunk accumulation loop.
///
/// Each iteration feeds the model one unseen chunk together with the partial
/// value gathered so far; overlapping fields are last-writer-wins. The loop
/// stops when the model reports completion or every chunk has been seen.
pub(crate) async fn run_extract(ctx: &AgentContext<'_>, params: ExtractParams) -> Result<Value> {
    let mut progress = String::new();
    let mut content: Map<String, Value> = Map::new();
    let mut chunks_seen: Vec<i64> = Vec::new();

    loop {
        ctx.bridge.wait_for_settled(None).await;
        ctx.bridge.debug_start().await;

        let snapshot = match ctx.bridge.process_dom(&chunks_seen).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                ctx.mirror.log(
                    1,
                    "extract",
                    &format!("DOM serialization failed, returning partial content: {}", e),
                );
                ctx.bridge.debug_cleanup().await;
                return Ok(Value::Object(content));
            }
        };

        let response = ctx
            .llm
            .extract(ExtractRequest {
                instruction: params.instruction.clone(),
                progress: progress.clone(),
                previously_extracted_content: Value::Object(content.clone()),
                dom_elements: snapshot.output_string.clone(),
                schema: params.schema.clone(),
                chunks_seen: chunks_seen.len(),
                chunks_total: snapshot.chunks.len(),
                model_name: params.model_name.clone(),
                request_id: params.request_id.clone(),
            })
            .await
            .map_err(|e| PilotError::Llm(e.to_string()))?;

        ctx.bridge.debug_cleanup().await;

        progress = response.metadata.progress;
        for (key, value) in response.fields {
            content.insert(key, value);
        }
        chunks_seen.push(snapshot.chunk);

        ctx.mirror.log(
            2,
            "extract",
            &format!(
                "Processed chunk {} ({}/{}), progress: {}",
                snapshot.chunk,
                chunks_seen.len(),
                snapshot.chunks.len(),
                progress
            ),
        );

        if response.metadata.completed || chunks_seen.len() == snapshot.chunks.len() {
            return Ok(Value::Object(content));
        }
    }
}
