use crate::agent::AgentContext;
use crate::error::{PilotError, Result};
use crate::llm::types::{ObserveRequest, ObservedElement};
use crate::vision;

/// Used when the caller gives no instruction.
pub const DEFAULT_OBSERVE_INSTRUCTION: &str =
    "Find elements that can be used for any future actions on the page. These may be \
     navigation links, buttons, inputs, or other interactive elements. Be comprehensive: \
     if several elements could be relevant for future actions, return all of them.";

/// What the model sees instead of element text when the annotated
/// screenshot carries the information.
pub const VISION_SENTINEL: &str = "n/a. use the image to find the elements.";

pub(crate) struct ObserveParams {
    pub instruction: String,
    pub use_vision: bool,
    pub full_page: bool,
    pub model_name: String,
    pub request_id: String,
}

/// One-shot pipeline: serialize the DOM, optionally annotate a screenshot,
/// ask the model for candidate elements, and map its element IDs back to
/// xpath selectors.
///
/// Observe is single-chunk even when the DOM is larger; callers that need
/// full coverage pass `full_page`.
pub(crate) async fn run_observe(
    ctx: &AgentContext<'_>,
    params: ObserveParams,
) -> Result<Vec<ObservedElement>> {
    let instruction = if params.instruction.trim().is_empty() {
        DEFAULT_OBSERVE_INSTRUCTION.to_string()
    } else {
        params.instruction
    };

    ctx.bridge.wait_for_settled(None).await;
    ctx.bridge.debug_start().await;

    let (mut dom_elements, selector_map) = if params.full_page {
        let snapshot = ctx.bridge.process_all_of_dom().await?;
        (snapshot.output_string, snapshot.selector_map)
    } else {
        let snapshot = ctx.bridge.process_dom(&[]).await?;
        (snapshot.output_string, snapshot.selector_map)
    };

    let mut screenshot = None;
    if params.use_vision {
        if ctx.llm.supports_vision(&params.model_name) {
            match vision::annotated_screenshot(ctx.driver, &selector_map).await {
                Ok(b64) => {
                    screenshot = Some(b64);
                    dom_elements = VISION_SENTINEL.to_string();
                }
                Err(e) => {
                    ctx.mirror.log(
                        1,
                        "observe",
                        &format!("Annotated screenshot failed, continuing without vision: {}", e),
                    );
                }
            }
        } else {
            ctx.mirror.log(
                1,
                "observe",
                &format!(
                    "{} does not support vision. Skipping vision processing.",
                    params.model_name
                ),
            );
        }
    }

    let response = ctx
        .llm
        .observe(ObserveRequest {
            instruction: instruction.clone(),
            dom_elements,
            screenshot,
            model_name: params.model_name,
            request_id: params.request_id,
        })
        .await
        .map_err(|e| PilotError::Llm(e.to_string()))?;

    let results: Vec<ObservedElement> = response
        .elements
        .into_iter()
        .map(|el| ObservedElement {
            selector: format!(
                "xpath={}",
                selector_map
                    .get(&el.element_id)
                    .map(String::as_str)
                    .unwrap_or_default()
            ),
            description: el.description,
        })
        .collect();

    ctx.bridge.debug_cleanup().await;
    ctx.recorder.record_observation(&instruction, &results);

    ctx.mirror.log(
        1,
        "observe",
        &format!("Found {} element(s)", results.len()),
    );
    Ok(results)
}
