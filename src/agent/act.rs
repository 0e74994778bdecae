use std::time::Duration;

use serde_json::Value;

use crate::agent::AgentContext;
use crate::browser::driver::LocatorMethod;
use crate::error::{PilotError, Result};
use crate::llm::types::{ActRequest, ActResult, UseVision, VerifyRequest};
use crate::vision;

const NEW_PAGE_RACE_MS: u64 = 1_500;
const NETWORK_IDLE_RACE_MS: u64 = 5_000;
/// Headroom beyond the chunk count for the vision toggle and retries.
const EXTRA_ITERATIONS: usize = 5;

pub(crate) struct ActParams {
    pub action: String,
    pub steps: String,
    pub chunks_seen: Vec<i64>,
    pub model_name: String,
    pub use_vision: UseVision,
    pub verifier_use_vision: bool,
    pub request_id: String,
}

fn not_completed(action: &str) -> ActResult {
    ActResult {
        success: false,
        message: "Action was not able to be completed.".to_string(),
        action: action.to_string(),
    }
}

/// The act state machine.
///
/// Each iteration serializes one DOM chunk and asks the model for the next
/// elementary command. A null plan advances to the next chunk, then falls
/// back to vision (once), then gives up. A dispatched command may trigger
/// the completion verifier; an unverified claim sends the loop around again.
///
/// Termination: chunk advances are bounded by the chunk count, the vision
/// toggle is one-shot, dispatch retries are capped at 2 per chosen command,
/// and verifier rejections are capped at the chunk count. A successful
/// dispatch resets the iteration guard since it consumed an LLM-chosen step.
pub(crate) async fn run_act(ctx: &AgentContext<'_>, params: ActParams) -> Result<ActResult> {
    let model_name = params.model_name.clone();
    let mut use_vision = params.use_vision;
    let mut verifier_use_vision = params.verifier_use_vision;

    // Vision gating: force text-only when the model cannot see.
    if use_vision != UseVision::Disabled && !ctx.llm.supports_vision(&model_name) {
        ctx.mirror.log(
            1,
            "act",
            &format!(
                "{} does not support vision. Skipping vision processing.",
                model_name
            ),
        );
        use_vision = UseVision::Disabled;
        verifier_use_vision = false;
    }

    let mut chunks_seen = params.chunks_seen;
    let mut steps = params.steps;
    let mut retries: u32 = 0;
    let mut verifier_rejections: usize = 0;
    let mut fruitless_iterations: usize = 0;

    loop {
        ctx.bridge.wait_for_settled(None).await;
        ctx.bridge.debug_start().await;

        let snapshot = match ctx.bridge.process_dom(&chunks_seen).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                ctx.mirror.log(
                    1,
                    "act",
                    &format!("DOM serialization failed, giving up: {}", e),
                );
                ctx.bridge.debug_cleanup().await;
                if let Some(cache) = ctx.cache {
                    cache.purge_request(&params.request_id);
                }
                return Ok(not_completed(&params.action));
            }
        };

        if fruitless_iterations > snapshot.chunks.len() + EXTRA_ITERATIONS {
            ctx.mirror
                .log(1, "act", "Iteration guard tripped, giving up");
            ctx.bridge.debug_cleanup().await;
            if let Some(cache) = ctx.cache {
                cache.purge_request(&params.request_id);
            }
            return Ok(not_completed(&params.action));
        }

        let screenshot = if use_vision == UseVision::Enabled {
            match vision::annotated_screenshot(ctx.driver, &snapshot.selector_map).await {
                Ok(b64) => Some(b64),
                Err(e) => {
                    ctx.mirror.log(
                        1,
                        "act",
                        &format!("Annotated screenshot failed, planning without it: {}", e),
                    );
                    None
                }
            }
        } else {
            None
        };

        let response = ctx
            .llm
            .act(ActRequest {
                action: params.action.clone(),
                dom_elements: snapshot.output_string.clone(),
                steps: steps.clone(),
                screenshot,
                model_name: model_name.clone(),
                request_id: params.request_id.clone(),
            })
            .await
            .map_err(|e| PilotError::Llm(e.to_string()))?;

        ctx.bridge.debug_cleanup().await;

        let Some(command) = response else {
            // No actionable element in this chunk.
            if chunks_seen.len() + 1 < snapshot.chunks.len() {
                chunks_seen.push(snapshot.chunk);
                steps.push_str("## Step: Scrolled to another section\n");
                ctx.mirror.log(
                    1,
                    "act",
                    &format!(
                        "No action in chunk {}, advancing ({}/{} seen)",
                        snapshot.chunk,
                        chunks_seen.len(),
                        snapshot.chunks.len()
                    ),
                );
                fruitless_iterations += 1;
                continue;
            }
            if use_vision == UseVision::Fallback {
                ctx.mirror
                    .log(1, "act", "Chunks exhausted, falling back to vision");
                ctx.bridge.scroll_to_top().await;
                use_vision = UseVision::Enabled;
                fruitless_iterations += 1;
                continue;
            }
            if let Some(cache) = ctx.cache {
                cache.purge_request(&params.request_id);
            }
            return Ok(not_completed(&params.action));
        };

        // Dispatch the chosen command.
        let selector = format!(
            "xpath={}",
            snapshot
                .selector_map
                .get(&command.element)
                .map(String::as_str)
                .unwrap_or_default()
        );
        let url_before = ctx.driver.current_url().await.unwrap_or_default();

        if let Err(e) = dispatch(ctx, &command.method, &selector, &command.args).await {
            if retries < 2 {
                retries += 1;
                fruitless_iterations += 1;
                ctx.mirror.log(
                    1,
                    "act",
                    &format!("Dispatch failed (attempt {}): {}", retries, e),
                );
                continue;
            }
            let message = match &e {
                PilotError::InvalidMethod(_) => e.to_string(),
                other => format!("Error performing action: {}", other),
            };
            ctx.mirror.log(1, "act", &message);
            ctx.recorder.record_action(&params.action, "");
            return Ok(ActResult {
                success: false,
                message,
                action: params.action.clone(),
            });
        }

        // Post-click navigation bookkeeping: preserve the single-tab
        // invariant, then give the page a chance to quiesce.
        if command.method == LocatorMethod::Click.as_str() {
            match ctx
                .driver
                .wait_for_new_page(Duration::from_millis(NEW_PAGE_RACE_MS))
                .await
            {
                Ok(Some(url)) if !url.is_empty() => {
                    ctx.mirror.log(
                        1,
                        "act",
                        &format!("New page detected, adopting URL: {}", url),
                    );
                    if let Err(e) = ctx.driver.goto(&url).await {
                        ctx.mirror.log(
                            1,
                            "act",
                            &format!("Failed to adopt new page URL: {}", e),
                        );
                    } else {
                        let _ = ctx.driver.wait_for_dom_content_loaded().await;
                        ctx.bridge.wait_for_settled(None).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "new page race failed, continuing");
                }
            }

            if ctx
                .driver
                .wait_for_network_idle(Duration::from_millis(NETWORK_IDLE_RACE_MS))
                .await
                .is_err()
            {
                ctx.mirror
                    .log(1, "act", "Network idle timed out, continuing");
            }

            let url_after = ctx.driver.current_url().await.unwrap_or_default();
            if !url_after.is_empty() && url_after != url_before {
                ctx.mirror
                    .log(1, "act", &format!("Page navigated to {}", url_after));
            }
        }

        let element_text = snapshot
            .element_text(command.element)
            .unwrap_or("Element not found");
        steps.push_str(&format!(
            "## Step: {}\n  Element: {}\n  Action: {}\n  Reasoning: {}\n",
            command.step, element_text, command.method, command.why
        ));

        if command.completed {
            ctx.mirror
                .log(1, "act", "Model reports completion, verifying");
            let verified = verify_completion(
                ctx,
                &params.action,
                &steps,
                verifier_use_vision,
                &model_name,
                &params.request_id,
            )
            .await?;

            if verified {
                ctx.recorder.record_action(&params.action, &command.step);
                return Ok(ActResult {
                    success: true,
                    message: format!("Action completed successfully: {}", steps),
                    action: params.action.clone(),
                });
            }

            verifier_rejections += 1;
            ctx.mirror.log(
                1,
                "act",
                &format!(
                    "Completion not verified ({}/{})",
                    verifier_rejections,
                    snapshot.chunks.len().max(1)
                ),
            );
            if verifier_rejections >= snapshot.chunks.len().max(1) {
                if let Some(cache) = ctx.cache {
                    cache.purge_request(&params.request_id);
                }
                return Ok(not_completed(&params.action));
            }
        }

        // A successful dispatch starts a new logical failure site: the next
        // command gets its own retry budget, and the guard restarts.
        retries = 0;
        fruitless_iterations = 0;
    }
}

/// Route a model-chosen method name onto the driver. Unknown names surface
/// as an invalid-method error and go through the normal retry path.
async fn dispatch(
    ctx: &AgentContext<'_>,
    method: &str,
    selector: &str,
    args: &[Value],
) -> Result<()> {
    let method: LocatorMethod = method.parse()?;
    let first_arg = args.first().and_then(Value::as_str).unwrap_or_default();

    let outcome = match method {
        LocatorMethod::Click => ctx.driver.click(selector).await,
        LocatorMethod::Fill | LocatorMethod::Type => ctx.driver.fill(selector, first_arg).await,
        LocatorMethod::Press => ctx.driver.press(first_arg).await,
        LocatorMethod::ScrollIntoView => ctx.driver.scroll_into_view(selector).await,
        LocatorMethod::Hover => ctx.driver.hover(selector).await,
        LocatorMethod::Check => ctx.driver.check(selector).await,
        LocatorMethod::Uncheck => ctx.driver.uncheck(selector).await,
        LocatorMethod::SelectOption => ctx.driver.select_option(selector, first_arg).await,
    };
    outcome.map_err(|e| PilotError::Browser(e.to_string()))
}

/// Cross-check a claimed completion against an independent view of the
/// page: a full-page screenshot when the verifier may see, the serialized
/// DOM otherwise.
async fn verify_completion(
    ctx: &AgentContext<'_>,
    goal: &str,
    steps: &str,
    use_vision: bool,
    model_name: &str,
    request_id: &str,
) -> Result<bool> {
    let (screenshot, dom_elements) = if use_vision {
        let shot = match vision::page_screenshot(ctx.driver, true).await {
            Ok(shot) => shot,
            Err(first) => {
                tracing::warn!(error = %first, "full-page screenshot failed, retrying once");
                vision::page_screenshot(ctx.driver, true)
                    .await
                    .map_err(|e| PilotError::Screenshot(e.to_string()))?
            }
        };
        (Some(shot), None)
    } else {
        let full = ctx.bridge.process_all_of_dom().await?;
        (None, Some(full.output_string))
    };

    ctx.llm
        .verify_act_completion(VerifyRequest {
            goal: goal.to_string(),
            steps: steps.to_string(),
            screenshot,
            dom_elements,
            model_name: model_name.to_string(),
            request_id: request_id.to_string(),
        })
        .await
        .map_err(|e| PilotError::Llm(e.to_string()))
}
