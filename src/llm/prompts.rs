use serde_json::Value;

/// System prompt for choosing the next elementary UI command.
pub const ACT_SYSTEM_PROMPT: &str = r#"You are a browser automation planner. You are given a user goal, a numbered list of interactive elements from one section of the page, and the steps already taken. Decide the single next elementary command, or report that this section offers no way forward.

Respond with a JSON object in this exact format:
{
    "element": 0,
    "method": "click|fill|type|press|scrollIntoView|hover|check|uncheck|selectOption",
    "args": ["arguments for the method, e.g. text to fill"],
    "step": "short human-readable summary of this step",
    "why": "brief reasoning",
    "completed": false
}

Rules:
- "element" must be one of the numeric IDs shown in the element list (or visible in the screenshot markers).
- Set "completed" to true only if the user goal will be fully achieved after this command runs.
- If no element in this section can advance the goal, respond with exactly: null

Always respond with valid JSON or the literal null. No other text."#;

/// System prompt for schema-guided extraction over DOM chunks.
pub const EXTRACT_SYSTEM_PROMPT: &str = r#"You are extracting structured data from one section of a web page. You are given the extraction instruction, a JSON schema for the result, the content you extracted from earlier sections, and your own progress note.

Respond with a JSON object that has every schema field you can fill from this section merged with the previously extracted content, plus a metadata object:
{
    "metadata": {
        "progress": "free-form note on what has been gathered so far",
        "completed": false
    },
    ...schema fields...
}

Set "completed" to true once the instruction is fully satisfied and further sections cannot add anything. Always respond with valid JSON. No other text."#;

/// System prompt for enumerating candidate interactive elements.
pub const OBSERVE_SYSTEM_PROMPT: &str = r#"You are inspecting a web page for interactive elements relevant to an instruction. You are given a numbered element list, or an annotated screenshot whose markers carry the same numbers.

Respond with a JSON object in this exact format:
{
    "elements": [
        { "elementId": 0, "description": "what this element is and why it matters" }
    ]
}

Only include elements that exist in the list or the image. Always respond with valid JSON. No other text."#;

/// System prompt for cross-checking a claimed task completion.
pub const VERIFY_SYSTEM_PROMPT: &str = r#"You are auditing a browser automation run. You are given the goal, the steps the agent reports having taken, and an independent view of the page (a screenshot or a serialized DOM). Judge whether the goal has actually been achieved.

Respond with a JSON object in this exact format:
{ "completed": true }

Always respond with valid JSON. No other text."#;

pub fn format_act_message(action: &str, dom_elements: &str, steps: &str) -> String {
    let steps = if steps.trim().is_empty() {
        "None yet."
    } else {
        steps
    };
    format!(
        r#"GOAL: {}

STEPS TAKEN SO FAR:
{}

INTERACTIVE ELEMENTS IN THIS SECTION:
{}

What is the next command?"#,
        action, steps, dom_elements
    )
}

pub fn format_extract_message(
    instruction: &str,
    progress: &str,
    previously_extracted: &Value,
    dom_elements: &str,
    schema: &Value,
    chunks_seen: usize,
    chunks_total: usize,
) -> String {
    let progress = if progress.is_empty() {
        "None yet."
    } else {
        progress
    };
    format!(
        r#"INSTRUCTION: {}

RESULT SCHEMA:
{}

SECTIONS PROCESSED: {} of {}

PROGRESS SO FAR: {}

PREVIOUSLY EXTRACTED CONTENT:
{}

PAGE SECTION:
{}"#,
        instruction,
        schema,
        chunks_seen,
        chunks_total,
        progress,
        previously_extracted,
        dom_elements
    )
}

pub fn format_observe_message(instruction: &str, dom_elements: &str) -> String {
    format!(
        r#"INSTRUCTION: {}

ELEMENTS:
{}"#,
        instruction, dom_elements
    )
}

pub fn format_verify_message(goal: &str, steps: &str, dom_elements: Option<&str>) -> String {
    match dom_elements {
        Some(dom) => format!(
            r#"GOAL: {}

STEPS REPORTED:
{}

CURRENT PAGE STATE:
{}

Has the goal been achieved?"#,
            goal, steps, dom
        ),
        None => format!(
            r#"GOAL: {}

STEPS REPORTED:
{}

Judge the attached screenshot. Has the goal been achieved?"#,
            goal, steps
        ),
    }
}

/// Extract the JSON payload from a model reply, tolerating markdown fences.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\nnull\n```"), "null");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
