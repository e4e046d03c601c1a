//! Post-processing of single-shot completions.

use vlog_models::UserMemory;

/// Strip a surrounding Markdown code fence (```` ```json ```` etc.).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or_default();
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse a memory-extraction completion.
///
/// Accepts bare JSON, fenced JSON, or JSON embedded in surrounding prose.
pub fn parse_memory_response(raw: &str) -> Result<UserMemory, serde_json::Error> {
    let body = strip_code_fence(raw);
    match serde_json::from_str(body) {
        Ok(memory) => Ok(memory),
        Err(err) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end]),
            _ => Err(err),
        },
    }
}

/// Memory extracted from a completion, or the empty profile when it does not
/// parse.
pub fn memory_or_empty(raw: &str) -> (UserMemory, Option<serde_json::Error>) {
    match parse_memory_response(raw) {
        Ok(memory) => (memory, None),
        Err(err) => (UserMemory::empty(), Some(err)),
    }
}

/// Final text of a refinement pass, keeping `raw` when the model returns
/// nothing usable.
pub fn refined_or_raw(refined: &str, raw: &str) -> String {
    let refined = strip_code_fence(refined);
    if refined.is_empty() {
        raw.trim().to_string()
    } else {
        refined.to_string()
    }
}
