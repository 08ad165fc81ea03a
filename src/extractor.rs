//! JSON extractor (C10): recover a structured object from free-form model
//! output. Models are asked for strict JSON but routinely wrap it in
//! prose or fenced code blocks; this recovers the intended object through
//! a cascade rather than failing on the first mismatch.

use serde_json::Value;

use crate::error::{Error, ErrorCode};

/// Run the full cascade: direct decode, then fenced-block strip, then
/// brace-matching scan. Returns `ProviderResponse` with the raw payload
/// attached under `context["raw"]` if nothing recovers a JSON object.
pub fn extract_json(text: &str) -> Result<Value, Error> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(fenced) = strip_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced.trim()) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if let Some(slice) = scan_braces(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    Err(Error::new(ErrorCode::ProviderResponse, "could not recover a JSON object from model output")
        .with_context("raw", trimmed))
}

/// Strip a single leading/trailing fenced code block (` ```json ... ``` `
/// or bare ` ``` ... ``` `).
fn strip_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    let after_lang = after_open
        .find('\n')
        .map(|i| &after_open[i + 1..])
        .unwrap_or(after_open);
    let end = after_lang.rfind("```")?;
    Some(&after_lang[..end])
}

/// Scan for the first `{` and its matching `}` at the same brace depth,
/// ignoring braces inside string literals.
fn scan_braces(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fetch a required, non-empty string field by name.
pub fn required_string(value: &Value, field: &str) -> Result<String, Error> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(ErrorCode::ProviderResponse, format!("response object missing required field '{field}'"))
                .with_context("raw", value.clone())
        })
}

/// Collapse a multi-line command to a single line and surface any
/// placeholder token (`<path_to_...>`) as a non-fatal detail.
pub fn normalize_command(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Detect a bracketed placeholder like `<path_to_file>` left in a
/// generated command, for the presenter to render as a warning.
pub fn find_placeholder(command: &str) -> Option<&str> {
    let start = command.find('<')?;
    let end = command[start..].find('>')? + start;
    Some(&command[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_decode_succeeds_on_clean_json() {
        let value = extract_json(r#"{"command": "ls -la"}"#).unwrap();
        assert_eq!(value["command"], "ls -la");
    }

    #[test]
    fn strips_fenced_block_with_language_tag() {
        let text = "```json\n{\"command\": \"ls -la\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["command"], "ls -la");
    }

    #[test]
    fn strips_bare_fenced_block() {
        let text = "```\n{\"command\": \"pwd\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["command"], "pwd");
    }

    #[test]
    fn scans_brace_matched_object_within_prose() {
        let text = "Sure thing! Here's the fix: {\"command\": \"git pull\"} Let me know if that works.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["command"], "git pull");
    }

    #[test]
    fn brace_scan_ignores_braces_inside_string_values() {
        let text = r#"noise {"command": "echo '{not a brace}'"} trailing"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["command"], "echo '{not a brace}'");
    }

    #[test]
    fn unrecoverable_text_surfaces_raw_payload_in_context() {
        let err = extract_json("I cannot help with that request.").unwrap_err();
        assert_eq!(err.code, ErrorCode::ProviderResponse);
        assert!(err.context.contains_key("raw"));
    }

    #[test]
    fn required_string_rejects_empty_and_missing_fields() {
        let value = serde_json::json!({"command": "   "});
        assert!(required_string(&value, "command").is_err());
        assert!(required_string(&value, "explanation").is_err());
    }

    #[test]
    fn normalize_command_collapses_internal_newlines() {
        let collapsed = normalize_command("find . \\\n  -name '*.pdf'");
        assert!(!collapsed.contains('\n'));
    }

    #[test]
    fn find_placeholder_detects_bracketed_token() {
        assert_eq!(find_placeholder("cp <path_to_file> /dest"), Some("<path_to_file>"));
        assert_eq!(find_placeholder("cp real_file /dest"), None);
    }
}
