//! Decoding JSON payloads returned by an LLM.
//!
//! Models frequently wrap JSON in markdown code fences or surround it with
//! prose. Decoding therefore runs in two passes: parse the fence-stripped
//! text directly, and if that fails, retry on the outermost `{…}` slice.
//! Anything still unparseable is a [`ColloquyError::Parse`], never a panic.

use serde::de::DeserializeOwned;

use crate::error::{ColloquyError, Result};

/// Remove a surrounding markdown code fence (``` or ```json) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", …) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Decode a typed value from an LLM response, stripping fences first.
///
/// `what` names the payload in the error message (e.g. `"topic extraction"`).
pub fn decode_llm_json<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    let stripped = strip_code_fences(raw);
    match serde_json::from_str::<T>(stripped) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            // The model may have added prose around the object.
            if let Some(slice) = outermost_object(stripped) {
                if let Ok(value) = serde_json::from_str::<T>(slice) {
                    return Ok(value);
                }
            }
            Err(ColloquyError::Parse(format!(
                "{what}: {first_err} (payload: {})",
                preview(stripped)
            )))
        }
    }
}

/// Slice from the first `{` to the last `}`, if both exist in order.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Extraction {
        topic: String,
        #[serde(default)]
        keywords: Vec<String>,
    }

    #[test]
    fn strips_plain_fence() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn passes_through_unfenced_text() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn decodes_fenced_object() {
        let raw = "```json\n{\"topic\": \"Solar Energy\", \"keywords\": [\"solar\"]}\n```";
        let parsed: Extraction = decode_llm_json(raw, "topic extraction").unwrap();
        assert_eq!(parsed.topic, "Solar Energy");
        assert_eq!(parsed.keywords, vec!["solar"]);
    }

    #[test]
    fn decodes_object_embedded_in_prose() {
        let raw = "Sure! Here is the JSON:\n{\"topic\": \"Tides\"}\nHope that helps.";
        let parsed: Extraction = decode_llm_json(raw, "topic extraction").unwrap();
        assert_eq!(parsed.topic, "Tides");
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let err = decode_llm_json::<Extraction>("not json at all", "topic extraction")
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let err =
            decode_llm_json::<Extraction>("{\"keywords\": []}", "topic extraction").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
