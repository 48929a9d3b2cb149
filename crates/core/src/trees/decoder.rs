use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not decode generated tree: {0}")]
pub struct DecodeError(pub String);

/// Question as the text-generation service writes it. Ids are optional and `question` is
/// accepted for `text`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawQuestion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub options: Vec<RawOption>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawOption {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "text")]
    pub label: String,
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawTree {
    #[serde(default)]
    pub questions: Vec<RawQuestion>,
}

/// Pulls the single JSON object out of free text. A fenced block is tried first; when it does
/// not hold an object, the span from the first `{` to the last `}` is tried.
pub fn extract_json(text: &str) -> Result<Value, DecodeError> {
    let mut last_error = None;
    for candidate in [fenced_block(text), brace_span(text)].into_iter().flatten() {
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => {
                last_error = Some(DecodeError("top-level JSON value is not an object".to_string()));
            }
            Err(error) => last_error = Some(DecodeError(error.to_string())),
        }
    }
    Err(last_error.unwrap_or_else(|| DecodeError("response contains no JSON object".to_string())))
}

pub fn decode_tree(text: &str) -> Result<RawTree, DecodeError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|error| DecodeError(error.to_string()))
}

/// Body of the first fenced block, without its optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body = after_fence
        .trim_start_matches(|ch: char| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    let end = body.find("```")?;
    Some(&body[..end])
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::{decode_tree, extract_json};

    #[test]
    fn fenced_json_is_extracted() {
        let text = "Here you go:\n```json\n{\"questions\": [{\"text\": \"Budget?\", \"options\": []}]}\n```\nEnjoy";
        let tree = decode_tree(text).expect("decodes");
        assert_eq!(tree.questions.len(), 1);
        assert_eq!(tree.questions[0].text, "Budget?");
    }

    #[test]
    fn bare_object_inside_prose_is_extracted() {
        let text = "Sure! {\"questions\": [{\"question\": \"Size?\", \"options\": [{\"text\": \"Big\"}]}]} done";
        let tree = decode_tree(text).expect("decodes");
        assert_eq!(tree.questions[0].options[0].label, "Big");
        assert_eq!(tree.questions[0].options[0].filters, None);
    }

    #[test]
    fn single_line_fence_with_language_tag_is_extracted() {
        let text = "```json {\"questions\": [{\"text\": \"Panel?\", \"options\": []}]}```";
        let tree = decode_tree(text).expect("decodes");
        assert_eq!(tree.questions[0].text, "Panel?");
    }

    #[test]
    fn broken_fence_falls_back_to_the_outer_object() {
        let text = "```text\nsee below\n``` {\"questions\": [{\"text\": \"Size?\", \"options\": []}]}";
        let tree = decode_tree(text).expect("decodes");
        assert_eq!(tree.questions[0].text, "Size?");
    }

    #[test]
    fn missing_or_broken_json_is_one_error() {
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("{ not valid }").is_err());
        assert!(decode_tree("```\n[1, 2]\n```").is_err());
    }
}
