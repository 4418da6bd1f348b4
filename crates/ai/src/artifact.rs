//! Structured artifacts embedded in free-form inference output.

use serde_json::{Map, Value as JsonValue};

const FENCE: &str = "```";

/// What a single candidate string turned out to contain.
///
/// A missing or broken artifact is a normal result, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseArtifact {
    /// A fenced JSON object with a string `type` discriminator.
    Recognized {
        kind: String,
        fields: Map<String, JsonValue>,
    },
    /// No fenced block at all.
    FreeText(String),
    /// A fenced block that is not a typed JSON object.
    Unparsable(String),
}

impl ResponseArtifact {
    pub fn parse(candidate: &str) -> Self {
        let Some(start) = candidate.find(FENCE) else {
            return Self::FreeText(candidate.trim().to_string());
        };

        let after_open = &candidate[start + FENCE.len()..];
        // Skip the info string (`json`, `JSON`, or nothing) unless the block is on one line.
        let body_start = match after_open.find('\n') {
            Some(i)
                if !after_open[..i].contains(FENCE)
                    && !after_open[..i].trim_start().starts_with('{') =>
            {
                i + 1
            }
            _ => 0,
        };
        let body = &after_open[body_start..];

        let Some(end) = body.find(FENCE) else {
            return Self::Unparsable(candidate.to_string());
        };
        let block = strip_language_tag(body[..end].trim());

        match serde_json::from_str::<JsonValue>(block) {
            Ok(JsonValue::Object(mut fields)) => match fields.remove("type") {
                Some(JsonValue::String(kind)) if !kind.trim().is_empty() => Self::Recognized {
                    kind: kind.trim().to_string(),
                    fields,
                },
                _ => Self::Unparsable(block.to_string()),
            },
            _ => Self::Unparsable(block.to_string()),
        }
    }

    /// Pick the best artifact across candidates: the first recognized one, else
    /// whatever the first candidate parses to.
    pub fn from_candidates<S: AsRef<str>>(candidates: &[S]) -> Self {
        let parsed: Vec<Self> = candidates.iter().map(|c| Self::parse(c.as_ref())).collect();

        if let Some(found) = parsed.iter().find(|a| a.is_recognized()) {
            return found.clone();
        }
        parsed
            .into_iter()
            .next()
            .unwrap_or_else(|| Self::Unparsable(String::new()))
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized { .. })
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Recognized { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Raw analysis object for the normalizer.
    ///
    /// - `Recognized`: its fields
    /// - `FreeText`: the text parsed as a JSON object, else `{ "executive_summary": text }`
    /// - `Unparsable`: `{}`
    pub fn into_analysis_payload(self) -> JsonValue {
        match self {
            Self::Recognized { fields, .. } => JsonValue::Object(fields),
            Self::FreeText(text) => match serde_json::from_str::<JsonValue>(&text) {
                Ok(obj @ JsonValue::Object(_)) => obj,
                _ if text.is_empty() => JsonValue::Object(Map::new()),
                _ => serde_json::json!({ "executive_summary": text }),
            },
            Self::Unparsable(_) => JsonValue::Object(Map::new()),
        }
    }
}

/// Drop a leading language tag left over from a one-line fence (```` ```json {...}``` ````).
fn strip_language_tag(block: &str) -> &str {
    let tag_len = block
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(block.len());
    let rest = block[tag_len..].trim_start();
    if tag_len > 0 && rest.starts_with('{') {
        rest
    } else {
        block
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fenced_typed_object_is_recognized() {
        let text = "Here you go:\n```json\n{\"type\": \"team_performance\", \"confidence_score\": 0.7}\n```\nThanks";

        match ResponseArtifact::parse(text) {
            ResponseArtifact::Recognized { kind, fields } => {
                assert_eq!(kind, "team_performance");
                assert_eq!(fields.get("confidence_score"), Some(&json!(0.7)));
                assert!(!fields.contains_key("type"));
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
    }

    #[test]
    fn one_line_fence_with_language_tag_is_recognized() {
        let text = "```json {\"type\": \"sla\", \"confidence_score\": 0.9}```";

        match ResponseArtifact::parse(text) {
            ResponseArtifact::Recognized { kind, fields } => {
                assert_eq!(kind, "sla");
                assert_eq!(fields.get("confidence_score"), Some(&json!(0.9)));
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
    }

    #[test]
    fn bare_fence_is_accepted() {
        let text = "```\n{\"type\": \"notification_decision\", \"priority\": \"high\"}\n```";
        assert_eq!(
            ResponseArtifact::parse(text).kind(),
            Some("notification_decision")
        );
    }

    #[test]
    fn fence_without_type_or_valid_json_is_unparsable() {
        let missing_type = "```json\n{\"priority\": \"high\"}\n```";
        assert!(matches!(
            ResponseArtifact::parse(missing_type),
            ResponseArtifact::Unparsable(_)
        ));

        let broken = "```json\n{\"type\": \"x\",\n```";
        assert!(matches!(
            ResponseArtifact::parse(broken),
            ResponseArtifact::Unparsable(_)
        ));

        let unclosed = "```json\n{\"type\": \"x\"}";
        assert!(matches!(
            ResponseArtifact::parse(unclosed),
            ResponseArtifact::Unparsable(_)
        ));
    }

    #[test]
    fn plain_text_is_free_text() {
        assert_eq!(
            ResponseArtifact::parse("  The team is doing fine. "),
            ResponseArtifact::FreeText("The team is doing fine.".to_string())
        );
    }

    #[test]
    fn every_tag_maps_to_an_analysis_object() {
        let recognized = ResponseArtifact::parse("```json\n{\"type\":\"sla\",\"confidence\":0.9}\n```");
        assert_eq!(recognized.into_analysis_payload(), json!({ "confidence": 0.9 }));

        let json_text = ResponseArtifact::FreeText("{\"summary\": \"ok\"}".to_string());
        assert_eq!(json_text.into_analysis_payload(), json!({ "summary": "ok" }));

        let prose = ResponseArtifact::FreeText("Looks fine".to_string());
        assert_eq!(
            prose.into_analysis_payload(),
            json!({ "executive_summary": "Looks fine" })
        );

        let junk = ResponseArtifact::Unparsable("{{".to_string());
        assert_eq!(junk.into_analysis_payload(), json!({}));
    }

    #[test]
    fn recognized_candidate_wins_over_earlier_prose() {
        let candidates = [
            "No structure here".to_string(),
            "```json\n{\"type\":\"cost_analysis\"}\n```".to_string(),
        ];
        assert_eq!(
            ResponseArtifact::from_candidates(&candidates).kind(),
            Some("cost_analysis")
        );

        let none: [&str; 0] = [];
        assert_eq!(
            ResponseArtifact::from_candidates(&none),
            ResponseArtifact::Unparsable(String::new())
        );
    }
}
