use serde::{Deserialize, Serialize};

use crate::missions::states::{Mission, MissionType};

const RECIPE_SIGNALS: &[&str] = &["recipe", "cook", "make", "ingredients"];
const EVENT_SIGNALS: &[&str] =
    &["party", "event", "celebration", "gathering", "birthday", "wedding"];
const RESEARCH_SIGNALS: &[&str] = &["tv", "laptop", "phone", "appliance", "compare", "best"];
const PRECISION_SIGNALS: &[&str] = &["need", "get", "buy"];
const LIST_SIGNALS: &[&str] = &["list", "groceries", "weekly", "stock up"];
const ESSENTIALS_SIGNALS: &[&str] = &["groceries", "list", "weekly", "stock up", "shopping"];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionDetection {
    pub mission_type: MissionType,
    pub confidence: f64,
}

impl MissionDetection {
    fn of(mission_type: MissionType) -> Self {
        Self { mission_type, confidence: mission_type.detection_confidence() }
    }
}

fn contains_any(text: &str, signals: &[&str]) -> bool {
    signals.iter().any(|signal| text.contains(signal))
}

/// Classifies a message. Signals are plain substrings of the lowercased text and the first
/// matching rule wins: recipe, event, research, precision, essentials.
///
/// `message_count` is the number of messages in the conversation so far, including this one.
/// Any conversation with two or more messages falls through to essentials.
pub fn detect_mission_type(text: &str, message_count: usize) -> Option<MissionDetection> {
    let text = text.to_lowercase();

    if contains_any(&text, RECIPE_SIGNALS) {
        return Some(MissionDetection::of(MissionType::Recipe));
    }
    if contains_any(&text, EVENT_SIGNALS) {
        return Some(MissionDetection::of(MissionType::Event));
    }
    if contains_any(&text, RESEARCH_SIGNALS) {
        return Some(MissionDetection::of(MissionType::Research));
    }
    if contains_any(&text, PRECISION_SIGNALS)
        && message_count <= 2
        && !contains_any(&text, LIST_SIGNALS)
    {
        return Some(MissionDetection::of(MissionType::Precision));
    }
    if contains_any(&text, ESSENTIALS_SIGNALS) || message_count >= 2 {
        return Some(MissionDetection::of(MissionType::Essentials));
    }
    None
}

/// Lowercased words longer than three characters, punctuation stripped, first occurrence order.
pub fn keyword_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in query.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|ch| ch.is_alphanumeric() || *ch == '-')
            .collect::<String>()
            .to_lowercase();
        if cleaned.chars().count() > 3 && !tokens.contains(&cleaned) {
            tokens.push(cleaned);
        }
    }
    tokens
}

/// A message deviates when it shares no keyword with the mission query and does not mention
/// the expected next action. Queries without usable keywords never report deviation.
pub fn is_deviation(mission: &Mission, message: &str) -> bool {
    let tokens = keyword_tokens(&mission.query);
    if tokens.is_empty() {
        return false;
    }

    let message = message.to_lowercase();
    if tokens.iter().any(|token| message.contains(token.as_str())) {
        return false;
    }

    match mission.expected_next_action.as_deref().map(str::trim) {
        Some(expected) if !expected.is_empty() => !message.contains(&expected.to_lowercase()),
        _ => true,
    }
}
