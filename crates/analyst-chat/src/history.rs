//! History sanitizing before prompt assembly.

use analyst_core::types::{Message, Role};

/// Decides whether a history message is on topic for a requirements
/// conversation.
pub trait RelevancePolicy: Send + Sync {
    fn is_relevant(&self, text: &str) -> bool;
}

/// Rejects messages containing any of a list of off-topic keywords
/// (case-insensitive substring match).
///
/// This is a coarse topic filter. "game" also matches "gamers", which is
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct KeywordRelevancePolicy {
    keywords: Vec<String>,
}

impl KeywordRelevancePolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl RelevancePolicy for KeywordRelevancePolicy {
    fn is_relevant(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        !self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

/// Keeps every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl RelevancePolicy for AllowAllPolicy {
    fn is_relevant(&self, _text: &str) -> bool {
        true
    }
}

/// Drop system messages and off-topic messages, then keep the most recent
/// `2 * max_turns` entries in their original order.
pub fn sanitize(history: &[Message], max_turns: usize, policy: &dyn RelevancePolicy) -> Vec<Message> {
    let kept: Vec<&Message> = history
        .iter()
        .filter(|m| m.role != Role::System)
        .filter(|m| policy.is_relevant(&m.content))
        .collect();

    let limit = max_turns.saturating_mul(2);
    let start = kept.len().saturating_sub(limit);
    kept[start..].iter().map(|m| (*m).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::config::ChatConfig;

    fn default_policy() -> KeywordRelevancePolicy {
        KeywordRelevancePolicy::new(&ChatConfig::default().off_topic_keywords)
    }

    fn conversation(pairs: usize) -> Vec<Message> {
        (0..pairs)
            .flat_map(|i| {
                [
                    Message::user(format!("answer {}", i)),
                    Message::assistant(format!("question {}?", i)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_only_system_messages_yield_empty() {
        let history = vec![Message::system("a"), Message::system("b")];
        assert!(sanitize(&history, 8, &AllowAllPolicy).is_empty());
    }

    #[test]
    fn test_truncates_to_most_recent_in_order() {
        let history = conversation(10);
        let cleaned = sanitize(&history, 3, &AllowAllPolicy);
        assert_eq!(cleaned.len(), 6);
        assert_eq!(cleaned, history[14..].to_vec());
    }

    #[test]
    fn test_short_history_untouched() {
        let history = conversation(2);
        assert_eq!(sanitize(&history, 8, &default_policy()), history);
    }

    #[test]
    fn test_off_topic_messages_dropped() {
        let history = vec![
            Message::user("I want to open a bakery"),
            Message::user("Tell me a JOKE"),
            Message::assistant("Who are your customers?"),
            Message::user("What's a good recipe for bread?"),
        ];
        let cleaned = sanitize(&history, 8, &default_policy());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1].content, "Who are your customers?");
    }

    #[test]
    fn test_zero_turns_keeps_nothing() {
        assert!(sanitize(&conversation(3), 0, &AllowAllPolicy).is_empty());
    }

    #[test]
    fn test_blank_keywords_ignored() {
        let policy = KeywordRelevancePolicy::new(["", "  "]);
        assert!(policy.is_relevant("anything at all"));
    }

    #[test]
    fn test_policy_usable_as_trait_object() {
        let policy: std::sync::Arc<dyn RelevancePolicy> = std::sync::Arc::new(default_policy());
        assert!(!policy.is_relevant("a riddle for you"));
        assert!(policy.is_relevant("our stakeholders are teachers"));
    }
}
