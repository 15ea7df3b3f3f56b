use regex::{Regex, RegexBuilder};

use crate::models::{ModerationRule, RuleAction};

/// Longest input the filter will look at; the endpoint rejects anything larger.
pub const MAX_SCAN_CHARS: usize = 10_000;

// Bounds on compiled regex programs so a hostile rule cannot balloon memory.
const REGEX_SIZE_LIMIT: usize = 1 << 20;
const REGEX_DFA_SIZE_LIMIT: usize = 1 << 20;

/// The first rule that matched, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub category: String,
    pub action: RuleAction,
    pub pattern: String,
}

#[derive(Clone)]
enum Matcher {
    /// Lowercased literal, matched by substring containment
    Literal(String),
    Pattern(Regex),
}

#[derive(Clone)]
struct CompiledRule {
    rule: ModerationRule,
    matcher: Matcher,
}

/// Keyword filter over an ordered moderator rule set
///
/// Literal rules match case-insensitively anywhere in the text; regex rules are
/// compiled case-insensitive. The regex engine runs in linear time, so no rule
/// can trigger catastrophic backtracking.
#[derive(Clone, Default)]
pub struct ContentFilter {
    rules: Vec<CompiledRule>,
}

impl ContentFilter {
    /// Compile a rule set, skipping rules that cannot be evaluated
    pub fn new(rules: Vec<ModerationRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let matcher = if rule.is_regex {
                    match RegexBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .size_limit(REGEX_SIZE_LIMIT)
                        .dfa_size_limit(REGEX_DFA_SIZE_LIMIT)
                        .build()
                    {
                        Ok(re) => Matcher::Pattern(re),
                        Err(e) => {
                            tracing::debug!(pattern = %rule.pattern, error = %e, "Skipping invalid moderation regex");
                            return None;
                        }
                    }
                } else {
                    // Padding is significant: " ass " only matches the whole word.
                    if rule.pattern.trim().is_empty() {
                        tracing::debug!(category = %rule.category, "Skipping empty literal moderation rule");
                        return None;
                    }
                    Matcher::Literal(rule.pattern.to_lowercase())
                };
                Some(CompiledRule { rule, matcher })
            })
            .collect();

        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scan text and return the first matching rule
    ///
    /// # Arguments
    /// * `text` - The submitted caption or comment
    ///
    /// # Returns
    /// The category and action of the first rule that matched, if any
    pub fn scan(&self, text: &str) -> Option<RuleMatch> {
        let sanitized = sanitize(text);
        if sanitized.trim().is_empty() {
            return None;
        }
        let lowered = sanitized.to_lowercase();

        self.rules
            .iter()
            .find(|compiled| match &compiled.matcher {
                Matcher::Literal(literal) => lowered.contains(literal.as_str()),
                Matcher::Pattern(re) => re.is_match(&sanitized),
            })
            .map(|compiled| RuleMatch {
                category: compiled.rule.category.clone(),
                action: compiled.rule.action,
                pattern: compiled.rule.pattern.clone(),
            })
    }
}

/// Strip control characters (keeping ordinary whitespace) and cap the length
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .take(MAX_SCAN_CHARS)
        .collect()
}
