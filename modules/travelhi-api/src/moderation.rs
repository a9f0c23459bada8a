//! Moderation gate for user-submitted free text.
//!
//! Two stages. A local lexical filter catches strong Polish profanity,
//! including letter-masked and punctuation-split spellings, without any I/O.
//! Text that passes is sent to the remote classifier, bounded by a timeout;
//! when the classifier errors or times out the configured fail-open or
//! fail-closed policy decides.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::time::timeout;
use tracing::{error, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use ai_client::{ModerationAgent, ModerationResult};
use travelhi_common::ModerationPolicy;

/// Classifier categories that block regardless of the `flagged` bit.
pub const BLOCK_CATEGORIES: &[&str] = &[
    "harassment",
    "harassment/threats",
    "hate",
    "hate/threats",
    "violence",
    "graphic-violence",
    "sexual",
    "sexual/minors",
    "illicit-behavior",
    "self-harm",
    "self-harm/instructions",
];

const STRONG_STEMS: &[&str] = &[
    "kurwa",
    "chuj",
    "huj",
    "jeb",
    "pierdol",
    "spierdal",
    "skurwysyn",
    "pizd",
];

/// Characters commonly typed in place of a letter.
const MASK: &str = r"[*#$@]";
/// Filler tolerated between letters.
const GAP: &str = r"[\W_]*";

/// Pattern for `stem` tolerating filler between letters and at most one
/// masked interior letter. First and last letters are always literal.
fn fuzzy_pattern(stem: &str) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let variant = |masked: Option<usize>| {
        chars
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let letter = regex::escape(&c.to_string());
                if Some(i) == masked {
                    format!("(?:{letter}|{MASK}){GAP}")
                } else {
                    format!("{letter}{GAP}")
                }
            })
            .collect::<String>()
    };

    let variants: Vec<String> = std::iter::once(None)
        .chain((1..chars.len().saturating_sub(1)).map(Some))
        .map(variant)
        .collect();
    format!(r"(?i)\b(?:{})", variants.join("|"))
}

static PROFANITY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    STRONG_STEMS
        .iter()
        .filter_map(|stem| Regex::new(&fuzzy_pattern(stem)).ok())
        .collect()
});

static OBFUSCATED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bk[\W_]*[*x$#]{2,}[\W_]*a\b",
        r"(?i)\bp[\W_]*[*x$#]{2,}[\W_]*d[\W_]*a\b",
        r"(?i)\bs[\W_]*pier[\W_]*[*x$#]{2,}[\W_]*aj\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Strip diacritics (NFKD, drop combining marks) and lowercase.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// True when the raw or normalized text hits a profanity pattern.
pub fn contains_strong_profanity(text: &str) -> bool {
    let raw = text.trim();
    if raw.is_empty() {
        return false;
    }
    let normalized = normalize(raw);
    PROFANITY
        .iter()
        .chain(OBFUSCATED.iter())
        .any(|re| re.is_match(raw) || re.is_match(&normalized))
}

/// Per-call moderation outcome. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub allowed: bool,
    pub categories: Vec<String>,
    pub reasoning: String,
}

impl ModerationVerdict {
    fn allow(reasoning: impl Into<String>) -> Self {
        Self {
            allowed: true,
            categories: Vec::new(),
            reasoning: reasoning.into(),
        }
    }

    fn block(categories: Vec<String>, reasoning: impl Into<String>) -> Self {
        Self {
            allowed: false,
            categories,
            reasoning: reasoning.into(),
        }
    }

    fn from_classifier(result: ModerationResult) -> Self {
        let blocked = BLOCK_CATEGORIES
            .iter()
            .any(|c| result.is_category_active(c));

        if result.flagged || blocked {
            let reasoning = format!("flagged by {}", result.model);
            Self::block(result.categories, reasoning)
        } else {
            Self {
                allowed: true,
                categories: result.categories,
                reasoning: format!("passed {}", result.model),
            }
        }
    }
}

pub struct ModerationGate {
    classifier: Option<Arc<dyn ModerationAgent>>,
    policy: ModerationPolicy,
}

impl ModerationGate {
    /// `classifier = None` disables the remote stage; only the lexical
    /// filter runs.
    pub fn new(classifier: Option<Arc<dyn ModerationAgent>>, policy: ModerationPolicy) -> Self {
        Self { classifier, policy }
    }

    /// `true` when the text may be stored. Empty or absent text is allowed.
    pub async fn moderate(&self, text: Option<&str>) -> bool {
        self.assess(text).await.allowed
    }

    pub async fn assess(&self, text: Option<&str>) -> ModerationVerdict {
        let text = text.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return ModerationVerdict::allow("empty");
        }

        if self.policy.strict_profanity && contains_strong_profanity(text) {
            info!("Moderation local block: strong profanity matched");
            return ModerationVerdict::block(Vec::new(), "strong profanity");
        }

        let Some(classifier) = &self.classifier else {
            return ModerationVerdict::allow("remote classifier disabled");
        };

        match timeout(self.policy.timeout, classifier.moderate(text)).await {
            Ok(Ok(result)) => {
                let verdict = ModerationVerdict::from_classifier(result);
                info!(
                    allowed = verdict.allowed,
                    categories = ?verdict.categories,
                    "Moderation verdict"
                );
                verdict
            }
            Ok(Err(e)) => {
                error!(error = %e, fail_closed = self.policy.fail_closed, "Moderation error");
                self.on_failure("classifier error")
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.policy.timeout.as_millis() as u64,
                    fail_closed = self.policy.fail_closed,
                    "Moderation timed out"
                );
                self.on_failure("classifier timeout")
            }
        }
    }

    fn on_failure(&self, reason: &str) -> ModerationVerdict {
        if self.policy.fail_closed {
            ModerationVerdict::block(Vec::new(), format!("{reason}, failing closed"))
        } else {
            ModerationVerdict::allow(format!("{reason}, failing open"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FailingClassifier, SlowClassifier, StaticClassifier};

    fn policy() -> ModerationPolicy {
        ModerationPolicy {
            strict_profanity: true,
            fail_closed: false,
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn catches_plain_and_obfuscated_stems() {
        for text in [
            "kurwa",
            "KURWA mać",
            "k*rwa",
            "k.u.r.w.a",
            "k u r w a",
            "ku#wa",
            "k**a",
            "spierdalaj",
            "chuj",
            "to jest pizda",
        ] {
            assert!(contains_strong_profanity(text), "expected block: {text}");
        }
    }

    #[test]
    fn mask_never_replaces_last_letter() {
        for text in ["je@wp.pl", "napisz na hu@gmail.com", "chu#", "kurw@"] {
            assert!(!contains_strong_profanity(text), "expected pass: {text}");
        }
        assert!(contains_strong_profanity("j*b"));
        assert!(contains_strong_profanity("ch*j"));
    }

    #[test]
    fn diacritics_are_stripped() {
        assert_eq!(normalize("Zażółć GĘŚLĄ"), "zazołc gesla");
        assert!(contains_strong_profanity("jébać"));
    }

    #[test]
    fn clean_text_passes() {
        for text in ["Wypadek na A4", "Korek przed Krakowem", "Kurier utknął", ""] {
            assert!(!contains_strong_profanity(text), "expected pass: {text}");
        }
    }

    #[tokio::test]
    async fn lexical_block_never_calls_classifier() {
        let classifier = Arc::new(StaticClassifier::allowing());
        let gate = ModerationGate::new(Some(classifier.clone()), policy());

        assert!(!gate.moderate(Some("k*rwa")).await);
        assert!(!gate.moderate(Some("k.u.r.w.a")).await);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn empty_text_is_allowed_without_calls() {
        let classifier = Arc::new(StaticClassifier::flagging(&["hate"]));
        let gate = ModerationGate::new(Some(classifier.clone()), policy());

        assert!(gate.moderate(None).await);
        assert!(gate.moderate(Some("   ")).await);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn block_category_blocks_even_when_not_flagged() {
        let classifier = Arc::new(StaticClassifier::with_categories(false, &["violence"]));
        let gate = ModerationGate::new(Some(classifier), policy());

        let verdict = gate.assess(Some("Wypadek na A4")).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.categories, vec!["violence".to_string()]);
    }

    #[tokio::test]
    async fn unrelated_category_passes() {
        let classifier = Arc::new(StaticClassifier::with_categories(false, &["self-promotion"]));
        let gate = ModerationGate::new(Some(classifier), policy());
        assert!(gate.moderate(Some("Wypadek na A4")).await);
    }

    #[tokio::test]
    async fn classifier_error_follows_policy() {
        let open = ModerationGate::new(Some(Arc::new(FailingClassifier)), policy());
        assert!(open.moderate(Some("Wypadek na A4")).await);

        let closed = ModerationGate::new(
            Some(Arc::new(FailingClassifier)),
            ModerationPolicy {
                fail_closed: true,
                ..policy()
            },
        );
        assert!(!closed.moderate(Some("Wypadek na A4")).await);
    }

    #[tokio::test]
    async fn timeout_follows_policy() {
        let slow = || Some(Arc::new(SlowClassifier(Duration::from_secs(5))) as Arc<dyn ModerationAgent>);

        let open = ModerationGate::new(slow(), policy());
        assert!(open.moderate(Some("Wypadek na A4")).await);

        let closed = ModerationGate::new(
            slow(),
            ModerationPolicy {
                fail_closed: true,
                ..policy()
            },
        );
        let verdict = closed.assess(Some("Wypadek na A4")).await;
        assert!(!verdict.allowed);
        assert!(verdict.reasoning.contains("timeout"));
    }

    #[tokio::test]
    async fn lenient_policy_skips_lexical_stage() {
        let classifier = Arc::new(StaticClassifier::allowing());
        let gate = ModerationGate::new(
            Some(classifier.clone()),
            ModerationPolicy {
                strict_profanity: false,
                ..policy()
            },
        );
        assert!(gate.moderate(Some("kurwa")).await);
        assert_eq!(classifier.calls(), 1);
    }
}
