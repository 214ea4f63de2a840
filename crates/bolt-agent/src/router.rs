//! Router — classify a user turn into one of five categories and pick the
//! model that should answer it.

use bolt_core::{Mode, ModelKey};
use tracing::{debug, warn};

use crate::prompts::router_prompt;
use crate::provider::{ChatBackend, ChatMessage};

/// Turn categories, from "just chatting" to "needs the big brain".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Companion,
    CodeSimple,
    CodeComplex,
    CodeBeast,
    Cloud,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Companion => write!(f, "companion"),
            Self::CodeSimple => write!(f, "code_simple"),
            Self::CodeComplex => write!(f, "code_complex"),
            Self::CodeBeast => write!(f, "code_beast"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Token precedence for parsing classifier output. Longer/more specific
/// tokens first, so "code_beast" wins before "code" variants and a rambling
/// answer still lands on the right category.
const CATEGORY_TOKENS: &[(&str, Category)] = &[
    ("cloud", Category::Cloud),
    ("code_beast", Category::CodeBeast),
    ("code_complex", Category::CodeComplex),
    ("code_simple", Category::CodeSimple),
    ("companion", Category::Companion),
];

/// Map lowercased classifier output to a category. Unrecognised output
/// defaults to `Companion`.
pub fn parse_category(text: &str) -> Category {
    let lower = text.trim().to_lowercase();
    for (token, category) in CATEGORY_TOKENS {
        if lower.contains(token) {
            return *category;
        }
    }
    Category::Companion
}

/// One-shot classification on the router model. Failures downgrade to
/// `Companion` — routing must never block a turn.
pub async fn classify(backend: &dyn ChatBackend, router_model: &str, message: &str) -> Category {
    let prompt = router_prompt(message);
    let messages = vec![ChatMessage::user(prompt)];
    match backend.send(router_model, &messages).await {
        Ok(reply) => {
            let category = parse_category(&reply);
            debug!(%category, "turn classified");
            category
        }
        Err(e) => {
            warn!(err = %e, "classification failed, defaulting to companion");
            Category::Companion
        }
    }
}

/// Map a category to a model key, respecting the current mode and cloud
/// reachability.
pub fn pick_model(category: Category, mode: Mode, cloud_available: bool) -> ModelKey {
    if mode == Mode::Companion && category == Category::Companion {
        return ModelKey::Companion;
    }

    // Cloud-worthy turns use the cloud brain when reachable, otherwise the
    // closest local region.
    if matches!(category, Category::Cloud | Category::CodeBeast) {
        if cloud_available {
            return ModelKey::Cloud;
        }
        return if category == Category::CodeBeast {
            ModelKey::Beast
        } else {
            ModelKey::WorkerHeavy
        };
    }

    match category {
        Category::Companion => ModelKey::Companion,
        Category::CodeSimple => ModelKey::FastCode,
        Category::CodeComplex => ModelKey::WorkerHeavy,
        Category::Cloud | Category::CodeBeast => unreachable!("handled above"),
    }
}

/// The effective mode for a response: companion turns stay companion,
/// everything else runs with the code briefing.
pub fn effective_mode(category: Category) -> Mode {
    if category == Category::Companion {
        Mode::Companion
    } else {
        Mode::Code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[test]
    fn parse_matches_category_tokens() {
        assert_eq!(parse_category("companion"), Category::Companion);
        assert_eq!(parse_category("  Code_Simple  "), Category::CodeSimple);
        assert_eq!(
            parse_category("I think this is code_complex."),
            Category::CodeComplex
        );
        assert_eq!(parse_category("code_beast"), Category::CodeBeast);
        assert_eq!(parse_category("cloud"), Category::Cloud);
    }

    #[test]
    fn parse_defaults_to_companion_on_garbage() {
        assert_eq!(parse_category(""), Category::Companion);
        assert_eq!(parse_category("no idea"), Category::Companion);
    }

    #[test]
    fn parse_prefers_more_specific_code_tokens() {
        // A rambling classifier may emit several tokens; the precedence
        // order settles it.
        assert_eq!(
            parse_category("code_beast or maybe code_simple"),
            Category::CodeBeast
        );
    }

    #[test]
    fn companion_mode_and_category_stay_companion() {
        assert_eq!(
            pick_model(Category::Companion, Mode::Companion, false),
            ModelKey::Companion
        );
        assert_eq!(
            pick_model(Category::Companion, Mode::Code, false),
            ModelKey::Companion
        );
    }

    #[test]
    fn cloud_categories_prefer_cloud_when_available() {
        assert_eq!(
            pick_model(Category::Cloud, Mode::Companion, true),
            ModelKey::Cloud
        );
        assert_eq!(
            pick_model(Category::CodeBeast, Mode::Code, true),
            ModelKey::Cloud
        );
    }

    #[test]
    fn cloud_categories_fall_back_locally() {
        assert_eq!(
            pick_model(Category::CodeBeast, Mode::Code, false),
            ModelKey::Beast
        );
        assert_eq!(
            pick_model(Category::Cloud, Mode::Code, false),
            ModelKey::WorkerHeavy
        );
    }

    #[test]
    fn code_categories_map_to_coders() {
        assert_eq!(
            pick_model(Category::CodeSimple, Mode::Code, false),
            ModelKey::FastCode
        );
        assert_eq!(
            pick_model(Category::CodeComplex, Mode::Companion, false),
            ModelKey::WorkerHeavy
        );
    }

    #[test]
    fn effective_mode_splits_companion_from_code() {
        assert_eq!(effective_mode(Category::Companion), Mode::Companion);
        assert_eq!(effective_mode(Category::CodeSimple), Mode::Code);
        assert_eq!(effective_mode(Category::Cloud), Mode::Code);
    }

    struct ScriptedClassifier(&'static str);

    #[async_trait]
    impl ChatBackend for ScriptedClassifier {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
        async fn send_stream(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tx: mpsc::Sender<crate::stream::StreamEvent>,
        ) {
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl ChatBackend for FailingClassifier {
        fn name(&self) -> &str {
            "failing"
        }
        async fn send(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Unavailable("down".to_string()))
        }
        async fn send_stream(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tx: mpsc::Sender<crate::stream::StreamEvent>,
        ) {
        }
    }

    #[tokio::test]
    async fn classify_uses_backend_reply() {
        let backend = ScriptedClassifier("code_complex\n");
        let category = classify(&backend, "tiny-router", "refactor my parser").await;
        assert_eq!(category, Category::CodeComplex);
    }

    #[tokio::test]
    async fn classify_defaults_to_companion_on_backend_failure() {
        let category = classify(&FailingClassifier, "tiny-router", "hello").await;
        assert_eq!(category, Category::Companion);
    }
}
