//! Model Discovery
//!
//! Lists the models every registered provider serves and describes them as
//! capability descriptors. Tags are inferred from well-known model family
//! names; every model is at least `general`.

use std::collections::BTreeSet;

use agent_core::provider::{ModelInfo, ProviderRouter};
use agent_orchestrator::CapabilityDescriptor;

/// Name fragments that imply a capability tag
const TAG_HINTS: &[(&str, &[&str])] = &[
    ("code", &["code", "coder", "starcoder", "codellama", "devstral"]),
    ("reasoning", &["r1", "reason", "qwq", "think", "o1", "o3"]),
    ("visual", &["llava", "vision", "-vl", "bakllava", "moondream"]),
    ("data", &["qwen", "mistral", "llama", "gpt"]),
];

/// Capability tags for a model, inferred from its name
pub fn infer_tags(model: &ModelInfo) -> BTreeSet<String> {
    let name = model.name.to_lowercase();
    let mut tags = BTreeSet::from(["general".to_string()]);

    for (tag, hints) in TAG_HINTS {
        if hints.iter().any(|hint| name.contains(hint)) {
            tags.insert((*tag).to_string());
        }
    }
    if model.supports_vision {
        tags.insert("visual".into());
    }
    tags
}

/// Describe one discovered model
pub fn describe(provider_id: &str, model: &ModelInfo) -> CapabilityDescriptor {
    CapabilityDescriptor::model(provider_id, model.id.clone(), infer_tags(model))
}

/// Discover models across the router's providers, then append `configured`
/// descriptors. The first occurrence of each `provider/identifier` wins.
///
/// Configured models whose provider is not registered with the router are
/// dropped; every call to them would fail.
pub async fn discover_capabilities(
    router: &ProviderRouter,
    configured: &[CapabilityDescriptor],
) -> Vec<CapabilityDescriptor> {
    let discovered = router.discover_models().await;
    let providers: BTreeSet<&str> = router.provider_ids().into_iter().collect();
    let mut seen = BTreeSet::new();

    let reachable = configured.iter().filter(|d| {
        let known = providers.contains(d.provider_id.as_str());
        if !known {
            tracing::warn!(
                model = %d.qualified_name(),
                "Ignoring configured model: no provider registered under this id"
            );
        }
        known
    });

    let models: Vec<CapabilityDescriptor> = discovered
        .iter()
        .map(|(provider_id, model)| describe(provider_id, model))
        .chain(reachable.cloned())
        .filter(|d| seen.insert(d.qualified_name()))
        .collect();

    tracing::info!(
        discovered = discovered.len(),
        configured = configured.len(),
        total = models.len(),
        "Model discovery complete"
    );
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::MockProvider;
    use std::sync::Arc;

    fn info(name: &str) -> ModelInfo {
        ModelInfo {
            id: name.into(),
            name: name.into(),
            context_length: None,
            supports_vision: false,
        }
    }

    #[test]
    fn test_infer_tags() {
        let coder = infer_tags(&info("deepseek-coder:6.7b"));
        assert!(coder.contains("general"));
        assert!(coder.contains("code"));
        assert!(!coder.contains("visual"));

        assert!(infer_tags(&info("llava:13b")).contains("visual"));
        assert!(infer_tags(&info("deepseek-r1:8b")).contains("reasoning"));
        assert_eq!(infer_tags(&info("phi3")), BTreeSet::from(["general".to_string()]));
    }

    #[tokio::test]
    async fn test_discover_merges_configured_models() {
        let mut router = ProviderRouter::new();
        router.register("ollama", Arc::new(MockProvider::echo("local")));
        router.register("openai", Arc::new(MockProvider::echo("remote")));

        let configured = vec![
            CapabilityDescriptor::model("ollama", "mock", ["reasoning"]),
            CapabilityDescriptor::model("openai", "gpt-4o", ["general", "visual"]),
        ];
        let models = discover_capabilities(&router, &configured).await;

        let names: Vec<String> = models.iter().map(CapabilityDescriptor::qualified_name).collect();
        assert_eq!(names, vec!["ollama/mock", "openai/mock", "openai/gpt-4o"]);
        // Discovered entry wins over the configured duplicate
        assert!(models[0].has_tag("general"));
        assert!(!models[0].has_tag("reasoning"));
    }

    #[tokio::test]
    async fn test_configured_models_need_a_registered_provider() {
        let mut router = ProviderRouter::new();
        router.register("ollama", Arc::new(MockProvider::echo("local")));

        let configured = vec![
            CapabilityDescriptor::model("openai", "gpt-4o", ["general", "analysis"]),
            CapabilityDescriptor::model("ollama", "qwen2.5-coder", ["code"]),
        ];
        let models = discover_capabilities(&router, &configured).await;

        let names: Vec<String> = models.iter().map(CapabilityDescriptor::qualified_name).collect();
        assert_eq!(names, vec!["ollama/mock", "ollama/qwen2.5-coder"]);
    }
}
