//! Retrieval-augmented generation boundary.
//!
//! The orchestrator retrieves example patterns, renders them into a prompt,
//! and hands that to a [`TextGenerator`]. No concrete generator ships with
//! this crate; callers plug in whatever language-model client they use.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use strudel_patterns::PatternRecord;
use tracing::info;

use crate::error::{Result, RetrievalError};
use crate::searcher::{PatternSearcher, SearchResult};

/// Input handed to a [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully rendered user prompt, examples included.
    pub prompt: String,

    /// The retrieved records the prompt was built from.
    pub examples: Vec<SearchResult>,
}

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce Strudel code for the request. The reply may be wrapped in a
    /// Markdown code fence.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Reference to a retrieved example in a [`Generation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleRef {
    pub id: String,
    pub name: String,
    pub score: f32,
}

impl From<&SearchResult> for ExampleRef {
    fn from(result: &SearchResult) -> Self {
        Self {
            id: result.pattern.id.clone(),
            name: result.pattern.name.clone(),
            score: result.score,
        }
    }
}

/// Generated code plus the context that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub code: String,
    pub examples_used: Vec<ExampleRef>,
    pub prompt: String,
}

/// Retrieval-augmented generation over a [`PatternSearcher`].
pub struct RagOrchestrator {
    searcher: Arc<PatternSearcher>,
    generator: Arc<dyn TextGenerator>,
}

impl RagOrchestrator {
    pub fn new(searcher: Arc<PatternSearcher>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            searcher,
            generator,
        }
    }

    /// Compose new code for a free-text request, grounded on the
    /// `num_examples` closest patterns.
    pub async fn generate(&self, prompt: &str, num_examples: usize) -> Result<Generation> {
        let examples = self.searcher.search(prompt, num_examples, 0.0).await?;

        info!("Generating for {prompt:?} with {} examples", examples.len());
        for example in &examples {
            info!(
                "  [{:.3}] {} - {}",
                example.score, example.pattern.name, example.pattern.mood
            );
        }

        let rendered = format!(
            "Here are some example Strudel patterns for reference:\n\
             {}\n\n\
             Now compose ORIGINAL Strudel code for this request:\n\
             \"{prompt}\"\n\n\
             Use the examples as a reference for valid syntax and available sounds, \
             not as templates to copy. Output only the Strudel code.",
            format_examples(&examples)
        );

        self.run(prompt, rendered, examples).await
    }

    /// Rework an existing pattern according to `instruction`, with
    /// `num_related` similar patterns as extra context.
    pub async fn variation(
        &self,
        pattern_id: &str,
        instruction: &str,
        num_related: usize,
    ) -> Result<Generation> {
        let original = self
            .searcher
            .pattern(pattern_id)
            .cloned()
            .ok_or_else(|| RetrievalError::PatternNotFound(pattern_id.to_string()))?;
        let related = self.searcher.similar_to(pattern_id, num_related).await?;

        let rendered = format!(
            "Here is an original Strudel pattern:\n\n\
             Name: {}\n\
             Description: {}\n\
             Code:\n```\n{}\n```\n\n\
             And some related patterns for inspiration:\n\
             {}\n\n\
             Create a variation of the original pattern that: {instruction}\n\n\
             Keep the core vibe but make it distinctly different. Output only the new Strudel code.",
            original.name,
            original.description,
            original.code,
            format_examples(&related)
        );

        self.run(instruction, rendered, related).await
    }

    async fn run(
        &self,
        prompt: &str,
        rendered: String,
        examples: Vec<SearchResult>,
    ) -> Result<Generation> {
        let examples_used = examples.iter().map(ExampleRef::from).collect();
        let reply = self
            .generator
            .generate(GenerationRequest {
                prompt: rendered,
                examples,
            })
            .await?;

        Ok(Generation {
            code: strip_code_fence(&reply),
            examples_used,
            prompt: prompt.to_string(),
        })
    }
}

/// Render retrieved records as the example block of a prompt.
pub fn format_examples(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| format_example(&result.pattern))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_example(pattern: &PatternRecord) -> String {
    format!(
        "\n---\nName: {}\nDescription: {}\nMood: {}\nTags: {}\nCode:\n```\n{}\n```\n---",
        pattern.name,
        pattern.description,
        pattern.mood,
        pattern.tags.join(", "),
        pattern.code
    )
}

/// Remove a Markdown code fence wrapped around the whole reply, if any.
pub fn strip_code_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|line| line.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use strudel_embeddings::mock::MockFactory;
    use strudel_embeddings::{IndexCache, LazyProvider};
    use strudel_patterns::PatternCorpus;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(format!("```javascript\n// {} examples\ns(\"bd*4\")\n```", request.examples.len()))
        }
    }

    fn record(id: &str, description: &str) -> PatternRecord {
        PatternRecord {
            id: id.to_string(),
            name: format!("{id} name"),
            description: description.to_string(),
            mood: "dark".to_string(),
            tempo: "slow".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            code: format!("note(\"{id}\")"),
        }
    }

    fn orchestrator(temp_dir: &TempDir) -> (RagOrchestrator, Arc<RecordingGenerator>) {
        let corpus = PatternCorpus::from_records([
            record("drone", "deep drone"),
            record("bells", "shimmering bells"),
            record("kick", "hard kick"),
        ])
        .unwrap();
        let searcher = PatternSearcher::new(
            Arc::new(corpus),
            IndexCache::new(temp_dir.path().join("index.json")),
            Arc::new(LazyProvider::new(MockFactory::new(128))),
        );
        let generator = Arc::new(RecordingGenerator::default());
        (
            RagOrchestrator::new(Arc::new(searcher), Arc::clone(&generator) as Arc<dyn TextGenerator>),
            generator,
        )
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```js\ns(\"bd\")\n```"), "s(\"bd\")");
        assert_eq!(strip_code_fence("```\ns(\"bd\")"), "s(\"bd\")");
        assert_eq!(strip_code_fence("  s(\"bd\")\n"), "s(\"bd\")");
    }

    #[test]
    fn test_format_examples() {
        let results = vec![SearchResult {
            pattern: Arc::new(record("drone", "deep drone")),
            score: 0.9,
        }];
        assert_eq!(
            format_examples(&results),
            "\n---\nName: drone name\nDescription: deep drone\nMood: dark\nTags: a, b\nCode:\n```\nnote(\"drone\")\n```\n---"
        );
    }

    #[tokio::test]
    async fn test_generate_uses_retrieved_examples() {
        let temp_dir = TempDir::new().unwrap();
        let (rag, generator) = orchestrator(&temp_dir);

        let generation = rag.generate("deep drone", 2).await.unwrap();
        assert_eq!(generation.code, "// 2 examples\ns(\"bd*4\")");
        assert_eq!(generation.prompt, "deep drone");
        assert_eq!(generation.examples_used.len(), 2);
        assert_eq!(generation.examples_used[0].id, "drone");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Name: drone name"));
        assert!(prompts[0].contains("\"deep drone\""));
    }

    #[tokio::test]
    async fn test_variation_excludes_original_from_context() {
        let temp_dir = TempDir::new().unwrap();
        let (rag, _) = orchestrator(&temp_dir);

        let generation = rag.variation("bells", "make it faster", 5).await.unwrap();
        assert_eq!(generation.examples_used.len(), 2);
        assert!(generation.examples_used.iter().all(|e| e.id != "bells"));
    }

    #[tokio::test]
    async fn test_variation_unknown_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let (rag, _) = orchestrator(&temp_dir);

        let err = rag.variation("nope", "anything", 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PatternNotFound(id) if id == "nope"));
    }
}
