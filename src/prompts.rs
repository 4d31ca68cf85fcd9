//! System prompts for the inference calls made by the pipeline.
//!
//! Each prompt resolves in order: environment variable, `prompts/<name>.md`
//! file, built-in default.

use std::path::PathBuf;

use crate::{Error, Result};

/// Inference call kinds issued by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// Entity/relationship extraction from one chunk.
    Extraction,
    /// Condense an extraction into the Entities/Relationships convention.
    SummarizeElements,
    /// Summarize one community description.
    SummarizeCommunities,
    /// Answer the query against one community summary.
    AnswerQuery,
    /// Merge intermediate answers into the final answer.
    CombineAnswers,
}

const EXTRACTION_DEFAULT: &str = "Extract entities and relationships from the following text.";

const SUMMARIZE_ELEMENTS_DEFAULT: &str = "Summarize the extracted entities and relationships in a clear, structured format.

Output format:
Entities:
- Entity1
- Entity2
- Entity3

Relationships:
Entity1 -> relationship_type -> Entity2
Entity3 -> relationship_type -> Entity1

Guidelines:
- List each entity on a separate line with a bullet point or number
- Use arrow notation (A -> relation -> B) for relationships
- Keep entity names consistent throughout
- Include only factual information from the input";

const SUMMARIZE_COMMUNITIES_DEFAULT: &str =
    "Summarize the following community of entities and relationships.";

const ANSWER_QUERY_DEFAULT: &str = "Answer the following query based on the provided summary.";

const COMBINE_ANSWERS_DEFAULT: &str = "Combine these answers into a final, concise response.";

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::Extraction => "extraction.md",
            Prompt::SummarizeElements => "summarize_elements.md",
            Prompt::SummarizeCommunities => "summarize_communities.md",
            Prompt::AnswerQuery => "answer_query.md",
            Prompt::CombineAnswers => "combine_answers.md",
        }
    }

    /// Environment variable overriding the prompt text.
    pub fn env_key(&self) -> &'static str {
        match self {
            Prompt::Extraction => "EXTRACTION_SYSTEM_PROMPT",
            Prompt::SummarizeElements => "SUMMARIZE_ELEMENTS_SYSTEM_PROMPT",
            Prompt::SummarizeCommunities => "SUMMARIZE_COMMUNITIES_SYSTEM_PROMPT",
            Prompt::AnswerQuery => "ANSWER_QUERY_SYSTEM_PROMPT",
            Prompt::CombineAnswers => "COMBINE_ANSWERS_SYSTEM_PROMPT",
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Prompt::Extraction => "extract",
            Prompt::SummarizeElements => "summarize_element",
            Prompt::SummarizeCommunities => "summarize_community",
            Prompt::AnswerQuery => "answer_community",
            Prompt::CombineAnswers => "final_answer",
        }
    }

    pub fn default_text(&self) -> &'static str {
        match self {
            Prompt::Extraction => EXTRACTION_DEFAULT,
            Prompt::SummarizeElements => SUMMARIZE_ELEMENTS_DEFAULT,
            Prompt::SummarizeCommunities => SUMMARIZE_COMMUNITIES_DEFAULT,
            Prompt::AnswerQuery => ANSWER_QUERY_DEFAULT,
            Prompt::CombineAnswers => COMBINE_ANSWERS_DEFAULT,
        }
    }

    /// Load the prompt file only.
    pub fn load(&self) -> Result<String> {
        load_prompt(self.filename())
    }

    /// Resolve the effective system prompt.
    pub fn resolve(&self) -> String {
        if let Ok(text) = std::env::var(self.env_key()) {
            if !text.trim().is_empty() {
                return text;
            }
        }
        self.load()
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.default_text().to_string())
    }
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Prompt directory.
pub fn prompts_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROMPTS_DIR") {
        return PathBuf::from(dir);
    }

    let candidates = [PathBuf::from("prompts"), PathBuf::from("../prompts")];
    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// Resolved system prompts for every call kind, built once per pipeline.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub extraction: String,
    pub summarize_elements: String,
    pub summarize_communities: String,
    pub answer_query: String,
    pub combine_answers: String,
}

impl PromptSet {
    pub fn resolve() -> Self {
        Self {
            extraction: Prompt::Extraction.resolve(),
            summarize_elements: Prompt::SummarizeElements.resolve(),
            summarize_communities: Prompt::SummarizeCommunities.resolve(),
            answer_query: Prompt::AnswerQuery.resolve(),
            combine_answers: Prompt::CombineAnswers.resolve(),
        }
    }

    pub fn get(&self, prompt: Prompt) -> &str {
        match prompt {
            Prompt::Extraction => &self.extraction,
            Prompt::SummarizeElements => &self.summarize_elements,
            Prompt::SummarizeCommunities => &self.summarize_communities,
            Prompt::AnswerQuery => &self.answer_query,
            Prompt::CombineAnswers => &self.combine_answers,
        }
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            extraction: EXTRACTION_DEFAULT.to_string(),
            summarize_elements: SUMMARIZE_ELEMENTS_DEFAULT.to_string(),
            summarize_communities: SUMMARIZE_COMMUNITIES_DEFAULT.to_string(),
            answer_query: ANSWER_QUERY_DEFAULT.to_string(),
            combine_answers: COMBINE_ANSWERS_DEFAULT.to_string(),
        }
    }
}

/// All prompt kinds.
pub fn list_prompts() -> Vec<Prompt> {
    vec![
        Prompt::Extraction,
        Prompt::SummarizeElements,
        Prompt::SummarizeCommunities,
        Prompt::AnswerQuery,
        Prompt::CombineAnswers,
    ]
}

/// User content for one community summarization call.
pub fn community_content(entities: &[String], relationships: &[String]) -> String {
    format!(
        "Entities: {}\nRelationships: {}",
        entities.join(", "),
        relationships.join(", ")
    )
}

/// User content for one intermediate answer call.
pub fn answer_content(query: &str, summary: &str) -> String {
    format!("Query: {}\n\nSummary: {}", query, summary)
}

/// User content for the combine call.
pub fn combine_content(intermediate_answers: &[String]) -> String {
    format!("Intermediate answers: {:?}", intermediate_answers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompt_filenames_are_md() {
        for prompt in list_prompts() {
            assert!(
                prompt.filename().ends_with(".md"),
                "Prompt {:?} should have .md extension",
                prompt
            );
        }
    }

    #[test]
    fn test_env_keys_are_distinct() {
        let mut keys: Vec<&str> = list_prompts().iter().map(|p| p.env_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_element_prompt_carries_output_convention() {
        let text = Prompt::SummarizeElements.default_text();
        assert!(text.contains("Entities:"));
        assert!(text.contains("Relationships:"));
        assert!(text.contains("Entity1 -> relationship_type -> Entity2"));
    }

    #[test]
    fn test_load_prompt_nonexistent_file() {
        let result = load_prompt("nonexistent_file_12345.md");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_set_matches_defaults() {
        let set = PromptSet::default();
        for prompt in list_prompts() {
            assert_eq!(set.get(prompt), prompt.default_text());
        }
    }

    #[test]
    fn test_community_content_format() {
        let content = community_content(
            &["Alice".to_string(), "Acme".to_string()],
            &["Alice -> works_at -> Acme".to_string()],
        );
        assert_eq!(
            content,
            "Entities: Alice, Acme\nRelationships: Alice -> works_at -> Acme"
        );
    }

    #[test]
    fn test_answer_content_format() {
        assert_eq!(
            answer_content("who?", "Alice works at Acme"),
            "Query: who?\n\nSummary: Alice works at Acme"
        );
    }

    #[test]
    fn test_combine_content_lists_answers() {
        let content = combine_content(&["a".to_string(), "b".to_string()]);
        assert!(content.starts_with("Intermediate answers: ["));
        assert!(content.contains("\"a\""));
        assert!(content.contains("\"b\""));
    }
}
