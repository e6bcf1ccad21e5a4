//! Boundary to the language-model collaborator.
//!
//! The gateway never talks to a model directly. Hosts provide an
//! [`LlmClient`]; this module only cleans up what comes back.

use crate::Result;
use crate::models::DatabaseType;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Longest free-text judgement message kept verbatim.
const MAX_JUDGEMENT_MESSAGE_CHARS: usize = 200;

/// What the reviewer gets to see of an executed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReview<'a> {
    /// The natural-language request the SQL was generated for
    pub request: &'a str,
    pub sql: &'a str,
    pub columns: &'a [String],
    pub row_count: usize,
    /// Numbered preview rows with long cells cut short
    pub sample: String,
}

/// A model's verdict on whether a result answers the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultJudgement {
    pub passed: bool,
    pub message: String,
}

impl ResultJudgement {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    /// Interprets a raw model reply.
    ///
    /// The first flat JSON object in the reply wins, read as
    /// `{"passed": bool, "message": string}` with missing fields defaulting
    /// to a pass. Without one, the reply passes unless it says `false`.
    ///
    /// # Example
    /// ```rust
    /// use sqlgate_core::orchestrator::ResultJudgement;
    ///
    /// let judgement = ResultJudgement::parse(
    ///     "Sure:\n```json\n{\"passed\": false, \"message\": \"wrong year\"}\n```",
    /// );
    /// assert!(!judgement.passed);
    /// assert_eq!(judgement.message, "wrong year");
    /// ```
    pub fn parse(raw: &str) -> Self {
        let content = raw.trim();
        if content.is_empty() {
            return Self::passed("Validation completed (empty response)");
        }

        if let Some(object) = json_object_pattern().and_then(|re| re.find(content))
            && let Ok(serde_json::Value::Object(fields)) =
                serde_json::from_str::<serde_json::Value>(object.as_str())
        {
            return Self {
                passed: fields
                    .get("passed")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(true),
                message: fields
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Validation completed")
                    .to_string(),
            };
        }

        Self {
            passed: !content.to_lowercase().contains("false"),
            message: content.chars().take(MAX_JUDGEMENT_MESSAGE_CHARS).collect(),
        }
    }
}

fn json_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{[^{}]*\}").ok())
        .as_ref()
}

fn fence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)```[a-z]*[ \t]*").ok())
        .as_ref()
}

fn select_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\bselect\b").ok())
        .as_ref()
}

/// Extracts the SQL from a model reply.
///
/// Markdown fences are removed and, unless the reply already starts with
/// `SELECT` or `WITH`, any explanation before the first `SELECT` is dropped.
///
/// # Example
/// ```rust
/// use sqlgate_core::orchestrator::strip_code_fences;
///
/// let raw = "Here you go:\n```sql\nSELECT id FROM users;\n```";
/// assert_eq!(strip_code_fences(raw), "SELECT id FROM users;");
/// ```
pub fn strip_code_fences(raw: &str) -> String {
    let unfenced = match fence_pattern() {
        Some(re) => re.replace_all(raw.trim(), "").into_owned(),
        None => raw.replace("```", ""),
    };
    let sql = unfenced.trim();

    let lowered = sql.to_ascii_lowercase();
    if lowered.starts_with("select") || lowered.starts_with("with") {
        return sql.to_string();
    }

    match select_pattern().and_then(|re| re.find(sql)) {
        Some(start) => sql[start.start()..].trim().to_string(),
        None => sql.to_string(),
    }
}

/// A language model that writes SQL and reviews results.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Writes one SQL statement answering `request`.
    ///
    /// `schema_context` is the snapshot rendered by
    /// [`SchemaSnapshot::to_llm_context`](crate::models::SchemaSnapshot::to_llm_context).
    /// The reply may be wrapped in Markdown; it is cleaned with
    /// [`strip_code_fences`] before validation.
    async fn generate_sql(
        &self,
        request: &str,
        schema_context: &str,
        dialect: DatabaseType,
    ) -> Result<String>;

    /// Judges whether an executed query answers its request.
    async fn judge_result(&self, review: &ResultReview<'_>) -> Result<ResultJudgement>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_plain_sql() {
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_strip_fences_with_and_without_language() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```SQL\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_strip_leading_explanation() {
        let raw = "The query you want is:\n\nselect name from users where id = 1";
        assert_eq!(strip_code_fences(raw), "select name from users where id = 1");
    }

    #[test]
    fn test_cte_is_kept_whole() {
        let raw = "```sql\nWITH recent AS (SELECT * FROM orders) SELECT count(*) FROM recent\n```";
        assert_eq!(
            strip_code_fences(raw),
            "WITH recent AS (SELECT * FROM orders) SELECT count(*) FROM recent"
        );
    }

    #[test]
    fn test_reply_without_sql_is_returned_trimmed() {
        assert_eq!(strip_code_fences("  I cannot answer that.  "), "I cannot answer that.");
        assert_eq!(strip_code_fences("```\n```"), "");
    }

    #[test]
    fn test_parse_json_judgement() {
        let judgement = ResultJudgement::parse(r#"{"passed": true, "message": "Looks right"}"#);
        assert_eq!(judgement, ResultJudgement::passed("Looks right"));
    }

    #[test]
    fn test_parse_json_with_missing_fields_defaults_to_pass() {
        let judgement = ResultJudgement::parse(r#"{"message": "ok"}"#);
        assert!(judgement.passed);

        let judgement = ResultJudgement::parse(r#"{"passed": false}"#);
        assert_eq!(judgement, ResultJudgement::failed("Validation completed"));
    }

    #[test]
    fn test_parse_free_text() {
        assert!(ResultJudgement::parse("The result answers the question.").passed);
        assert!(!ResultJudgement::parse("passed: false, the filter is wrong").passed);

        let long = "x".repeat(500);
        assert_eq!(ResultJudgement::parse(&long).message.len(), 200);
    }

    #[test]
    fn test_parse_empty_reply_passes() {
        assert!(ResultJudgement::parse("   ").passed);
    }
}
