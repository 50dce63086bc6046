//! Judge capability behind the model-judged metrics.
//!
//! [`LexicalJudge`] is deterministic and needs no network; [`LlmJudge`] asks a
//! judge model through any [`Generator`].

use super::domain::{DomainScores, Rubric, RubricSample};
use super::text;
use crate::error::{EvalError, Result};
use crate::llm::{Generator, Prompts};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies the signals the metric formulas consume.
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    /// Break a text into checkable claims.
    async fn extract_claims(&self, text: &str) -> Result<Vec<String>>;

    /// One verdict per claim: entailed by at least one passage.
    async fn verify_claims(&self, claims: &[String], passages: &[String]) -> Result<Vec<bool>>;

    /// One verdict per claim: plausible without any grounding.
    async fn assess_plausibility(&self, question: &str, claims: &[String]) -> Result<Vec<bool>>;

    /// The question an answer appears to respond to.
    async fn reconstruct_question(&self, answer: &str) -> Result<String>;

    /// Semantic similarity in [0, 1].
    async fn similarity(&self, a: &str, b: &str) -> Result<f64>;

    /// One verdict per passage: supports the reference answer.
    async fn relevant_passages(&self, reference: &str, passages: &[String]) -> Result<Vec<bool>> {
        let claims = self.extract_claims(reference).await?;
        let claims = if claims.is_empty() {
            vec![reference.to_string()]
        } else {
            claims
        };

        let mut verdicts = Vec::with_capacity(passages.len());
        for passage in passages {
            let supported = self
                .verify_claims(&claims, std::slice::from_ref(passage))
                .await?;
            verdicts.push(supported.into_iter().any(|v| v));
        }
        Ok(verdicts)
    }

    /// Rubric scores, or `None` when this judge cannot apply rubrics.
    async fn score_rubric(
        &self,
        rubric: &Rubric,
        sample: RubricSample<'_>,
    ) -> Result<Option<DomainScores>>;
}

/// Terms that overstate certainty when nothing grounds the answer.
const ABSOLUTES: &[&str] = &[
    "always", "never", "guaranteed", "definitely", "certainly", "undoubtedly", "proven",
    "every", "everyone", "all",
];

/// Deterministic judge built on term overlap.
#[derive(Debug, Clone)]
pub struct LexicalJudge {
    support_threshold: f64,
}

impl Default for LexicalJudge {
    fn default() -> Self {
        Self {
            support_threshold: 0.5,
        }
    }
}

impl LexicalJudge {
    pub fn new(support_threshold: f64) -> Self {
        Self {
            support_threshold: support_threshold.clamp(0.0, 1.0),
        }
    }

    fn supported_by(&self, claim: &str, passage: &str) -> bool {
        let claim_terms = text::content_terms(claim);
        let passage_terms = text::content_terms(passage);
        if text::coverage(&claim_terms, &passage_terms) < self.support_threshold {
            return false;
        }
        // Figures must be stated in the passage, not merely nearby terms.
        let passage_numbers = text::numbers(passage);
        text::numbers(claim).is_subset(&passage_numbers)
    }
}

#[async_trait]
impl Judge for LexicalJudge {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn extract_claims(&self, text: &str) -> Result<Vec<String>> {
        Ok(text::extract_claims(&text::strip_citations(text)))
    }

    async fn verify_claims(&self, claims: &[String], passages: &[String]) -> Result<Vec<bool>> {
        Ok(claims
            .iter()
            .map(|claim| passages.iter().any(|p| self.supported_by(claim, p)))
            .collect())
    }

    async fn assess_plausibility(&self, question: &str, claims: &[String]) -> Result<Vec<bool>> {
        let question_numbers = text::numbers(question);
        Ok(claims
            .iter()
            .map(|claim| {
                let tokens = text::tokenize(claim);
                let overconfident = tokens.iter().any(|t| ABSOLUTES.contains(&t.as_str()));
                let invented_figures = !text::numbers(claim).is_subset(&question_numbers);
                !overconfident && !invented_figures
            })
            .collect())
    }

    async fn reconstruct_question(&self, answer: &str) -> Result<String> {
        // The leading sentences carry the answer's topic.
        Ok(text::sentences(answer)
            .into_iter()
            .take(2)
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        Ok(text::cosine_similarity(a, b))
    }

    async fn score_rubric(
        &self,
        _rubric: &Rubric,
        _sample: RubricSample<'_>,
    ) -> Result<Option<DomainScores>> {
        Ok(None)
    }
}

/// Judge backed by a language model.
pub struct LlmJudge {
    generator: Arc<dyn Generator>,
    temperature: Option<f32>,
}

impl LlmJudge {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            temperature: Some(0.0),
        }
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let generation = self.generator.generate(prompt, None, self.temperature).await?;
        Ok(generation.text)
    }

    fn parse<T: for<'de> Deserialize<'de>>(response: &str) -> Result<T> {
        let json_str = Self::extract_json(response);
        serde_json::from_str(&json_str).map_err(|e| {
            EvalError::LlmParse(format!(
                "Failed to parse judge response: {}. Response: {}",
                e, response
            ))
        })
    }

    /// Verdict lists must line up with the items they judge.
    fn expect_verdicts(verdicts: Vec<bool>, expected: usize) -> Result<Vec<bool>> {
        if verdicts.len() != expected {
            return Err(EvalError::Judge(format!(
                "Expected {} verdicts, got {}",
                expected,
                verdicts.len()
            )));
        }
        Ok(verdicts)
    }

    /// Extract JSON from response.
    fn extract_json(response: &str) -> String {
        let response = response.trim();

        if response.starts_with("```json") {
            if let Some(end) = response.rfind("```") {
                let start = "```json".len();
                if end > start {
                    return response[start..end].trim().to_string();
                }
            }
        }

        if response.starts_with("```") {
            if let Some(end) = response.rfind("```") {
                let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
                if end > start {
                    return response[start..end].trim().to_string();
                }
            }
        }

        if let Some(start) = response.find('{') {
            if let Some(end) = response.rfind('}') {
                if end > start {
                    return response[start..=end].to_string();
                }
            }
        }

        response.to_string()
    }
}

#[derive(Deserialize)]
struct ClaimsResponse {
    claims: Vec<String>,
}

#[derive(Deserialize)]
struct VerdictsResponse {
    verdicts: Vec<bool>,
}

#[derive(Deserialize)]
struct QuestionResponse {
    question: String,
}

#[derive(Deserialize)]
struct SimilarityResponse {
    similarity: f64,
}

#[async_trait]
impl Judge for LlmJudge {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract_claims(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let prompt = Prompts::extract_claims().replace("{text}", text);
        let raw: ClaimsResponse = Self::parse(&self.ask(&prompt).await?)?;
        Ok(raw
            .claims
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn verify_claims(&self, claims: &[String], passages: &[String]) -> Result<Vec<bool>> {
        if claims.is_empty() {
            return Ok(Vec::new());
        }
        if passages.is_empty() {
            return Ok(vec![false; claims.len()]);
        }
        let prompt = Prompts::verify_claims()
            .replace("{passages}", &Prompts::format_passages(passages))
            .replace("{claims}", &Prompts::format_claims(claims));
        let raw: VerdictsResponse = Self::parse(&self.ask(&prompt).await?)?;
        Self::expect_verdicts(raw.verdicts, claims.len())
    }

    async fn assess_plausibility(&self, question: &str, claims: &[String]) -> Result<Vec<bool>> {
        if claims.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = Prompts::assess_plausibility()
            .replace("{question}", question)
            .replace("{claims}", &Prompts::format_claims(claims));
        let raw: VerdictsResponse = Self::parse(&self.ask(&prompt).await?)?;
        Self::expect_verdicts(raw.verdicts, claims.len())
    }

    async fn reconstruct_question(&self, answer: &str) -> Result<String> {
        let prompt = Prompts::reconstruct_question().replace("{answer}", answer);
        let raw: QuestionResponse = Self::parse(&self.ask(&prompt).await?)?;
        Ok(raw.question)
    }

    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        let prompt = Prompts::semantic_similarity()
            .replace("{a}", a)
            .replace("{b}", b);
        let raw: SimilarityResponse = Self::parse(&self.ask(&prompt).await?)?;
        if !raw.similarity.is_finite() {
            return Err(EvalError::Judge("Similarity is not a number".to_string()));
        }
        Ok(raw.similarity.clamp(0.0, 1.0))
    }

    async fn relevant_passages(&self, reference: &str, passages: &[String]) -> Result<Vec<bool>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = Prompts::relevant_passages()
            .replace("{reference}", reference)
            .replace("{passages}", &Prompts::format_passages(passages));
        let raw: VerdictsResponse = Self::parse(&self.ask(&prompt).await?)?;
        Self::expect_verdicts(raw.verdicts, passages.len())
    }

    async fn score_rubric(
        &self,
        rubric: &Rubric,
        sample: RubricSample<'_>,
    ) -> Result<Option<DomainScores>> {
        let prompt = Prompts::rubric_scoring()
            .replace("{domain}", &rubric.domain)
            .replace("{criteria}", &rubric.describe_criteria())
            .replace("{question}", sample.question)
            .replace("{contexts}", &Prompts::format_passages(sample.contexts))
            .replace("{answer}", sample.answer);
        let raw: HashMap<String, f64> = Self::parse(&self.ask(&prompt).await?)?;
        Ok(Some(DomainScores::from_scores(
            raw.iter().map(|(k, v)| (k.as_str(), *v)),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lexical_verification() {
        let judge = LexicalJudge::default();
        let passages = strings(&["The doctoral program requires 180 credits and a dissertation."]);
        let claims = strings(&[
            "The doctoral program requires a dissertation.",
            "The doctoral program requires 240 credits.",
            "Tuition is waived for teaching assistants.",
        ]);

        let verdicts = judge.verify_claims(&claims, &passages).await.unwrap();
        assert_eq!(verdicts, vec![true, false, false]);
        assert_eq!(
            judge.verify_claims(&claims, &[]).await.unwrap(),
            vec![false, false, false]
        );
    }

    #[tokio::test]
    async fn test_lexical_plausibility() {
        let judge = LexicalJudge::default();
        let claims = strings(&[
            "Peer review evaluates manuscripts before publication.",
            "Peer review always catches fraud.",
            "The journal rejected 4312 submissions last year.",
        ]);
        let verdicts = judge
            .assess_plausibility("What is peer review?", &claims)
            .await
            .unwrap();
        assert_eq!(verdicts, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_lexical_has_no_rubric() {
        let judge = LexicalJudge::default();
        let rubric = Rubric::for_domain("university");
        let sample = RubricSample {
            question: "q",
            answer: "a",
            contexts: &[],
        };
        assert!(judge.score_rubric(&rubric, sample).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_relevant_passages() {
        let judge = LexicalJudge::default();
        let passages = strings(&[
            "Master's students must complete a thesis supervised by faculty.",
            "The cafeteria opens at eight.",
        ]);
        let verdicts = judge
            .relevant_passages("Master's students complete a supervised thesis.", &passages)
            .await
            .unwrap();
        assert_eq!(verdicts, vec![true, false]);
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(
            LlmJudge::extract_json("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(
            LlmJudge::extract_json("Sure! {\"a\": 1} Hope that helps."),
            "{\"a\": 1}"
        );
    }

    #[tokio::test]
    async fn test_llm_judge_parses_responses() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"claims": ["A holds.", " ", "B holds."]}"#,
            r#"```json
{"verdicts": [true, false]}
```"#,
            r#"{"similarity": 1.7}"#,
        ]));
        let judge = LlmJudge::new(generator);

        let claims = judge.extract_claims("A holds. B holds.").await.unwrap();
        assert_eq!(claims, strings(&["A holds.", "B holds."]));

        let verdicts = judge
            .verify_claims(&claims, &strings(&["A holds."]))
            .await
            .unwrap();
        assert_eq!(verdicts, vec![true, false]);

        assert_eq!(judge.similarity("x", "y").await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_llm_judge_rejects_misaligned_verdicts() {
        let generator = Arc::new(ScriptedGenerator::new(vec![r#"{"verdicts": [true]}"#]));
        let judge = LlmJudge::new(generator);
        let result = judge
            .verify_claims(&strings(&["a b", "c d"]), &strings(&["p"]))
            .await;
        assert!(matches!(result, Err(EvalError::Judge(_))));
    }

    #[tokio::test]
    async fn test_llm_judge_rubric() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"academic_rigor": 0.8, "citation_accuracy": 0.5, "terminology_correctness": 0.9}"#,
        ]));
        let judge = LlmJudge::new(generator);
        let rubric = Rubric::for_domain("university");
        let scores = judge
            .score_rubric(
                &rubric,
                RubricSample {
                    question: "q",
                    answer: "a",
                    contexts: &[],
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scores.academic_rigor, Some(0.8));
        assert_eq!(scores.citation_accuracy, Some(0.5));
        assert_eq!(scores.terminology_correctness, Some(0.9));
    }
}
