//! Domain rubrics for judge-scored quality metrics.

use serde::{Deserialize, Serialize};

pub const ACADEMIC_RIGOR: &str = "academic_rigor";
pub const CITATION_ACCURACY: &str = "citation_accuracy";
pub const TERMINOLOGY_CORRECTNESS: &str = "terminology_correctness";

/// One scored criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub name: String,
    pub description: String,
}

impl RubricCriterion {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Criteria a judge applies for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub domain: String,
    pub criteria: Vec<RubricCriterion>,
}

impl Rubric {
    /// Select the rubric for a domain label. Unknown labels get the generic
    /// rubric under their own name.
    pub fn for_domain(domain: &str) -> Self {
        let label = domain.trim().to_lowercase();
        let criteria = match label.as_str() {
            "university" | "academic" | "education" => vec![
                RubricCriterion::new(
                    ACADEMIC_RIGOR,
                    "Claims are precise, qualified where uncertain, and reasoned the way a lecturer or published study would.",
                ),
                RubricCriterion::new(
                    CITATION_ACCURACY,
                    "Cited passages actually contain the cited information; no citation points at an unrelated or missing source.",
                ),
                RubricCriterion::new(
                    TERMINOLOGY_CORRECTNESS,
                    "Discipline-specific and institutional terms (degrees, credits, regulations, methods) are used correctly.",
                ),
            ],
            "medicine" | "medical" => vec![
                RubricCriterion::new(
                    ACADEMIC_RIGOR,
                    "Statements follow clinical evidence and flag uncertainty and contraindications.",
                ),
                RubricCriterion::new(
                    CITATION_ACCURACY,
                    "Referenced guidelines or studies support the statements attributed to them.",
                ),
                RubricCriterion::new(
                    TERMINOLOGY_CORRECTNESS,
                    "Anatomical, pharmacological and diagnostic terms are used correctly.",
                ),
            ],
            _ => vec![
                RubricCriterion::new(
                    ACADEMIC_RIGOR,
                    "The answer is precise, well reasoned and avoids unsupported generalisation.",
                ),
                RubricCriterion::new(
                    CITATION_ACCURACY,
                    "Any cited source supports the information attributed to it.",
                ),
                RubricCriterion::new(
                    TERMINOLOGY_CORRECTNESS,
                    "Domain terminology is used correctly.",
                ),
            ],
        };

        Self {
            domain: label,
            criteria,
        }
    }

    pub fn describe_criteria(&self) -> String {
        self.criteria
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What the judge sees when applying a rubric.
#[derive(Debug, Clone, Copy)]
pub struct RubricSample<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub contexts: &'a [String],
}

/// Domain-quality metric group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainScores {
    pub academic_rigor: Option<f64>,
    pub citation_accuracy: Option<f64>,
    pub terminology_correctness: Option<f64>,
}

impl DomainScores {
    /// Build from criterion-name keyed scores, clamping into [0, 1].
    pub fn from_scores<'a>(scores: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut out = DomainScores::default();
        for (name, value) in scores {
            if !value.is_finite() {
                continue;
            }
            let value = Some(value.clamp(0.0, 1.0));
            match name {
                ACADEMIC_RIGOR => out.academic_rigor = value,
                CITATION_ACCURACY => out.citation_accuracy = value,
                TERMINOLOGY_CORRECTNESS => out.terminology_correctness = value,
                _ => {}
            }
        }
        out
    }
}
