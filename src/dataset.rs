//! Question sets for evaluation runs.
//!
//! Supports:
//! - JSON: either `{"name": ..., "questions": [...]}` or a bare array
//! - JSONL: one question object per line
//! - A built-in academic sample set

use crate::error::{EvalError, Result};
use crate::model::QuestionInput;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A named collection of questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    /// Set name.
    pub name: String,
    /// Questions in evaluation order.
    pub questions: Vec<QuestionInput>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonQuestionSet {
    Named {
        name: String,
        questions: Vec<QuestionInput>,
    },
    Bare(Vec<QuestionInput>),
}

impl QuestionSet {
    /// Create a new empty question set.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            questions: Vec::new(),
        }
    }

    pub fn add(&mut self, question: QuestionInput) {
        self.questions.push(question);
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Get a subset of questions (for quick testing).
    pub fn take(&self, n: usize) -> Self {
        Self {
            name: self.name.clone(),
            questions: self.questions.iter().take(n).cloned().collect(),
        }
    }

    /// Load from a file, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("ndjson") => Self::load_jsonl(path),
            _ => Self::load_json(path),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let parsed: JsonQuestionSet = serde_json::from_str(&content).map_err(|e| {
            EvalError::Serialization(format!("Invalid question set {}: {}", path.display(), e))
        })?;

        let set = match parsed {
            JsonQuestionSet::Named { name, questions } => Self { name, questions },
            JsonQuestionSet::Bare(questions) => Self {
                name: file_stem(path),
                questions,
            },
        };
        set.check()?;
        Ok(set)
    }

    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let mut set = Self::new(&file_stem(path));

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let question: QuestionInput = serde_json::from_str(line).map_err(|e| {
                EvalError::Serialization(format!(
                    "Invalid question at {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    e
                ))
            })?;
            set.add(question);
        }

        set.check()?;
        Ok(set)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        fs::write(path, content).map_err(|e| EvalError::io(path, e))
    }

    fn check(&self) -> Result<()> {
        if let Some(pos) = self.questions.iter().position(|q| q.question.trim().is_empty()) {
            return Err(EvalError::Validation(format!(
                "Question {} in set '{}' is empty",
                pos + 1,
                self.name
            )));
        }
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("questions")
        .to_string()
}

/// Academic questions with ground truth, for smoke runs.
pub fn sample_academic_set() -> QuestionSet {
    let mut set = QuestionSet::new("academic-sample");

    set.add(
        QuestionInput::new("What counts as plagiarism in a thesis?").with_ground_truth(
            "Plagiarism is presenting another author's words, ideas or data without attribution, including self-plagiarism of previously submitted work.",
        ),
    );
    set.add(
        QuestionInput::new("How many ECTS credits does a full-time academic year carry?")
            .with_ground_truth("A full-time academic year carries 60 ECTS credits."),
    );
    set.add(
        QuestionInput::new("What is the purpose of peer review?").with_ground_truth(
            "Peer review lets independent experts assess a manuscript's methods, validity and originality before publication.",
        ),
    );
    set.add(
        QuestionInput::new("What is the difference between a literature review and a systematic review?")
            .with_ground_truth(
                "A literature review summarises selected research on a topic, while a systematic review follows a predefined, reproducible search and appraisal protocol.",
            ),
    );
    set.add(QuestionInput::new(
        "Which office handles requests for exam deadline extensions?",
    ));

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_question_set_operations() {
        let mut set = QuestionSet::new("test");
        assert!(set.is_empty());
        set.add(QuestionInput::new("What is a credit?"));
        assert_eq!(set.len(), 1);
        assert_eq!(sample_academic_set().take(2).len(), 2);
    }

    #[test]
    fn test_sample_set() {
        let set = sample_academic_set();
        assert_eq!(set.name, "academic-sample");
        assert!(set.questions.iter().all(|q| !q.question.is_empty()));
        assert!(set.questions.iter().any(|q| q.ground_truth.is_none()));
    }

    #[test]
    fn test_load_named_and_bare_json() {
        let dir = TempDir::new().unwrap();

        let named = dir.path().join("named.json");
        fs::write(
            &named,
            r#"{"name": "exams", "questions": [{"question": "When are exams?", "ground_truth": "June"}]}"#,
        )
        .unwrap();
        let set = QuestionSet::load(&named).unwrap();
        assert_eq!(set.name, "exams");
        assert_eq!(set.questions[0].ground_truth.as_deref(), Some("June"));

        let bare = dir.path().join("bare.json");
        fs::write(
            &bare,
            r#"[{"question": "Q1?"}, {"question": "Q2?", "relevant_chunk_ids": ["c1"]}]"#,
        )
        .unwrap();
        let set = QuestionSet::load(&bare).unwrap();
        assert_eq!(set.name, "bare");
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.questions[1].relevant_chunk_ids,
            Some(vec!["c1".to_string()])
        );
    }

    #[test]
    fn test_load_jsonl_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("set.jsonl");
        fs::write(&path, "{\"question\": \"Q1?\"}\n\n{\"question\": \"Q2?\"}\n").unwrap();
        assert_eq!(QuestionSet::load(&path).unwrap().len(), 2);

        fs::write(&path, "{\"question\": \"Q1?\"}\nnot json\n").unwrap();
        let err = QuestionSet::load(&path).unwrap_err();
        assert!(err.to_string().contains(":2"));
    }

    #[test]
    fn test_rejects_blank_question() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.json");
        fs::write(&path, r#"[{"question": "  "}]"#).unwrap();
        assert!(matches!(
            QuestionSet::load(&path),
            Err(EvalError::Validation(_))
        ));
    }
}
