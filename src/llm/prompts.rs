//! LLM prompts for answer generation and judging.
//!
//! Placeholders in braces (`{question}`, `{context}`, ...) are substituted by
//! the caller with `str::replace`.

/// Collection of prompts used by the evaluation engine.
pub struct Prompts;

impl Prompts {
    /// System prompt for the grounded (RAG) path.
    pub fn system_rag_assistant() -> &'static str {
        r#"You are an academic assistant for a university. Answer questions using the provided reference passages. Cite passages with their bracketed number, e.g. [1], when you rely on them. Be precise and use correct academic terminology."#
    }

    /// Additional system instructions applied when guardrails are enabled.
    pub fn system_guardrails() -> &'static str {
        r#"Only state facts that are supported by the provided passages. If the passages do not contain the answer, say that the available sources do not cover the question. Never invent citations, figures, names or dates."#
    }

    /// System prompt for the ungrounded baseline path.
    pub fn system_baseline_assistant() -> &'static str {
        r#"You are an academic assistant for a university. Answer the question precisely using correct academic terminology."#
    }

    /// Answer replacing an empty grounded answer when guardrails are enabled.
    pub fn guardrail_refusal() -> &'static str {
        "The available sources do not cover this question."
    }

    /// Grounded answer prompt.
    pub fn rag_answer() -> &'static str {
        r#"Reference passages:
{context}

Question: {question}

Answer the question based on the reference passages above. Keep the answer concise."#
    }

    /// Ungrounded baseline answer prompt.
    pub fn baseline_answer() -> &'static str {
        r#"Question: {question}

Answer the question. Keep the answer concise."#
    }

    /// Agentic query planning: rewrite the question into a search query.
    pub fn query_planning() -> &'static str {
        r#"You are planning a document search for the question below. Rewrite it as a concise search query containing the key academic terms, synonyms and entities needed to find the answer.

Question: {question}

Return only the search query, nothing else."#
    }

    /// Split a text into atomic factual claims.
    pub fn extract_claims() -> &'static str {
        r#"Break the following text into atomic, self-contained factual claims. Ignore greetings, hedges and questions.

Text:
{text}

Respond in JSON format:
{
    "claims": ["<claim 1>", "<claim 2>"]
}

Respond with only the JSON, no other text."#
    }

    /// Check claims against passages.
    pub fn verify_claims() -> &'static str {
        r#"You are verifying whether claims are supported by reference passages. A claim is supported only if at least one passage states or directly entails it.

Passages:
{passages}

Claims:
{claims}

Respond in JSON format with one verdict per claim, in order:
{
    "verdicts": [true, false]
}

Respond with only the JSON, no other text."#
    }

    /// Check claims for intrinsic plausibility when no grounding exists.
    pub fn assess_plausibility() -> &'static str {
        r#"No reference material is available. For each claim made in answer to the question, judge whether it is plausible and consistent with well-established knowledge. Mark a claim implausible if it contains invented specifics (figures, names, dates) or contradicts common knowledge.

Question: {question}

Claims:
{claims}

Respond in JSON format with one verdict per claim, in order (true = plausible):
{
    "verdicts": [true, false]
}

Respond with only the JSON, no other text."#
    }

    /// Mark which passages are relevant to a reference answer.
    pub fn relevant_passages() -> &'static str {
        r#"For each passage, decide whether it contains information that supports the reference answer.

Reference answer:
{reference}

Passages:
{passages}

Respond in JSON format with one verdict per passage, in order:
{
    "verdicts": [true, false]
}

Respond with only the JSON, no other text."#
    }

    /// Reconstruct the question an answer responds to.
    pub fn reconstruct_question() -> &'static str {
        r#"Given the following answer, write the single question it most directly answers.

Answer:
{answer}

Respond in JSON format:
{
    "question": "<question>"
}

Respond with only the JSON, no other text."#
    }

    /// Semantic similarity between two texts.
    pub fn semantic_similarity() -> &'static str {
        r#"Rate how similar the meaning of the two texts is, from 0.0 (unrelated) to 1.0 (equivalent meaning).

Text A:
{a}

Text B:
{b}

Respond in JSON format:
{
    "similarity": <0.0-1.0>
}

Respond with only the JSON, no other text."#
    }

    /// Score an answer against a domain rubric.
    pub fn rubric_scoring() -> &'static str {
        r#"You are an expert reviewer for the {domain} domain. Score the answer on each criterion from 0.0 (poor) to 1.0 (excellent).

Criteria:
{criteria}

Question: {question}

Reference passages:
{contexts}

Answer:
{answer}

Respond in JSON format, using the criterion names as keys:
{
    "<criterion>": <0.0-1.0>
}

Respond with only the JSON, no other text."#
    }

    /// Number passages as `[1] ...` for prompts and citations.
    pub fn format_passages(passages: &[String]) -> String {
        if passages.is_empty() {
            return "(no passages)".to_string();
        }
        passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] {}", i + 1, p))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Number claims as a list for prompts.
    pub fn format_claims(claims: &[String]) -> String {
        claims
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
