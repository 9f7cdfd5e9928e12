//! Prompt builders for the four LLM call types.
//!
//! Each call type carries a distinct system prompt so responses can be
//! attributed unambiguously (the scripted stub provider routes on them too).
//! All prompts demand bare JSON; fence-stripping still happens on the way
//! back in because models do not always comply.

use crate::providers::SearchResult;

/// System prompt for topic extraction.
pub const TOPIC_SYSTEM: &str = "You label live conversation windows with a short topic. \
Respond with bare JSON only: {\"topic\": \"...\", \"keywords\": [\"...\"]}.";

/// System prompt for claim selection.
pub const SELECTION_SYSTEM: &str = "You select check-worthy factual claims from a transcript. \
Respond with bare JSON only: {\"selected_claims\": [{\"claim\": \"...\", \"reason\": \"...\"}]}.";

/// System prompt for search-query optimization.
pub const QUERY_SYSTEM: &str = "You turn factual claims into concise web search queries. \
Respond with the query text only, no quotes, no JSON.";

/// System prompt for claim verification.
pub const VERIFY_SYSTEM: &str = "You are a careful fact-checker. Respond with bare JSON only: \
{\"verdict\": \"SUPPORTED\"|\"REFUTED\"|\"UNCERTAIN\", \"confidence\": 0.0-1.0, \
\"explanation\": \"...\", \"key_facts\": [\"...\"]}.";

/// Topic extraction over a window of recent final sentences.
pub fn topic_extraction(window_text: &str) -> String {
    format!(
        "Identify the single topic currently being discussed in this \
conversation excerpt. Give a short topic label (2-5 words, title case) and \
up to 5 lowercase keywords.\n\nExcerpt:\n{window_text}"
    )
}

/// Claim selection over one batch paragraph.
pub fn claim_selection(paragraph: &str, max_claims: usize) -> String {
    format!(
        "From the transcript below, select at most {max_claims} verifiable \
factual claims. Each selected claim must stand alone: a reader should be able \
to search for it without the surrounding conversation. Reject opinions, \
questions, greetings, vague statements, hypotheticals and fragments. \
Selecting nothing is a valid answer (return an empty list).\n\n\
Transcript:\n{paragraph}"
    )
}

/// Reduce one claim to a focused search query.
pub fn query_optimization(claim: &str) -> String {
    format!(
        "Rewrite this claim as a 3-8 word web search query. Keep the key \
entities, numbers and dates; drop filler words.\n\nClaim: {claim}"
    )
}

/// Verification of one claim against retrieved evidence.
pub fn verification(claim: &str, evidence: &[SearchResult]) -> String {
    let mut out = format!("Claim to verify:\n{claim}\n\nEvidence:\n");
    if evidence.is_empty() {
        out.push_str("(no evidence retrieved)\n");
    } else {
        for (i, result) in evidence.iter().enumerate() {
            out.push_str(&format!(
                "[{n}] {title}\n{snippet}\nSource: {url}\n\n",
                n = i + 1,
                title = result.title,
                snippet = result.snippet,
                url = result.url,
            ));
        }
    }
    out.push_str(
        "Judge whether the evidence supports or refutes the claim. If the \
evidence is insufficient or conflicting, the verdict is UNCERTAIN.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_prompt_carries_the_cap() {
        let prompt = claim_selection("Water boils at 100C.", 2);
        assert!(prompt.contains("at most 2"));
        assert!(prompt.contains("Water boils at 100C."));
    }

    #[test]
    fn verification_prompt_numbers_evidence() {
        let evidence = vec![
            SearchResult {
                title: "Apollo 11".into(),
                snippet: "The first crewed Moon landing was in 1969.".into(),
                url: "https://example.org/apollo".into(),
            },
            SearchResult {
                title: "NASA history".into(),
                snippet: "Apollo program overview.".into(),
                url: "https://example.org/nasa".into(),
            },
        ];
        let prompt = verification("The Moon landing occurred in 1969", &evidence);
        assert!(prompt.contains("[1] Apollo 11"));
        assert!(prompt.contains("[2] NASA history"));
        assert!(prompt.contains("https://example.org/apollo"));
    }

    #[test]
    fn verification_prompt_marks_missing_evidence() {
        let prompt = verification("claim", &[]);
        assert!(prompt.contains("(no evidence retrieved)"));
    }
}
