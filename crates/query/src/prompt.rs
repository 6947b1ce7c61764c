use ingest::RetrievalMatch;

/// Answer returned when retrieval finds nothing above the threshold.
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information in your documents to answer this question.";

/// Number each match by its rank, `[1]` being the most similar, separated by blank lines.
pub fn build_context(matches: &[RetrievalMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| format!("[{}] {}", i + 1, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        r#"You are a helpful assistant answering questions about the user's documents.

CONTEXT:
{}

QUESTION: {}

INSTRUCTIONS:
- Answer the question based solely on the context provided above
- If the context doesn't contain enough information to answer the question, say so
- Be concise and accurate

ANSWER:"#,
        context, question
    )
}
