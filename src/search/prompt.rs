//! Prompt templates for answer generation

use crate::pipeline::ScoredChunk;

pub(crate) const BOOK_PREAMBLE: &str = "You are a helpful assistant that answers questions \
about a book. Prefer the information in the provided context. If the context is not enough \
to answer the question, use your general knowledge.";

pub(crate) const LIBRARY_PREAMBLE: &str = "You are an expert librarian who answers questions \
from the content of several books.\n\
1. Always prefer the information in the provided context\n\
2. If the context is not enough, you may use your general knowledge\n\
3. Mention which books the information comes from when relevant\n\
4. Give complete and well structured answers";

fn context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn book_prompt(question: &str, hits: &[ScoredChunk]) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {question}\nAnswer:",
        context(hits)
    )
}

pub(crate) fn library_prompt(question: &str, hits: &[ScoredChunk], books: usize) -> String {
    format!(
        "Context (taken from {books} different books):\n{}\n\nQuestion: {question}\n\nAnswer:",
        context(hits)
    )
}
