//! Prompt assembly.
//!
//! Joins retrieved chunk texts into one context block and interpolates it,
//! together with the raw question, into a template with two named slots:
//! `{context}` and `{question}`. Substitution is a single pass over the
//! parsed template, so slot markers that appear inside chunk text or the
//! question are never expanded.
//!
//! When the rendered prompt would exceed the configured character limit,
//! whole chunks are dropped from the end (least relevant first) until it
//! fits. The question is never truncated and a chunk is never cut.

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Grounded-answer template used unless the configuration supplies one.
pub const DEFAULT_TEMPLATE: &str = "Use the following context to answer the question about health topics.\n\nContext: {context}\n\nQuestion: {question}\n\nPlease provide a clear, accurate answer based on the provided context. If the context doesn't contain enough information to answer the question, say so.";

/// Separator placed between consecutive chunk texts.
pub const CHUNK_SEPARATOR: &str = "\n\n";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A parsed template with both slots present.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template, failing with a configuration error unless both
    /// `{context}` and `{question}` occur at least once.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;

        loop {
            let next = [(CONTEXT_SLOT, Segment::Context), (QUESTION_SLOT, Segment::Question)]
                .into_iter()
                .filter_map(|(slot, seg)| rest.find(slot).map(|pos| (pos, slot.len(), seg)))
                .min_by_key(|(pos, _, _)| *pos);

            match next {
                Some((pos, len, seg)) => {
                    if pos > 0 {
                        segments.push(Segment::Literal(rest[..pos].to_string()));
                    }
                    segments.push(seg);
                    rest = &rest[pos + len..];
                }
                None => {
                    if !rest.is_empty() {
                        segments.push(Segment::Literal(rest.to_string()));
                    }
                    break;
                }
            }
        }

        for (slot, seg) in [(CONTEXT_SLOT, Segment::Context), (QUESTION_SLOT, Segment::Question)] {
            if !segments.contains(&seg) {
                return Err(RagError::config(format!(
                    "prompt template is missing the {} slot",
                    slot
                )));
            }
        }

        Ok(Self { segments })
    }

    fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }

    /// Rendered length in characters, without rendering.
    fn rendered_len(&self, context_len: usize, question_len: usize) -> usize {
        self.segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(s) => s.chars().count(),
                Segment::Context => context_len,
                Segment::Question => question_len,
            })
            .sum()
    }
}

/// An assembled prompt and which of the offered chunks made it in.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    /// Positions, in the input slice, of the chunks placed in the context.
    pub used: Vec<usize>,
}

/// Builds bounded prompts from ranked chunks.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: PromptTemplate,
    max_chars: usize,
}

impl PromptAssembler {
    pub fn new(template: &str, max_chars: usize) -> Result<Self> {
        Ok(Self {
            template: PromptTemplate::parse(template)?,
            max_chars,
        })
    }

    /// Assemble a prompt from chunks in rank order, dropping trailing chunks
    /// until it fits.
    ///
    /// # Errors
    ///
    /// [`RagError::ContextTooLarge`] when the template and question alone
    /// exceed the limit.
    pub fn assemble(&self, chunks: &[Chunk], question: &str) -> Result<Prompt> {
        let (positions, texts): (Vec<usize>, Vec<&str>) = chunks
            .iter()
            .map(|c| c.text.trim())
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .unzip();
        let question_len = question.chars().count();

        // Context length for each prefix of `texts`.
        let mut context_len = 0usize;
        let mut prefix_lens = vec![0usize];
        for (i, t) in texts.iter().enumerate() {
            if i > 0 {
                context_len += CHUNK_SEPARATOR.len();
            }
            context_len += t.chars().count();
            prefix_lens.push(context_len);
        }

        let fitting = (0..=texts.len())
            .rev()
            .find(|&k| self.template.rendered_len(prefix_lens[k], question_len) <= self.max_chars);

        match fitting {
            Some(k) => {
                if k < texts.len() {
                    tracing::debug!(
                        dropped = texts.len() - k,
                        limit = self.max_chars,
                        "dropped chunks to fit prompt limit"
                    );
                }
                let context = texts[..k].join(CHUNK_SEPARATOR);
                Ok(Prompt {
                    text: self.template.render(&context, question),
                    used: positions[..k].to_vec(),
                })
            }
            None => Err(RagError::ContextTooLarge {
                required: self.template.rendered_len(0, question_len),
                limit: self.max_chars,
            }),
        }
    }
}

/// Assemble `chunks` and `question` into `template` with no length limit.
pub fn assemble(chunks: &[Chunk], question: &str, template: &str) -> Result<String> {
    PromptAssembler::new(template, usize::MAX)?
        .assemble(chunks, question)
        .map(|p| p.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: String::new(),
            document_id: "doc".into(),
            source: "test.txt".into(),
            page: None,
            chunk_index: 0,
            start: 0,
            end: text.chars().count(),
            text: text.into(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_exact_format() {
        let out = assemble(
            &[chunk("A"), chunk("B")],
            "Q?",
            "Context: {context}\nQuestion: {question}",
        )
        .unwrap();
        assert_eq!(out, "Context: A\n\nB\nQuestion: Q?");
    }

    #[test]
    fn test_chunks_are_trimmed_in_rank_order() {
        let out = assemble(
            &[chunk("Health is wealth.\n\n"), chunk("  WHO defines health broadly.")],
            "What is health?",
            "{context}|{question}",
        )
        .unwrap();
        assert_eq!(
            out,
            "Health is wealth.\n\nWHO defines health broadly.|What is health?"
        );
    }

    #[test]
    fn test_no_chunks_leaves_empty_context() {
        let out = assemble(&[], "Q?", "Context: {context}\nQuestion: {question}").unwrap();
        assert_eq!(out, "Context: \nQuestion: Q?");
    }

    #[test]
    fn test_slot_markers_in_content_not_expanded() {
        let out = assemble(&[chunk("see {question}")], "{context}?", "{context} / {question}")
            .unwrap();
        assert_eq!(out, "see {question} / {context}?");
    }

    #[test]
    fn test_missing_slot_is_configuration_error() {
        let err = PromptTemplate::parse("Question: {question}").unwrap_err();
        assert!(err.is_fatal());
        assert!(PromptTemplate::parse("Context: {context}").is_err());
        assert!(PromptTemplate::parse(DEFAULT_TEMPLATE).is_ok());
    }

    #[test]
    fn test_drops_least_relevant_chunks_to_fit() {
        // "C: " + "{context}" + " Q: " + "?" ; literals are 7 chars.
        let asm = PromptAssembler::new("C: {context} Q: {question}", 7 + 1 + 10).unwrap();
        let chunks = [chunk("aaaa"), chunk("bbbb"), chunk("cccc")];
        let prompt = asm.assemble(&chunks, "?").unwrap();
        assert_eq!(prompt.used, vec![0, 1]);
        assert_eq!(prompt.text, "C: aaaa\n\nbbbb Q: ?");
    }

    #[test]
    fn test_question_alone_too_large() {
        let asm = PromptAssembler::new("C: {context} Q: {question}", 10).unwrap();
        let err = asm.assemble(&[chunk("a")], "a very long question").unwrap_err();
        match err {
            RagError::ContextTooLarge { required, limit } => {
                assert_eq!(required, 7 + 20);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_chunks_skipped_and_positions_kept() {
        let asm = PromptAssembler::new("{context}|{question}", 1000).unwrap();
        let chunks = [chunk("first"), chunk("\n\n  \n"), chunk("second")];
        let prompt = asm.assemble(&chunks, "Q?").unwrap();
        assert_eq!(prompt.text, "first\n\nsecond|Q?");
        assert_eq!(prompt.used, vec![0, 2]);
    }

    #[test]
    fn test_zero_chunks_fit_but_none_of_the_chunks() {
        let asm = PromptAssembler::new("{context}{question}", 3).unwrap();
        let prompt = asm.assemble(&[chunk("long chunk")], "Q?").unwrap();
        assert!(prompt.used.is_empty());
        assert_eq!(prompt.text, "Q?");
    }
}
