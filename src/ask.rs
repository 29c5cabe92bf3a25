//! Query pipeline: question → retrieval → prompt → answer.
//!
//! [`QueryPipeline`] is built once per session from [`Config`]. Building it
//! is where fatal problems surface (missing API key, unknown provider, bad
//! template). After that, [`QueryPipeline::answer`] never fails: embedding,
//! search, prompt-size, and generation errors for one question become an
//! error-carrying [`Answer`] and do not affect later questions.
//!
//! The module also hosts the `hrag ask` and `hrag chat` commands.

use anyhow::bail;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{check_generation_params, Config};
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::generate::{create_generator, Answer, AnswerGenerator};
use crate::index::SqliteIndex;
use crate::models::SearchHit;
use crate::prompt::PromptAssembler;
use crate::retrieve::Retriever;
use crate::retry::RetryPolicy;

/// Per-question overrides of the configured generation settings.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub model: Option<String>,
    pub k: Option<usize>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Generation settings used when a question does not override them.
#[derive(Debug, Clone)]
pub struct GenerationDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Result of answering one question.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: Answer,
    /// Chunks that made it into the prompt, best first.
    pub sources: Vec<SearchHit>,
    /// Set when the failure is a configuration problem that will repeat for
    /// every question (e.g. an embedder that does not match the collection).
    pub fatal: bool,
}

impl AskOutcome {
    fn failed(err: RagError) -> Self {
        Self {
            fatal: err.is_fatal(),
            answer: Answer::from(err),
            sources: Vec::new(),
        }
    }
}

pub struct QueryPipeline {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: AnswerGenerator,
    defaults: GenerationDefaults,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: AnswerGenerator,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            defaults,
        }
    }

    /// Build the pipeline over the SQLite index named in `config`.
    ///
    /// Credentials are checked here, before any question is taken.
    pub async fn from_config(config: &Config) -> crate::error::Result<Self> {
        let gen = &config.generation;
        let backend = create_generator(gen)?;
        let embedder = create_embedder(&config.embedding)?;
        let assembler = PromptAssembler::new(&gen.prompt_template, gen.max_prompt_chars)?;
        let index = SqliteIndex::connect(&config.db).await?;

        let retriever = Retriever::new(
            Arc::new(index),
            embedder,
            config.retrieval.collection.clone(),
            config.retrieval.top_k,
        );
        let generator = AnswerGenerator::new(backend)
            .with_retry(RetryPolicy::new(gen.max_retries))
            .with_timeout(Duration::from_secs(gen.timeout_secs));

        Ok(Self::new(
            retriever,
            assembler,
            generator,
            GenerationDefaults {
                model: gen.model.clone(),
                temperature: gen.temperature,
                max_tokens: gen.max_tokens,
            },
        ))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer one question. Never fails; see [`AskOutcome`].
    pub async fn answer(&self, question: &str, options: &AskOptions) -> AskOutcome {
        let question = question.trim();
        if question.is_empty() {
            return AskOutcome {
                answer: Answer::Failed {
                    reason: "question is empty".to_string(),
                },
                sources: Vec::new(),
                fatal: false,
            };
        }

        let k = options.k.unwrap_or(self.retriever.k());
        let model = options.model.as_deref().unwrap_or(&self.defaults.model);
        let temperature = options.temperature.unwrap_or(self.defaults.temperature);
        let max_tokens = options.max_tokens.unwrap_or(self.defaults.max_tokens);

        if k == 0 {
            return AskOutcome::failed(RagError::config("k must be >= 1"));
        }
        if let Err(e) = check_generation_params(temperature, max_tokens) {
            return AskOutcome::failed(e);
        }

        let hits = match self.retriever.retrieve_scored(question, k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    collection = self.retriever.collection(),
                    error = %e,
                    "retrieval failed"
                );
                return AskOutcome::failed(e);
            }
        };

        let chunks: Vec<_> = hits.iter().map(|h| h.chunk.clone()).collect();
        let prompt = match self.assembler.assemble(&chunks, question) {
            Ok(p) => p,
            Err(e) => return AskOutcome::failed(e),
        };

        tracing::info!(
            backend = self.generator.backend_name(),
            model,
            retrieved = hits.len(),
            used = prompt.used.len(),
            prompt_chars = prompt.text.chars().count(),
            "generating answer"
        );

        let answer = self
            .generator
            .generate(&prompt.text, model, temperature, max_tokens)
            .await;

        let sources = prompt.used.iter().filter_map(|&i| hits.get(i).cloned()).collect();
        AskOutcome {
            answer,
            sources,
            fatal: false,
        }
    }
}

fn print_outcome(outcome: &AskOutcome, show_sources: bool) {
    println!("{}", outcome.answer);
    if show_sources && !outcome.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, hit) in outcome.sources.iter().enumerate() {
            println!(
                "  {}. [{:.3}] {}  (chunk {})",
                i + 1,
                hit.score,
                hit.chunk.citation(),
                hit.chunk.chunk_index
            );
        }
    }
}

/// Run `hrag ask`: answer one question and print it.
///
/// A per-question failure is printed as the answer (`Error: ...`); only
/// configuration problems produce a failing exit status.
pub async fn run_ask(
    config: &Config,
    question: &str,
    options: &AskOptions,
    show_sources: bool,
) -> anyhow::Result<()> {
    let pipeline = QueryPipeline::from_config(config).await?;
    let outcome = pipeline.answer(question, options).await;
    print_outcome(&outcome, show_sources);
    if outcome.fatal {
        bail!("configuration error; aborting");
    }
    Ok(())
}

/// Run `hrag chat`: answer questions read line by line from stdin.
///
/// Each question is independent; the only session state is the display log
/// used for the closing summary. Type `exit` or `quit`, or close stdin, to
/// end the session.
pub async fn run_chat(
    config: &Config,
    options: &AskOptions,
    show_sources: bool,
) -> anyhow::Result<()> {
    let pipeline = QueryPipeline::from_config(config).await?;
    let mut log: Vec<(String, Answer)> = Vec::new();

    println!(
        "Ask a health question (collection '{}'); 'exit' to quit.",
        pipeline.retriever().collection()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let outcome = pipeline.answer(question, options).await;
        print_outcome(&outcome, show_sources);
        println!();

        let fatal = outcome.fatal;
        log.push((question.to_string(), outcome.answer));
        if fatal {
            bail!("configuration error; ending session");
        }
    }

    let failed = log.iter().filter(|(_, a)| a.is_error()).count();
    println!(
        "Session: {} question(s), {} answered, {} failed.",
        log.len(),
        log.len() - failed,
        failed
    );
    Ok(())
}
