use anyhow::Context;
use bid_rag_core::{
    build_embedder, build_index_from_folder, open_index, AgentConfig, Answer, AnswerOrchestrator,
    IndexBackend, IngestionOptions, LopdfExtractor, Passage, RetrievalOptions, SearchStrategy,
    DEFAULT_API_BASE, DEFAULT_DB_PATH, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL_NAME,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(name = "bid-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the local vector index
    #[arg(long, env = "BID_RAG_DB_PATH", default_value = DEFAULT_DB_PATH, global = true)]
    db_path: PathBuf,

    /// Where vectors are stored
    #[arg(long, value_enum, default_value = "local", global = true)]
    backend: BackendArg,

    /// Qdrant base URL, used with `--backend qdrant`
    #[arg(long, default_value = "http://localhost:6333", global = true)]
    qdrant_url: String,

    /// Chat model name
    #[arg(long, env = "BID_RAG_MODEL", default_value = DEFAULT_MODEL_NAME, global = true)]
    model: String,

    /// Embedding model name; `char-trigram` selects the offline embedder
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, default_value = DEFAULT_API_BASE, global = true)]
    api_base: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Passages handed to the generator
    #[arg(long, default_value = "10", global = true)]
    k: usize,

    /// Candidates fetched before diversity re-ranking
    #[arg(long, default_value = "30", global = true)]
    fetch_k: usize,

    /// Relevance/diversity trade-off for MMR, 0.0 to 1.0
    #[arg(long, default_value = "0.6", global = true)]
    lambda: f32,

    #[arg(long, value_enum, default_value = "mmr", global = true)]
    strategy: StrategyArg,

    /// Seconds allowed for each outbound call
    #[arg(long, default_value = "60", global = true)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Similarity,
    Mmr,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the vector index from a folder of PDFs.
    Ingest {
        /// Folder that directly contains the PDFs.
        #[arg(long, default_value = "./data/raw/100_PDF")]
        folder: PathBuf,
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
    },
    /// Answer a single question.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Interactive question loop; `exit` or end of input quits.
    Chat,
    /// Answer every question of a JSON file and print evaluation records.
    Evaluate {
        /// JSON array of `{"question", "ground_truth"}` objects.
        #[arg(long)]
        questions: PathBuf,
        /// Write the records here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            db_path: self.db_path.clone(),
            index_backend: match self.backend {
                BackendArg::Local => IndexBackend::Local,
                BackendArg::Qdrant => IndexBackend::Qdrant,
            },
            qdrant_url: self.qdrant_url.clone(),
            model_name: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            retrieval: RetrievalOptions {
                strategy: match self.strategy {
                    StrategyArg::Similarity => SearchStrategy::Similarity,
                    StrategyArg::Mmr => SearchStrategy::Mmr,
                },
                k: self.k,
                fetch_k: self.fetch_k,
                lambda_mult: self.lambda,
            },
            call_timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Deserialize)]
struct EvaluationQuestion {
    question: String,
    #[serde(default)]
    ground_truth: Option<String>,
}

#[derive(Debug, Serialize)]
struct EvaluationRow {
    question: String,
    answer: String,
    contexts: Vec<String>,
    ground_truth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

/// One entry of the chat history; only assistant turns carry passages.
#[derive(Debug)]
struct ConversationTurn {
    role: Role,
    content: String,
    supporting_passages: Vec<Passage>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.agent_config();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "bid-rag boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            chunk_size,
            chunk_overlap,
        } => {
            config.validate()?;
            let options = IngestionOptions {
                chunk_size,
                chunk_overlap,
                ..IngestionOptions::default()
            };
            let embedder = build_embedder(&config)?;
            let index = open_index(&config).await?;

            let summary =
                build_index_from_folder(&folder, &options, &LopdfExtractor, &*embedder, &*index)
                    .await
                    .with_context(|| format!("failed to index {}", folder.display()))?;

            for skipped in &summary.skipped_files {
                warn!(path = %skipped.path.display(), kind = ?skipped.kind, reason = %skipped.reason, "skipped pdf");
            }
            println!(
                "{} pages, {} chunks indexed ({} files skipped) at {}",
                summary.pages,
                summary.index.indexed,
                summary.skipped_files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask { question } => {
            let orchestrator = AnswerOrchestrator::connect(&config).await?;
            let answer = orchestrator.answer(&question).await?;
            print_answer(&answer.text, &answer.passages);
        }
        Command::Chat => {
            let orchestrator = AnswerOrchestrator::connect(&config).await?;
            chat(&orchestrator).await?;
        }
        Command::Evaluate { questions, output } => {
            let raw = tokio::fs::read_to_string(&questions)
                .await
                .with_context(|| format!("failed to read {}", questions.display()))?;
            let items: Vec<EvaluationQuestion> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON question list", questions.display()))?;

            let orchestrator = AnswerOrchestrator::connect(&config).await?;
            let rows = evaluate_questions(&orchestrator, items).await;
            let failed = rows.iter().filter(|row| row.error.is_some()).count();
            if failed > 0 {
                warn!(failed, total = rows.len(), "some questions could not be answered");
            }

            let rendered = serde_json::to_string_pretty(&rows)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("{} records written to {}", rows.len(), path.display());
                }
                None => println!("{rendered}"),
            }
        }
    }

    Ok(())
}

/// Answers every question; a failed question becomes a row carrying its error.
async fn evaluate_questions(
    orchestrator: &AnswerOrchestrator,
    items: Vec<EvaluationQuestion>,
) -> Vec<EvaluationRow> {
    let total = items.len();
    let mut rows = Vec::with_capacity(total);
    for (position, item) in items.into_iter().enumerate() {
        info!(current = position + 1, total, "evaluating question");
        let row = match orchestrator.ask_with_context(&item.question).await {
            Ok(record) => EvaluationRow {
                question: record.question,
                answer: record.answer,
                contexts: record.contexts,
                ground_truth: item.ground_truth,
                error: None,
            },
            Err(error) => {
                warn!(question = %item.question, %error, "question failed");
                EvaluationRow {
                    question: item.question,
                    answer: String::new(),
                    contexts: Vec::new(),
                    ground_truth: item.ground_truth,
                    error: Some(error.to_string()),
                }
            }
        };
        rows.push(row);
    }
    rows
}

async fn chat(orchestrator: &AnswerOrchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut history: Vec<ConversationTurn> = Vec::new();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }
        if question == "history" {
            for line in history_lines(&history) {
                println!("{line}");
            }
            continue;
        }

        match orchestrator.answer(question).await {
            Ok(answer) => print_turn(record_exchange(&mut history, question, answer)),
            Err(error) => warn!(%error, "question failed"),
        }
    }

    info!(turns = history.len(), "chat ended");
    Ok(())
}

/// Appends the question and its answer, returning the assistant turn.
fn record_exchange<'a>(
    history: &'a mut Vec<ConversationTurn>,
    question: &str,
    answer: Answer,
) -> &'a ConversationTurn {
    history.push(ConversationTurn {
        role: Role::User,
        content: question.to_string(),
        supporting_passages: Vec::new(),
    });
    history.push(ConversationTurn {
        role: Role::Assistant,
        content: answer.text,
        supporting_passages: answer.passages,
    });
    &history[history.len() - 1]
}

fn history_lines(history: &[ConversationTurn]) -> Vec<String> {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            let sources = group_by_source(&turn.supporting_passages)
                .into_iter()
                .map(|(source, _)| source)
                .collect::<Vec<_>>();
            if sources.is_empty() {
                format!("{speaker}: {}", preview(&turn.content))
            } else {
                format!("{speaker}: {} [{}]", preview(&turn.content), sources.join(", "))
            }
        })
        .collect()
}

fn print_turn(turn: &ConversationTurn) {
    print_answer(&turn.content, &turn.supporting_passages);
}

fn print_answer(text: &str, passages: &[Passage]) {
    println!("{text}");
    for (source, passages) in group_by_source(passages) {
        println!("\n[{source}]");
        for passage in passages {
            println!("  (p.{}) {}", passage.page, preview(&passage.text));
        }
    }
}

/// Groups passages by source document, keeping first-seen order.
fn group_by_source(passages: &[Passage]) -> Vec<(&str, Vec<&Passage>)> {
    let mut groups: Vec<(&str, Vec<&Passage>)> = Vec::new();
    for passage in passages {
        match groups
            .iter_mut()
            .find(|(source, _)| *source == passage.source)
        {
            Some((_, members)) => members.push(passage),
            None => groups.push((passage.source.as_str(), vec![passage])),
        }
    }
    groups
}

fn preview(text: &str) -> String {
    let mut shown: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        shown.push_str("...");
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bid_rag_core::{
        CharacterNgramEmbedder, IndexedVector, LanguageModel, QueryError, Retriever, ScoredVector,
        VectorIndex,
    };
    use bid_rag_core::fallback::OFF_TOPIC_FALLBACK;
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails on any prompt mentioning an outage; otherwise routes off-topic.
    struct FlakyModel;

    #[async_trait]
    impl LanguageModel for FlakyModel {
        async fn complete(&self, prompt: &str) -> Result<String, QueryError> {
            if prompt.contains("장애") {
                return Err(QueryError::BackendResponse {
                    backend: "chat".to_string(),
                    details: "503 Service Unavailable".to_string(),
                });
            }
            Ok("off-topic".to_string())
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl VectorIndex for EmptyIndex {
        async fn exists(&self) -> Result<bool, QueryError> {
            Ok(false)
        }

        async fn destroy(&self) -> Result<(), QueryError> {
            Ok(())
        }

        async fn create(&self, _dimensions: usize, _model: &str) -> Result<(), QueryError> {
            Ok(())
        }

        async fn upsert(&self, _vectors: &[IndexedVector]) -> Result<(), QueryError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _limit: usize,
        ) -> Result<Vec<ScoredVector>, QueryError> {
            Ok(Vec::new())
        }
    }

    fn question(text: &str, ground_truth: &str) -> EvaluationQuestion {
        EvaluationQuestion {
            question: text.to_string(),
            ground_truth: Some(ground_truth.to_string()),
        }
    }

    #[tokio::test]
    async fn failed_question_is_recorded_and_the_batch_continues() -> anyhow::Result<()> {
        let retriever = Retriever::new(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(EmptyIndex),
            RetrievalOptions::default(),
        )?;
        let orchestrator =
            AnswerOrchestrator::new(Arc::new(FlakyModel), retriever, Duration::from_secs(5));

        let rows = evaluate_questions(
            &orchestrator,
            vec![
                question("장애 상황의 입찰 일정은?", "unknown"),
                question("좋아하는 음식은?", "refusal"),
            ],
        )
        .await;

        assert_eq!(rows.len(), 2);
        assert!(rows[0].error.as_deref().is_some_and(|error| error.contains("503")));
        assert!(rows[0].answer.is_empty());
        assert_eq!(rows[0].ground_truth.as_deref(), Some("unknown"));
        assert_eq!(rows[1].error, None);
        assert_eq!(rows[1].answer, OFF_TOPIC_FALLBACK);

        let rendered = serde_json::to_value(&rows)?;
        assert!(rendered[0].get("error").is_some());
        assert!(rendered[1].get("error").is_none());
        Ok(())
    }

    #[test]
    fn exchanges_become_user_and_assistant_turns() {
        let mut history = Vec::new();
        let answer = Answer {
            text: "352,000,000원입니다.".to_string(),
            passages: vec![passage("venture.pdf", "소요 예산: 352,000,000원")],
        };

        let turn = record_exchange(&mut history, "소요 예산은?", answer);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.supporting_passages.len(), 1);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "소요 예산은?");
        assert!(history[0].supporting_passages.is_empty());
        assert_eq!(
            history_lines(&history),
            vec![
                "you: 소요 예산은?".to_string(),
                "assistant: 352,000,000원입니다. [venture.pdf]".to_string(),
            ]
        );
    }

    fn passage(source: &str, text: &str) -> Passage {
        Passage {
            text: text.to_string(),
            source: source.to_string(),
            page: 1,
        }
    }

    #[test]
    fn passages_group_by_source_in_first_seen_order() {
        let passages = vec![
            passage("b.pdf", "one"),
            passage("a.pdf", "two"),
            passage("b.pdf", "three"),
        ];
        let groups = group_by_source(&passages);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b.pdf");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "a.pdf");
    }

    #[test]
    fn preview_truncates_long_text_on_char_boundaries() {
        let long = "가".repeat(PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("짧은 문장"), "짧은 문장");
    }

    #[test]
    fn cli_flags_map_onto_agent_config() {
        let cli = Cli::parse_from([
            "bid-rag",
            "--strategy",
            "similarity",
            "--k",
            "4",
            "ask",
            "--question",
            "소요 예산은?",
        ]);
        let config = cli.agent_config();
        assert_eq!(config.retrieval.strategy, SearchStrategy::Similarity);
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.index_backend, IndexBackend::Local);
    }
}
