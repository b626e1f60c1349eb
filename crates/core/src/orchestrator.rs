use crate::config::{AgentConfig, IndexBackend};
use crate::embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder};
use crate::fallback::{FallbackReason, FallbackResponder};
use crate::generator::{is_refusal, AnswerGenerator};
use crate::grader::grade;
use crate::llm::{LanguageModel, OpenAiChatModel};
use crate::retriever::Retriever;
use crate::router::QueryRouter;
use crate::stores::{LocalIndexStore, QdrantStore};
use crate::traits::VectorIndex;
use crate::{Answer, EvaluationRecord, Passage, QueryError, Relevance};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Route,
    Retrieve,
    Grade,
    Generate,
    Fallback,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::Route => "route",
            Node::Retrieve => "retrieve",
            Node::Grade => "grade",
            Node::Generate => "generate",
            Node::Fallback => "fallback",
        }
    }
}

/// Per-question record threaded through the nodes and dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphState {
    pub question: String,
    pub context: Vec<Passage>,
    pub answer: Option<String>,
    pub relevance: Option<Relevance>,
    pub fallback: Option<FallbackReason>,
}

impl GraphState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: Vec::new(),
            answer: None,
            relevance: None,
            fallback: None,
        }
    }

    fn context_texts(&self) -> Vec<String> {
        self.context.iter().map(|passage| passage.text.clone()).collect()
    }
}

pub const ENTRY: Node = Node::Route;

/// Where to go after `node` ran; `None` once a terminal node has run.
pub fn next_node(node: Node, state: &GraphState) -> Option<Node> {
    let passed = state.relevance == Some(Relevance::Yes);
    match node {
        Node::Route if passed => Some(Node::Retrieve),
        Node::Route => Some(Node::Fallback),
        Node::Retrieve => Some(Node::Grade),
        Node::Grade if passed => Some(Node::Generate),
        Node::Grade => Some(Node::Fallback),
        Node::Generate | Node::Fallback => None,
    }
}

/// Route, retrieve, grade, then generate or refuse.
///
/// Build once at startup and share it; every method takes `&self`.
pub struct AnswerOrchestrator {
    router: QueryRouter,
    retriever: Retriever,
    generator: AnswerGenerator,
    fallback: FallbackResponder,
    call_timeout: Duration,
}

impl AnswerOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        retriever: Retriever,
        call_timeout: Duration,
    ) -> Self {
        Self {
            router: QueryRouter::new(model.clone()),
            retriever,
            generator: AnswerGenerator::new(model),
            fallback: FallbackResponder,
            call_timeout,
        }
    }

    /// Wires the HTTP-backed services and the configured index.
    pub async fn connect(config: &AgentConfig) -> Result<Self, QueryError> {
        config.validate()?;
        let timeout = config.call_timeout();

        let model: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(
            &config.api_base,
            config.api_key.clone(),
            &config.model_name,
            timeout,
        )?);
        let embedder = build_embedder(config)?;
        let index = open_index(config).await?;

        let retriever = Retriever::new(embedder, index, config.retrieval.clone())?;
        retriever.check_index().await?;
        info!(model = %config.model_name, db_path = %config.db_path.display(), "answer orchestrator ready");
        Ok(Self::new(model, retriever, timeout))
    }

    /// Answers `question`, returning either a complete answer or an error.
    ///
    /// Passages are cleared whenever the answer is a refusal or the question
    /// was rejected along the way.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::Request("question is empty".to_string()));
        }

        let state = self.run(GraphState::new(question)).await?;
        let text = state.answer.ok_or_else(|| {
            QueryError::Request("workflow finished without an answer".to_string())
        })?;

        let rejected = state.relevance != Some(Relevance::Yes) || state.fallback.is_some();
        let passages = if rejected || is_refusal(&text) {
            Vec::new()
        } else {
            state.context
        };

        Ok(Answer { text, passages })
    }

    pub async fn ask_with_context(&self, question: &str) -> Result<EvaluationRecord, QueryError> {
        let answer = self.answer(question).await?;
        Ok(EvaluationRecord {
            question: question.to_string(),
            answer: answer.text,
            contexts: answer.passages.into_iter().map(|passage| passage.text).collect(),
        })
    }

    pub async fn run(&self, mut state: GraphState) -> Result<GraphState, QueryError> {
        let mut node = ENTRY;
        loop {
            self.step(node, &mut state).await?;
            match next_node(node, &state) {
                Some(next) => {
                    debug!(from = node.name(), to = next.name(), "transition");
                    node = next;
                }
                None => return Ok(state),
            }
        }
    }

    async fn step(&self, node: Node, state: &mut GraphState) -> Result<(), QueryError> {
        match node {
            Node::Route => {
                let decision = self
                    .bounded(node, self.router.route(&state.question))
                    .await?;
                if decision.relevant {
                    state.relevance = Some(Relevance::Yes);
                } else {
                    state.relevance = Some(Relevance::No);
                    state.fallback = Some(FallbackReason::OffTopic);
                }
            }
            Node::Retrieve => {
                state.context = self
                    .bounded(node, self.retriever.retrieve(&state.question))
                    .await?;
            }
            Node::Grade => {
                let relevance = grade(&state.context);
                if relevance == Relevance::No {
                    state.fallback = Some(FallbackReason::NothingRetrieved);
                }
                state.relevance = Some(relevance);
            }
            Node::Generate => {
                let context = state.context_texts();
                let answer = self
                    .bounded(node, self.generator.generate(&state.question, &context))
                    .await?;
                state.answer = Some(answer);
            }
            Node::Fallback => {
                let reason = state.fallback.unwrap_or(FallbackReason::OffTopic);
                state.answer = Some(self.fallback.respond(reason).to_string());
            }
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, node: Node, call: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| QueryError::Timeout {
                operation: node.name().to_string(),
            })?
    }
}

pub async fn open_index(config: &AgentConfig) -> Result<Arc<dyn VectorIndex>, QueryError> {
    let index: Arc<dyn VectorIndex> = match config.index_backend {
        IndexBackend::Local => {
            Arc::new(LocalIndexStore::open(&config.db_path).await?) as Arc<dyn VectorIndex>
        }
        IndexBackend::Qdrant => Arc::new(QdrantStore::new(
            &config.qdrant_url,
            config.collection_name(),
            config.call_timeout(),
        )?) as Arc<dyn VectorIndex>,
    };
    Ok(index)
}

/// The offline trigram embedder when asked for by name, the HTTP client otherwise.
pub fn build_embedder(config: &AgentConfig) -> Result<Arc<dyn Embedder>, QueryError> {
    let offline = CharacterNgramEmbedder::default();
    if config.embedding_model == offline.model_name() {
        return Ok(Arc::new(offline));
    }
    Ok(Arc::new(OpenAiEmbedder::new(
        &config.api_base,
        config.api_key.clone(),
        &config.embedding_model,
        config.call_timeout(),
    )?))
}
