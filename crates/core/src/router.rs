use crate::llm::{LanguageModel, PromptTemplate};
use crate::QueryError;
use std::sync::Arc;
use tracing::debug;

/// Label the classifier answers with for bidding/RFP questions.
pub const RELEVANT_LABEL: &str = "bid";
/// Label the classifier answers with for everything else.
pub const OFF_TOPIC_LABEL: &str = "off-topic";

pub const ROUTER_PROMPT: PromptTemplate = PromptTemplate::new(
    "당신은 질문의 의도를 분류하는 라우터입니다.\n\
     질문이 공공 입찰, 사업 공고, 제안서 작성 등 '사업 관련 질문'이면 'bid'라고 답하세요.\n\
     그 외의 일상적인 질문이나 잡담(음식, 연예, 일반 상식 등)이면 'off-topic'이라고 답하세요.\n\n\
     질문: {question}\n\
     답변(한 단어):",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub relevant: bool,
}

pub struct QueryRouter {
    model: Arc<dyn LanguageModel>,
}

impl QueryRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn route(&self, question: &str) -> Result<RouteDecision, QueryError> {
        let prompt = ROUTER_PROMPT.render(&[("question", question)]);
        let reply = self.model.complete(&prompt).await?;
        let decision = classify(&reply);
        debug!(reply = %reply.trim(), relevant = decision.relevant, "routed question");
        Ok(decision)
    }
}

/// Anything that does not mention the relevant label is treated as off-topic.
pub fn classify(reply: &str) -> RouteDecision {
    RouteDecision {
        relevant: reply.to_lowercase().contains(RELEVANT_LABEL),
    }
}
