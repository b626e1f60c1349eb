use crate::llm::{LanguageModel, PromptTemplate};
use crate::QueryError;
use std::sync::Arc;

/// Marker every refusal starts with ("I'm sorry").
pub const APOLOGY_MARKER: &str = "죄송합니다";

/// What the model is told to say for off-topic questions.
pub const OFF_TOPIC_REPLY: &str =
    "죄송합니다. 저는 공고문 분석 전문가로서 해당 질문에 대해서는 답변을 드릴 수 없습니다.";

/// What the model is told to say when the documents do not hold the answer.
pub const NOT_FOUND_REPLY: &str = "제공된 문서에서 관련 정보를 찾을 수 없습니다.";

pub const ANSWER_PROMPT: PromptTemplate = PromptTemplate::new(
    "당신은 공공 입찰 및 사업 공고 분석 전문가입니다.\n\
     당신의 임무는 오로지 제공된 [참고 문서]의 내용을 바탕으로 질문에 답하는 것입니다.\n\n\
     [엄격 준수 지침]\n\
     1. 주제 제한: 질문이 공공 입찰, 사업 내용, 제안서 작성 등 본 사업과 관련 없는 내용(예: 일상 대화, 음식 추천, 일반 상식 등)일 경우,\n   \
     \"죄송합니다. 저는 공고문 분석 전문가로서 해당 질문에 대해서는 답변을 드릴 수 없습니다.\"라고만 답변하세요.\n\n\
     2. 근거 기반 답변: 반드시 제공된 [참고 문서]에 명시된 사실만 답변하세요.\n\n\
     3. 정보 부재 시: 질문이 사업과 관련은 있지만 [참고 문서]에 관련 내용이 없는 경우,\n   \
     \"제공된 문서에서 관련 정보를 찾을 수 없습니다.\"라고 답변하세요.\n\n\
     4. 사업명 일치 확인: 질문에서 언급한 '사업명'과 [참고 문서]의 '사업명'이 다를 경우,\n   \
     해당 문서는 무시하고 \"제공된 문서에서 관련 정보를 찾을 수 없습니다.\"라고 답하세요.\n\n\
     [참고 문서]\n\
     {context}\n\n\
     질문: {question}\n\
     답변:",
);

pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Grounding, refusal and project-name checks are instructions to the
    /// model; the reply is returned as is.
    pub async fn generate(&self, question: &str, context: &[String]) -> Result<String, QueryError> {
        let joined = context.join("\n\n");
        let prompt = ANSWER_PROMPT.render(&[("context", &joined), ("question", question)]);
        let reply = self.model.complete(&prompt).await?;
        Ok(reply.trim().to_string())
    }
}

pub fn is_refusal(answer: &str) -> bool {
    answer.contains(APOLOGY_MARKER)
}
