/// Refusal for questions outside public bidding.
pub const OFF_TOPIC_FALLBACK: &str =
    "죄송합니다. 저는 공고문 분석 전문가로서 사업 및 입찰과 관련된 질문에만 답변을 드릴 수 있습니다.";

/// Refusal when nothing was retrieved for an on-topic question.
pub const NOT_FOUND_FALLBACK: &str = "죄송합니다. 제공된 문서에서 관련 정보를 찾을 수 없습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    OffTopic,
    NothingRetrieved,
}

/// Fixed refusals; never calls out to any service.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackResponder;

impl FallbackResponder {
    pub fn respond(&self, reason: FallbackReason) -> &'static str {
        match reason {
            FallbackReason::OffTopic => OFF_TOPIC_FALLBACK,
            FallbackReason::NothingRetrieved => NOT_FOUND_FALLBACK,
        }
    }
}
