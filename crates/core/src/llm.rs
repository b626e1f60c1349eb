use crate::error::QueryError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, QueryError>;
}

/// A fixed instruction text with `{name}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Substitutes known placeholders in one pass; inserted values are not rescanned.
    pub fn render(&self, variables: &[(&str, &str)]) -> String {
        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let substitution = after.find('}').and_then(|close| {
                let name = &after[..close];
                variables
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (close, *value))
            });

            match substitution {
                Some((close, value)) => {
                    rendered.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, QueryError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: ChatResponse = response.json().await?;
        first_reply(payload)
    }
}

fn first_reply(payload: ChatResponse) -> Result<String, QueryError> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| QueryError::BackendResponse {
            backend: "chat".to_string(),
            details: "response had no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_every_variable() {
        let template = PromptTemplate::new("Q: {question}\nC: {context}\nQ again: {question}");
        let rendered = template.render(&[("question", "예산?"), ("context", "352,000,000원")]);
        assert_eq!(rendered, "Q: 예산?\nC: 352,000,000원\nQ again: 예산?");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let template = PromptTemplate::new("{context} | {question} | {unknown}");
        let rendered = template.render(&[("context", "see {question}"), ("question", "q")]);
        assert_eq!(rendered, "see {question} | q | {unknown}");
    }

    #[test]
    fn chat_reply_content_is_extracted() -> Result<(), QueryError> {
        let payload: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"bid"}}]}"#)?;
        assert_eq!(first_reply(payload)?, "bid");
        Ok(())
    }

    #[test]
    fn empty_choices_are_a_backend_error() -> Result<(), QueryError> {
        let payload: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#)?;
        assert!(matches!(
            first_reply(payload),
            Err(QueryError::BackendResponse { .. })
        ));
        Ok(())
    }
}
