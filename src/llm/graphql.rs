//! GraphQL chat endpoint transport
//!
//! The endpoint is a single URL accepting GraphQL POSTs. Chat goes through
//! the `chat` query; the connectivity probe is a schema introspection query
//! whose payload is ignored.

use super::stream::{simulate_stream, FragmentPlan};
use super::types::{ChatReply, ChatRequest, ConversationTurn, ReplyStream, Usage};
use super::{ApiError, ChatTransport};
use crate::config::TransportConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const PROBE_QUERY: &str = "query TestConnection { __schema { queryType { name } } }";

const CHAT_QUERY: &str = r"query ChatQuery($messages: [MessageInput!]!, $model: String, $maxTokens: Int, $temperature: Float) {
  chat(messages: $messages, model: $model, maxTokens: $maxTokens, temperature: $temperature) {
    id
    model
    choices {
      message {
        role
        content
      }
      finishReason
      index
    }
    usage {
      promptTokens
      completionTokens
      totalTokens
    }
    created
  }
}";

/// Transport for the GraphQL chat endpoint
#[derive(Clone)]
pub struct GraphqlTransport {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    plan: FragmentPlan,
}

impl GraphqlTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            plan: FragmentPlan::chunked(config.stream_chunk_chars, config.stream_interval),
        })
    }

    fn build_query<'a>(&'a self, request: &'a ChatRequest) -> GraphqlQuery<'a> {
        GraphqlQuery {
            query: CHAT_QUERY,
            variables: Some(ChatVariables {
                messages: &request.turns,
                model: &self.model,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            }),
        }
    }
}

#[async_trait]
impl ChatTransport for GraphqlTransport {
    async fn probe_connectivity(&self) -> bool {
        let query = GraphqlQuery {
            query: PROBE_QUERY,
            variables: None,
        };

        match self.client.post(&self.endpoint).json(&query).send().await {
            Ok(response) => {
                let status = response.status();
                tracing::debug!(status = status.as_u16(), "Connectivity probe answered");
                !status.is_server_error()
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "Connectivity probe failed");
                false
            }
        }
    }

    async fn send_blocking(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.build_query(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The status is the error; an unreadable body only loses detail
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(
                status.as_u16(),
                status.canonical_reason(),
                &body,
            ));
        }

        let body = response.text().await?;
        parse_chat_response(&body)
    }

    fn send_streaming(&self, request: ChatRequest, cancel: CancellationToken) -> ReplyStream {
        let transport = self.clone();
        let plan = self.plan;
        simulate_stream(
            async move { transport.send_blocking(&request).await },
            plan,
            cancel,
        )
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Extract the reply from a success body.
///
/// A GraphQL error list wins over any partial data; a body without a
/// non-empty first choice is not a valid reply.
pub(crate) fn parse_chat_response(body: &str) -> Result<ChatReply, ApiError> {
    let Ok(parsed) = serde_json::from_str::<GraphqlResponse>(body) else {
        return Err(ApiError::no_valid_reply());
    };

    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
        let joined = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ApiError::remote(format!("GraphQL error: {joined}")));
    }

    let chat = parsed
        .data
        .and_then(|d| d.chat)
        .ok_or_else(ApiError::no_valid_reply)?;

    let text = chat
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty())
        .ok_or_else(ApiError::no_valid_reply)?;

    let usage = chat
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatReply {
        text,
        model: chat.model,
        usage,
    })
}

// GraphQL wire types

#[derive(Debug, Serialize)]
struct GraphqlQuery<'a> {
    query: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<ChatVariables<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatVariables<'a> {
    messages: &'a [ConversationTurn],
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<ChatData>,
    errors: Option<Vec<GraphqlErrorItem>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorItem {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatData {
    chat: Option<ChatPayload>,
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
