use crate::embedding_service::tokenize;
use crate::error::{RagError, Result};
use crate::models::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A retrieved passage handed to the model alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub passages: Vec<Passage>,
}

impl ChatRequest {
    fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion>;

    fn model_name(&self) -> &str;
}

async fn api_error(response: reqwest::Response) -> RagError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    RagError::Llm { status, message }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
            max_tokens,
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                messages: &request.messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: OpenAiResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "No response generated".to_string());

        Ok(Completion {
            content,
            usage: parsed.usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

pub struct GeminiChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiChatModel {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature,
        }
    }

    fn build_request(&self, messages: &[ChatMessage]) -> GeminiRequest {
        let system: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GeminiPart {
                text: m.content.clone(),
            })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(if m.role == Role::Assistant { "model" } else { "user" }.to_string()),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system,
            }),
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(&request.messages))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: GeminiResponse = response.json().await?;
        let content = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "No response generated".to_string());

        Ok(Completion {
            content,
            usage: parsed.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "what", "how", "does", "did", "this", "that", "with", "for", "are", "from",
    "about", "which", "who", "why", "when", "where", "into", "your", "you", "have", "has", "was",
    "were", "can", "could", "should", "would", "please", "tell", "there", "their", "they", "its",
    "document", "documents", "question", "provide", "helpful", "answer", "based", "context",
    "above",
];

pub const NO_ANSWER: &str =
    "I don't have enough information in your documents to answer that question.";

/// Answers without any model: quotes the passage sentences that share the
/// most terms with the question.
pub struct ExtractiveChatModel {
    max_sentences: usize,
}

impl ExtractiveChatModel {
    pub fn new() -> Self {
        Self { max_sentences: 3 }
    }

    fn answer(&self, question: &str, passages: &[Passage]) -> String {
        if passages.is_empty() {
            return NO_ANSWER.to_string();
        }

        let terms: HashSet<String> = tokenize(question)
            .into_iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect();

        let mut candidates: Vec<(usize, &str, &str)> = Vec::new();
        for passage in passages {
            for sentence in meaningful_sentences(&passage.content) {
                let words: HashSet<String> = tokenize(sentence).into_iter().collect();
                let score = terms.iter().filter(|t| words.contains(*t)).count();
                candidates.push((score, sentence, passage.filename.as_str()));
            }
        }

        // Stable sort keeps document order among equal scores.
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        let best: Vec<_> = candidates
            .iter()
            .filter(|(score, _, _)| *score > 0)
            .take(self.max_sentences)
            .collect();

        if best.is_empty() {
            let opening: Vec<&str> = candidates.iter().take(2).map(|(_, s, _)| *s).collect();
            if opening.is_empty() {
                return NO_ANSWER.to_string();
            }
            return format!("Based on the document content: {}", opening.join(" "));
        }

        let mut answer = String::from("Based on your documents:\n");
        for (_, sentence, filename) in best {
            answer.push_str(&format!("\n- {} (from {})", sentence, filename));
        }
        answer
    }
}

impl Default for ExtractiveChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for ExtractiveChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        Ok(Completion {
            content: self.answer(request.last_user_message(), &request.passages),
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}

fn meaningful_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.unicode_sentences()
        .map(|s| s.trim())
        .filter(|s| s.chars().count() > 20)
}
