use crate::embedding_service::Embedder;
use crate::error::{RagError, Result};
use crate::llm_service::{ChatMessage, ChatModel, ChatRequest, Passage};
use crate::models::{Chunk, ChatTurn, RagAnswer, ScoredChunk, Source};
use crate::vector_store::VectorStore;
use std::sync::Arc;

pub const NO_RELEVANT_DOCUMENTS: &str = "I couldn't find any relevant information in your documents to answer this question. Please make sure you have uploaded documents or try rephrasing your question.";

const SUMMARY_INPUT_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub history_turns: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_results: 4,
            similarity_threshold: 0.0,
            history_turns: 5,
        }
    }
}

pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    chat_model: Arc<dyn ChatModel>,
    settings: RetrievalSettings,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        chat_model: Arc<dyn ChatModel>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            chat_model,
            settings,
        }
    }

    pub fn chat_model_name(&self) -> &str {
        self.chat_model.model_name()
    }

    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let k = k.unwrap_or(self.settings.max_results);
        let query_embedding = self.embedder.embed_query(question).await?;

        let results: Vec<ScoredChunk> = self
            .vector_store
            .similarity_search(&query_embedding, k)
            .await?
            .into_iter()
            .filter(|scored| scored.score > self.settings.similarity_threshold)
            .collect();

        log::info!("Found {} relevant chunks", results.len());
        Ok(results)
    }

    /// Retrieves context for `question`, then asks the model with the recent
    /// turns of the conversation included.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<RagAnswer> {
        let retrieved = self.retrieve(question, None).await?;
        if retrieved.is_empty() {
            return Ok(RagAnswer {
                answer: NO_RELEVANT_DOCUMENTS.to_string(),
                sources: Vec::new(),
                usage: None,
            });
        }

        let system = self.build_system_prompt(
            &format_context(&retrieved),
            &format_history(history, self.settings.history_turns),
        );
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(system),
                ChatMessage::user(build_question_prompt(question)),
            ],
            passages: retrieved.iter().map(|s| passage(&s.chunk)).collect(),
        };

        let completion = self.chat_model.complete(&request).await?;
        log::info!(
            "Response generated by {} from {} chunks",
            self.chat_model.model_name(),
            retrieved.len()
        );

        Ok(RagAnswer {
            answer: completion.content,
            sources: retrieved.iter().map(Source::from).collect(),
            usage: completion.usage,
        })
    }

    pub async fn summarize(&self, document_id: &str) -> Result<String> {
        let chunks = self.vector_store.chunks_for_document(document_id).await?;
        if chunks.is_empty() {
            return Err(RagError::DocumentNotFound(document_id.to_string()));
        }

        let full_text = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let excerpt: String = full_text.chars().take(SUMMARY_INPUT_CHARS).collect();

        let prompt = format!(
            r#"Please provide a comprehensive summary of the following document:

{excerpt}

Focus on:
1. Main topics and themes
2. Key points and findings
3. Important details and conclusions
4. Overall structure and organization

Provide a clear, well-structured summary."#
        );

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are an AI assistant that summarizes documents accurately and concisely.",
                ),
                ChatMessage::user(prompt),
            ],
            passages: chunks.iter().map(passage).collect(),
        };

        let completion = self.chat_model.complete(&request).await?;
        log::info!("Summarized document {} ({} chunks)", document_id, chunks.len());
        Ok(completion.content)
    }

    fn build_system_prompt(&self, context: &str, chat_history: &str) -> String {
        format!(
            r#"You are an AI assistant that helps users understand and analyze their documents.
You have access to relevant excerpts from the user's uploaded documents.

Guidelines:
1. Answer questions based primarily on the provided document context
2. If the context doesn't contain enough information, clearly state this
3. Provide specific references to the source material when possible
4. Be concise but thorough in your explanations
5. If asked about something not in the documents, politely redirect to document-related questions

Context from documents:
{context}

Previous conversation (if any):
{chat_history}"#
        )
    }
}

fn build_question_prompt(question: &str) -> String {
    format!(
        "Question: {question}\n\nPlease provide a helpful answer based on the document context above."
    )
}

fn passage(chunk: &Chunk) -> Passage {
    Passage {
        filename: chunk.filename.clone(),
        content: chunk.content.clone(),
    }
}

pub fn format_context(retrieved: &[ScoredChunk]) -> String {
    if retrieved.is_empty() {
        return "No relevant documents found.".to_string();
    }

    retrieved
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "Document {} (from {}, section {}):\n{}\n",
                i + 1,
                scored.chunk.filename,
                scored.chunk.chunk_index,
                scored.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn format_history(history: &[ChatTurn], limit: usize) -> String {
    let recent = &history[history.len().saturating_sub(limit)..];
    if recent.is_empty() {
        return "No previous conversation.".to_string();
    }

    recent
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.user_message, turn.assistant_response))
        .collect::<Vec<_>>()
        .join("\n")
}
