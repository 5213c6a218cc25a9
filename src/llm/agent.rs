//! Agent shell: a small JSON tool-calling loop around `context_retriever`.
//!
//! Each model turn must be one JSON object, either a tool call
//! `{"tool": "context_retriever", "args": {"hint": ..., "is_folder": ..., "query": ...}}`
//! or a final answer `{"final_answer": "..."}`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::chat::{sanitize_for_prompt, ChatModel};
use crate::models::{ChatMessage, RetrieveArgs};
use crate::search::engine::RetrievalService;

pub const TOOL_NAME: &str = "context_retriever";

/// Tool calls allowed before the model is forced to answer.
const MAX_TOOL_STEPS: usize = 3;
/// Document paths listed in the system prompt.
const MAX_LISTED_FILES: usize = 200;

/// The retrieval capability exposed to the agent.
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    async fn call(&self, args: RetrieveArgs) -> crate::error::Result<String>;
}

/// [`RetrievalService`] bound to one request's scope.
pub struct ScopedRetrieval<'a> {
    pub service: &'a RetrievalService,
    pub scope_id: Option<&'a str>,
}

#[async_trait]
impl RetrievalTool for ScopedRetrieval<'_> {
    async fn call(&self, args: RetrieveArgs) -> crate::error::Result<String> {
        self.service.retrieve(self.scope_id, args).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgentAction {
    Tool {
        tool: String,
        args: RetrieveArgs,
    },
    Final {
        final_answer: String,
    },
}

#[derive(Debug, Clone)]
pub struct AgentAnswer {
    pub answer: String,
    /// Arguments of every retrieval performed, in order.
    pub tool_calls: Vec<RetrieveArgs>,
}

pub struct Agent<'a> {
    model: &'a dyn ChatModel,
    tool: &'a dyn RetrievalTool,
}

impl<'a> Agent<'a> {
    pub fn new(model: &'a dyn ChatModel, tool: &'a dyn RetrievalTool) -> Self {
        Self { model, tool }
    }

    /// Answer a question about the user's documents.
    ///
    /// `document_name` is a document the user picked explicitly; it becomes the
    /// hint of any tool call that does not name one. A retrieval failure aborts
    /// the answer rather than letting the model answer without evidence.
    pub async fn answer(
        &self,
        question: &str,
        document_name: Option<&str>,
        files: &[String],
    ) -> Result<AgentAnswer> {
        let question = sanitize_for_prompt(question);
        let document_name = document_name.map(str::trim).filter(|d| !d.is_empty());

        let mut messages = vec![
            ChatMessage::system(system_prompt(files, document_name)),
            ChatMessage::user(question.clone()),
        ];
        let mut tool_calls = Vec::new();

        for step in 0..MAX_TOOL_STEPS {
            let reply = self.model.complete(&messages).await?;

            let args = match parse_action(&reply) {
                Some(AgentAction::Final { final_answer }) => {
                    return Ok(AgentAnswer {
                        answer: final_answer.trim().to_string(),
                        tool_calls,
                    });
                }
                Some(AgentAction::Tool { tool, args }) if tool == TOOL_NAME => args,
                Some(AgentAction::Tool { tool, .. }) => {
                    tracing::warn!("Model called unknown tool '{tool}'");
                    fallback_args(&question, document_name)
                }
                None if tool_calls.is_empty() => {
                    tracing::warn!("Model reply at step {step} is not an action; retrieving with the raw question");
                    fallback_args(&question, document_name)
                }
                None => {
                    // Plain text after evidence was retrieved is the answer.
                    return Ok(AgentAnswer {
                        answer: reply.trim().to_string(),
                        tool_calls,
                    });
                }
            };

            let args = with_default_hint(args, document_name);
            tracing::info!(
                "Tool call {}: hint={:?} query='{}'",
                step + 1,
                args.hint,
                args.query
            );
            let context = self.tool.call(args.clone()).await?;
            tool_calls.push(args);

            messages.push(ChatMessage::assistant(reply));
            messages.push(ChatMessage::user(format!(
                "Result of {TOOL_NAME}:\n\n{context}\n\n\
                 Answer the original question using only this context, or call the tool again \
                 with a different query. Respond with JSON only."
            )));
        }

        messages.push(ChatMessage::user(
            "No more tool calls are allowed. Give your final answer now as \
             {\"final_answer\": \"...\"}."
                .to_string(),
        ));
        let reply = self.model.complete(&messages).await?;
        let answer = match parse_action(&reply) {
            Some(AgentAction::Final { final_answer }) => final_answer,
            _ => reply,
        };
        Ok(AgentAnswer {
            answer: answer.trim().to_string(),
            tool_calls,
        })
    }
}

fn system_prompt(files: &[String], document_name: Option<&str>) -> String {
    let mut listing = files
        .iter()
        .take(MAX_LISTED_FILES)
        .map(|f| format!("- {}", sanitize_for_prompt(f)))
        .collect::<Vec<_>>()
        .join("\n");
    if files.len() > MAX_LISTED_FILES {
        listing.push_str(&format!("\n- ... and {} more", files.len() - MAX_LISTED_FILES));
    }
    if listing.is_empty() {
        listing.push_str("- (no documents have been ingested)");
    }

    let selected = document_name
        .map(|d| format!("\nThe user has selected this document: {}\n", sanitize_for_prompt(d)))
        .unwrap_or_default();

    format!(
        "You answer questions about the user's documents. The user has these files:\n\
         {listing}\n{selected}\n\
         To look something up, extract the file or folder the user mentions (if any) and a \
         cleaned search query without the file name, then call the {TOOL_NAME} tool by replying \
         with exactly one JSON object:\n\
         {{\"tool\": \"{TOOL_NAME}\", \"args\": {{\"hint\": \"<file or folder, or null>\", \
         \"is_folder\": <true|false|null>, \"query\": \"<cleaned query>\"}}}}\n\n\
         The tool returns numbered contexts, each labelled with its source file, page number \
         and chunk. When you have enough information reply with:\n\
         {{\"final_answer\": \"<answer>\"}}\n\n\
         Every sentence of the answer that uses a context must cite it as \
         <cite>(source file, page number, chunk)</cite>, copying the three values exactly as \
         they appear in the context header. If the context does not contain the answer, say so."
    )
}

/// Parse a model reply as an action, tolerating text around the JSON object.
fn parse_action(reply: &str) -> Option<AgentAction> {
    let trimmed = reply.trim();
    if let Ok(action) = serde_json::from_str(trimmed) {
        return Some(action);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn fallback_args(question: &str, document_name: Option<&str>) -> RetrieveArgs {
    RetrieveArgs {
        hint: document_name.map(str::to_string),
        is_folder: None,
        query: question.to_string(),
    }
}

fn with_default_hint(mut args: RetrieveArgs, document_name: Option<&str>) -> RetrieveArgs {
    let has_hint = args.hint.as_deref().is_some_and(|h| !h.trim().is_empty());
    if !has_hint {
        args.hint = document_name.map(str::to_string);
    }
    args
}
