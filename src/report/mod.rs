//! Natural-language report over a finished analysis. One stateless call.

use anyhow::Result;

use crate::execution::AnalyticsResult;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, Role};

const REPORT_ROLE: &str = "You are a data analyst.\n\
    Write a short report (about 150 words) answering the user's question\n\
    from the computed metrics. Mention the produced plots by name.\n\
    Use Markdown. Do not invent numbers that are not in the metrics.";

pub async fn generate(
    client: &LlmClient,
    model: &str,
    question: &str,
    result: &AnalyticsResult,
) -> Result<String> {
    let payload = serde_json::to_string_pretty(result)?;
    let user = format!("Question: {}\n\nAnalysis result:\n{}", question, payload);

    let messages = vec![
        ChatMessage::new(Role::System, REPORT_ROLE),
        ChatMessage::new(Role::User, user),
    ];
    let opts = ChatOptions {
        model: model.to_string(),
        temperature: 0.3,
        top_p: 1.0,
        max_tokens: Some(512),
    };
    client.chat(messages, opts).await
}
