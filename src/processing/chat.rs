//! Condense-question chat: rewrite follow-ups into standalone questions, then answer from
//! retrieved context.

use crate::index::ScoredNode;
use crate::llm::{LanguageModel, LanguageModelError};
use serde::Deserialize;
use std::fmt::Write as _;

/// Speaker of a prior conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The person asking questions.
    User,
    /// A previous generated answer.
    Assistant,
}

/// One prior conversation turn supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

/// Rewrite `question` as a standalone question using `history`.
///
/// With no history there is nothing to condense and the question is returned unchanged
/// without calling the model.
pub(crate) async fn condense_question(
    llm: &dyn LanguageModel,
    history: &[ChatMessage],
    question: &str,
) -> Result<String, LanguageModelError> {
    if history.is_empty() {
        return Ok(question.to_string());
    }

    let condensed = llm.complete(&condense_prompt(history, question)).await?;
    if condensed.trim().is_empty() {
        tracing::warn!("Language model returned an empty condensed question; using original");
        return Ok(question.to_string());
    }
    tracing::debug!(original = question, condensed = %condensed, "Condensed follow-up question");
    Ok(condensed)
}

fn condense_prompt(history: &[ChatMessage], question: &str) -> String {
    let mut transcript = String::new();
    for message in history {
        let speaker = match message.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        let _ = writeln!(transcript, "{speaker}: {}", message.content.trim());
    }

    format!(
        "Given the conversation below and a follow-up message, rewrite the follow-up as a \
single standalone question that keeps all relevant context from the conversation.\n\n\
<Conversation>\n{transcript}\n<Follow Up Message>\n{question}\n\n<Standalone question>\n"
    )
}

/// Assemble the answer prompt from retrieved nodes, most relevant first.
pub(crate) fn answer_prompt(question: &str, nodes: &[ScoredNode]) -> String {
    let mut context = String::new();
    for hit in nodes {
        let metadata = &hit.node.metadata;
        if let Some(file) = metadata.file_name.as_deref() {
            let _ = writeln!(context, "file_name: {file}");
        }
        if let Some(page) = metadata.page_label.as_deref() {
            let _ = writeln!(context, "page_label: {page}");
        }
        let _ = writeln!(context, "\n{}\n", hit.node.text.trim());
    }

    format!(
        "Context information is below.\n---------------------\n{context}---------------------\n\
Using only the context information and no prior knowledge, answer the query.\n\
Query: {question}\nAnswer: "
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn empty_history_skips_the_model() {
        let model = RecordingModel::replying("unused");
        let question = condense_question(&model, &[], "What is the summary?")
            .await
            .expect("condense");

        assert_eq!(question, "What is the summary?");
        assert!(model.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn history_is_condensed_by_the_model() {
        let model = RecordingModel::replying("What was Acme's revenue in 2023?");
        let history = vec![
            ChatMessage {
                role: ChatRole::User,
                content: "Tell me about Acme.".into(),
            },
            ChatMessage {
                role: ChatRole::Assistant,
                content: "Acme makes anvils.".into(),
            },
        ];

        let question = condense_question(&model, &history, "And its 2023 revenue?")
            .await
            .expect("condense");

        assert_eq!(question, "What was Acme's revenue in 2023?");
        let prompts = model.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("User: Tell me about Acme."));
        assert!(prompts[0].contains("Assistant: Acme makes anvils."));
        assert!(prompts[0].contains("And its 2023 revenue?"));
    }

    #[tokio::test]
    async fn blank_condensation_falls_back_to_original() {
        let model = RecordingModel::replying("   ");
        let history = vec![ChatMessage {
            role: ChatRole::User,
            content: "Hi".into(),
        }];
        let question = condense_question(&model, &history, "Revenue?")
            .await
            .expect("condense");
        assert_eq!(question, "Revenue?");
    }

    #[test]
    fn history_deserializes_lowercase_roles() {
        let parsed: Vec<ChatMessage> = serde_json::from_str(
            r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]"#,
        )
        .expect("json");
        assert_eq!(parsed[0].role, ChatRole::User);
        assert_eq!(parsed[1].role, ChatRole::Assistant);
    }
}
