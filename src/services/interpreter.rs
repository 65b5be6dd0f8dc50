use crate::error::Result;
use crate::types::{
    ApiConfig, InterpretationResult, SegmentedDocument, StructuredTable, TableBlock,
    TableInterpretation,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const INTERPRET_PROMPT: &str = r#"### INSTRUCTION ###
You are a helpful AI accountant who bookkeeps and collects data extracted from markdown tables. Your job lies in interpreting markdown tables parsed from company reports and converting them into JSON formatted tables, given the description or context if provided to you. You have to follow these steps:
1. Read through the context (some context may be irrelevant, you can decide to discard it) and the entire table, understand its structure and what it is for. The context denotes the last 4 lines and the next 2 lines of where the table is in the page. Some tables may be corrupted during parsing; use the context to help you interpret them, and only fill in missing parts if you are really sure.
2. Identify the header in the table so you can construct the key fields for each row. If there is no header, represent each row of data in list form.
3. If the table itself is malformed, interpret it wisely with your understanding. ONLY ONE RULE IS TO STORE THE ROWS UNDER THE 'data' FIELD.
4. The JSON output must contain a 'data' field holding row data only. Replace empty fields or fields noted as '-' with null. Put the page index given to you in a separate 'page_index' field.
5. If the table contains meta information like units or notes, put it in a 'metadata' field.

### DATA ###
The context of the table is {context}.
The original markdown table is {markdown_table}.
The page position, noted as index, of the markdown table in the original file is {page_index}.

IMPORTANT: Preserve data integrity (including the language used in the markdown table) and do NOT make up any data.

### OUTPUT ###
Output nothing other than the JSON formatted table. Store all non-metadata fields into the 'data' field. Remember to put the page index given to you in the output!"#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// Dispatches extracted table blocks to the external table-interpretation
/// collaborator. Malformed replies are kept verbatim and a failing call never
/// aborts sibling tables.
pub struct TableInterpreter {
    client: reqwest::Client,
    config: ApiConfig,
}

impl TableInterpreter {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Interpret every table in the catalogue, each with its resolved context
    /// window. Per-table failures are recorded in the result instead of
    /// propagating.
    pub async fn interpret_tables(&self, doc: &SegmentedDocument) -> Vec<TableInterpretation> {
        let mut interpretations = Vec::with_capacity(doc.tables.len());

        for table in &doc.tables {
            let context = doc
                .positions
                .context_window(&table.label)
                .unwrap_or_default();

            let result = match self.interpret(table, &context).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("interpretation call failed for {}: {}", table.label, e);
                    InterpretationResult::Failed(e.to_string())
                }
            };

            interpretations.push(TableInterpretation {
                label: table.label.clone(),
                page_index: table.page_index,
                result,
            });
        }

        info!("interpreted {} tables", interpretations.len());
        interpretations
    }

    pub async fn interpret(
        &self,
        table: &TableBlock,
        context: &str,
    ) -> Result<InterpretationResult> {
        let prompt = INTERPRET_PROMPT
            .replace("{context}", context)
            .replace("{markdown_table}", &table.text())
            .replace("{page_index}", &table.page_index.to_string());

        debug!(
            "interpreting {} ({} lines, page {})",
            table.label,
            table.lines.len(),
            table.page_index
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        Ok(parse_interpretation(&reply))
    }
}

/// Try to parse the collaborator's reply as a structured table; anything that
/// is not JSON with a `data` field is preserved as-is.
pub fn parse_interpretation(reply: &str) -> InterpretationResult {
    match serde_json::from_str::<StructuredTable>(reply) {
        Ok(structured) => InterpretationResult::Structured(structured),
        Err(_) => InterpretationResult::Raw(reply.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_record_reply_parses_as_structured() {
        let reply = r#"{"page_index": 3, "data": [{"Year": "2023", "Scope 1": "12.4"}]}"#;

        match parse_interpretation(reply) {
            InterpretationResult::Structured(table) => {
                assert_eq!(table.page_index, Some(3));
                assert!(table.data.is_array());
                assert!(table.metadata.is_none());
            }
            other => panic!("expected structured result, got {:?}", other),
        }
    }

    #[test]
    fn positional_rows_and_metadata_parse_as_structured() {
        let reply = r#"{"metadata": {"unit": "tCO2e"}, "page_index": 1, "data": [["a", "b"], ["c", "d"]]}"#;

        match parse_interpretation(reply) {
            InterpretationResult::Structured(table) => {
                assert!(table.metadata.is_some());
                assert_eq!(table.data[1][0], "c");
            }
            other => panic!("expected structured result, got {:?}", other),
        }
    }

    #[test]
    fn non_json_reply_is_preserved_verbatim() {
        let reply = "Sorry, this table is illegible.";

        match parse_interpretation(reply) {
            InterpretationResult::Raw(text) => assert_eq!(text, reply),
            other => panic!("expected raw result, got {:?}", other),
        }
    }

    #[test]
    fn json_without_data_field_is_preserved_verbatim() {
        let reply = r#"{"rows": []}"#;

        assert!(matches!(
            parse_interpretation(reply),
            InterpretationResult::Raw(_)
        ));
    }
}
