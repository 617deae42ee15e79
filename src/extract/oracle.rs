//! The extraction oracle: decides what product, if any, a page offers.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::fetch::FetchedPage;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};

const SYSTEM_INSTRUCTION: &str = r#"You are an expert data extraction bot. Your response MUST be a single, clean JSON object. The JSON must have three keys: "productName" (string), "price" (number), and "currency" (string). The 'price' value MUST be a number (integer or float). The 'currency' value MUST be a standard 3-letter ISO 4217 currency code (e.g., "USD", "INR", "EUR"), not a symbol. If you cannot find all required information or if the product is not relevant, your entire response must be the single word: null. Do not include any other text or markdown."#;

/// Fields of a well-formed oracle answer. Not yet validated as a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub product_name: String,
    pub price: f64,
    pub currency: String,
}

/// What the oracle concluded about a page.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleVerdict {
    Product(ProductFields),
    /// The oracle explicitly reported no relevant product.
    NoRelevantProduct,
    /// The reply did not follow the contract.
    Malformed(String),
}

/// Judges a page against the user's query.
///
/// May be an LLM, a rule engine, or anything else honouring the verdict
/// contract. Errors are transport-level failures (unreachable, rejected).
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn judge(&self, page: &FetchedPage, query: &str) -> Result<OracleVerdict>;
}

/// Oracle backed by a chat-completion model.
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    fn prompt(page: &FetchedPage, query: &str) -> String {
        format!(
            "Analyze the HTML from a product webpage. The user is searching for: '{}'. \
             Identify the main product's name, its price, and currency. \
             Check if the product is relevant to the user's query. HTML: ```html {} ```",
            query, page.body_html
        )
    }
}

#[async_trait]
impl ExtractionOracle for LlmOracle {
    async fn judge(&self, page: &FetchedPage, query: &str) -> Result<OracleVerdict> {
        let messages = [
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(Self::prompt(page, query)),
        ];
        let options = ChatOptions {
            temperature: Some(0.1),
            max_tokens: Some(256),
        };
        let response = self
            .llm
            .chat_completion_with_options(&self.model, &messages, options)
            .await?;

        Ok(interpret_reply(response.content.as_deref().unwrap_or_default()))
    }
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("valid fence regex")
    })
}

/// Interpret a raw oracle reply.
///
/// `null` (any case) means no relevant product. A Markdown code fence around
/// the JSON is tolerated. Anything else that is not an object with a
/// non-empty `productName` string, a numeric `price` and a string `currency`
/// is malformed.
pub fn interpret_reply(raw: &str) -> OracleVerdict {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return OracleVerdict::NoRelevantProduct;
    }
    if trimmed.is_empty() {
        return OracleVerdict::Malformed("empty reply".to_string());
    }

    let body = code_fence()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    if body.eq_ignore_ascii_case("null") {
        return OracleVerdict::NoRelevantProduct;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return OracleVerdict::Malformed(format!("not JSON: {}", e)),
    };
    let Some(obj) = value.as_object() else {
        return OracleVerdict::Malformed("not a JSON object".to_string());
    };

    let product_name = match obj.get("productName").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return OracleVerdict::Malformed("missing productName".to_string()),
    };
    let Some(price) = obj.get("price").and_then(Value::as_f64) else {
        return OracleVerdict::Malformed("price is missing or not a number".to_string());
    };
    let Some(currency) = obj.get("currency").and_then(Value::as_str) else {
        return OracleVerdict::Malformed("missing currency".to_string());
    };

    OracleVerdict::Product(ProductFields {
        product_name,
        price,
        currency: currency.trim().to_string(),
    })
}
