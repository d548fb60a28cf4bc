//! HTTP client for the hosted inference endpoint.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::estimate::LineItem;
use crate::walkthrough::traits::InferenceService;
use crate::walkthrough::types::ImageEstimate;

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1/chat/completions";
const DEFAULT_MODEL: &str = "grok-beta";

const DEFAULT_ANSWER: &str = "I'm here to help! What would you like to know?";

const IMAGE_PROMPT: &str = "Analyze this room for a painting estimate. List 3-5 \
    potential prep work items with a description, quantity, and unit price in \
    dollars, and estimate the complexity level (Low, Medium, High). Return ONLY a \
    JSON object with keys: 'items' (array of objects with 'description', \
    'quantity', 'unit_price') and 'complexity' (string). Do not include markdown \
    formatting.";

fn system_prompt(context: &str) -> String {
    format!(
        "You are a friendly, professional AI assistant for PaintBid, a painting \
         estimation app. \nYou're currently helping a painter scan a room for an \
         estimate. Be conversational, helpful, and brief.\nContext: {context}\nKeep \
         responses to 1-2 sentences max. Be encouraging and professional."
    )
}

#[derive(Debug, Clone)]
pub struct RemoteInferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl RemoteInferenceConfig {
    /// Reads the endpoint configuration from the environment. The API key is
    /// required; URL and model fall back to the hosted defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PAINTBID_INFERENCE_KEY")
            .context("PAINTBID_INFERENCE_KEY is not set")?;
        let base_url =
            std::env::var("PAINTBID_INFERENCE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model =
            std::env::var("PAINTBID_INFERENCE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

        Ok(Self {
            base_url,
            api_key,
            model,
            timeout: Duration::from_secs(15),
        })
    }
}

/// Blocking-HTTP inference client, driven from async code via
/// `spawn_blocking`.
pub struct RemoteInference {
    config: RemoteInferenceConfig,
    agent: ureq::Agent,
}

impl RemoteInference {
    pub fn new(config: RemoteInferenceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .build();
        Self { config, agent }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(RemoteInferenceConfig::from_env()?))
    }

    async fn post(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        let agent = self.agent.clone();
        let url = self.config.base_url.clone();
        let key = self.config.api_key.clone();

        tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
            let response = agent
                .post(&url)
                .set("Authorization", &format!("Bearer {key}"))
                .set("Content-Type", "application/json")
                .send_json(body)
                .map_err(|err| anyhow!("inference endpoint request failed: {err}"))?;

            response
                .into_json::<serde_json::Value>()
                .context("failed to decode inference response body")
        })
        .await
        .context("inference request task failed")?
    }

    fn reply_content(reply: &serde_json::Value) -> Option<&str> {
        reply["choices"][0]["message"]["content"].as_str()
    }
}

#[async_trait]
impl InferenceService for RemoteInference {
    async fn ask(&self, question: &str, context: &str) -> Result<String> {
        let request = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt(context) },
                { "role": "user", "content": question },
            ],
            "max_tokens": 100,
            "temperature": 0.7,
        });

        let reply = self.post(request).await?;
        Ok(Self::reply_content(&reply)
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_ANSWER.to_string()))
    }

    async fn estimate_from_image(&self, image_base64: &str) -> Result<ImageEstimate> {
        let request = json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{image_base64}"),
                            "detail": "high",
                        },
                    },
                    { "type": "text", "text": IMAGE_PROMPT },
                ],
            }],
            "temperature": 0.7,
        });

        let reply = self.post(request).await?;
        let content = Self::reply_content(&reply)
            .ok_or_else(|| anyhow!("image estimate reply carried no content"))?;
        parse_image_estimate(content)
    }
}

#[derive(Debug, Deserialize)]
struct ImageEstimateWire {
    items: Vec<WireItem>,
    complexity: String,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    description: String,
    #[serde(default = "default_quantity")]
    quantity: f64,
    #[serde(default)]
    unit_price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Parses the model's JSON reply, tolerating markdown code fences around it.
fn parse_image_estimate(content: &str) -> Result<ImageEstimate> {
    let cleaned = strip_code_fences(content);
    let wire: ImageEstimateWire = serde_json::from_str(cleaned)
        .with_context(|| format!("failed to parse image estimate reply: {cleaned}"))?;

    Ok(ImageEstimate {
        items: wire
            .items
            .into_iter()
            .map(|item| LineItem {
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
        complexity: wire.complexity,
    })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
