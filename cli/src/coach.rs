use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::CoachSettings;
use waterbar_core::coach::{
    PlanAdvisor, PlanContext, SYSTEM_PROMPT, build_plan_prompt, parse_recommendations,
};
use waterbar_core::models::RecommendationItem;

const TEMPERATURE: f64 = 0.4;
const MAX_TOKENS: u32 = 400;

/// Client for any chat-completions compatible coach endpoint.
pub struct CoachClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl CoachClient {
    pub fn new(settings: &CoachSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "waterbar-cli/{} (hydration coach)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            rt: tokio::runtime::Handle::current(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    pub async fn chat_async(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the coach API")?;

        if !resp.status().is_success() {
            bail!("Coach API returned {}", resp.status());
        }

        let data: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse coach API response")?;

        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Coach API response had no content")
    }

    pub async fn advise_async(&self, ctx: &PlanContext<'_>) -> Result<Vec<RecommendationItem>> {
        let prompt = build_plan_prompt(ctx)?;
        let reply = self.chat_async(&prompt).await?;
        parse_recommendations(&reply)
    }
}

impl PlanAdvisor for CoachClient {
    fn advise(&self, ctx: &PlanContext) -> Result<Vec<RecommendationItem>> {
        tokio::task::block_in_place(|| self.rt.block_on(self.advise_async(ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "[{\"action\": \"Drink water\", \"reason\": \"Fluid target\"}]"
                    },
                    "finish_reason": "stop"
                }
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        let content = parsed.choices[0].message.content.as_deref().unwrap();
        let items = parse_recommendations(content).unwrap();
        assert_eq!(items[0].action, "Drink water");
    }

    #[test]
    fn test_chat_response_without_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["temperature"], 0.4);
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    // --- Integration test (hits a live coach endpoint) ---

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "hits the coach API"]
    async fn test_advise_live() {
        use waterbar_core::coach::SCENARIO_NOTES;
        use waterbar_core::models::Profile;

        let settings = crate::config::CoachSettings::from_env()
            .expect("set WATERBAR_COACH_KEY or OPENAI_API_KEY to run this test");
        let client = CoachClient::new(&settings);

        let profile = Profile {
            id: "live-test".to_string(),
            name: Some("Deniz".to_string()),
            height_cm: Some(170.0),
            weight_kg: Some(70.0),
            age: Some(31),
            sex: None,
            body_fat_pct: Some(22.0),
            lean_mass_multiplier: None,
            body_composition_label: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let ctx = PlanContext {
            profile: &profile,
            events: &[],
            projection: None,
            scenarios: SCENARIO_NOTES,
        };
        let items = client.advise_async(&ctx).await.unwrap();
        assert!(!items.is_empty());
        for item in &items {
            assert!(!item.action.is_empty());
            assert!(!item.reason.is_empty());
        }
    }
}
