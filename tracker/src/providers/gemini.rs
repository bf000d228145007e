use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ProviderError, RouteDescriptionRequest, RunSummary, TextGenerator};
use crate::{config::ProviderConfig, models::display_pace};

/// Text generation through the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.gemini_api_key.clone(),
        }
    }

    async fn generate(&self, prompt: String) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("GEMINI_API_KEY"))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.text())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn coaching_tips(&self, summary: &RunSummary) -> Result<String, ProviderError> {
        self.generate(coaching_prompt(summary)).await
    }

    async fn route_description(
        &self,
        request: &RouteDescriptionRequest,
    ) -> Result<String, ProviderError> {
        self.generate(description_prompt(request)).await
    }
}

fn coaching_prompt(summary: &RunSummary) -> String {
    format!(
        "I just finished a run.\n\
         Distance: {:.2}km\n\
         Duration: {} minutes\n\
         Average Pace: {} min/km\n\
         Route: {}\n\n\
         Provide a single paragraph of motivational coaching advice based on this performance. \
         Keep it encouraging and brief.",
        summary.distance_km,
        summary.duration_seconds / 60,
        display_pace(summary.average_pace),
        summary.route_name
    )
}

fn description_prompt(request: &RouteDescriptionRequest) -> String {
    format!(
        "Write a short, engaging 2-sentence description for a running route named \"{}\". \
         It is {:.1}km long with {:.0}m elevation gain. Tags: {}. Focus on the vibe and difficulty.",
        request.name,
        request.distance_km,
        request.elevation_gain_m,
        request.tags.join(", ")
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first candidate, trimmed; empty when there is none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pace;

    #[test]
    fn coaching_prompt_mentions_run_facts() {
        let prompt = coaching_prompt(&RunSummary {
            route_name: "Hill Thriller".into(),
            distance_km: 8.4,
            duration_seconds: 2_940,
            average_pace: Some(Pace(5.8333)),
        });
        assert!(prompt.contains("Distance: 8.40km"));
        assert!(prompt.contains("Duration: 49 minutes"));
        assert!(prompt.contains("Average Pace: 5:50 min/km"));
        assert!(prompt.contains("Route: Hill Thriller"));
    }

    #[test]
    fn coaching_prompt_without_pace_uses_sentinel() {
        let prompt = coaching_prompt(&RunSummary {
            route_name: "Loop".into(),
            distance_km: 0.0,
            duration_seconds: 125,
            average_pace: None,
        });
        assert!(prompt.contains("Average Pace: 0:00 min/km"));
    }

    #[test]
    fn description_prompt_lists_tags() {
        let prompt = description_prompt(&RouteDescriptionRequest {
            name: "Coastal Sprint".into(),
            distance_km: 5.24,
            elevation_gain_m: 79.0,
            tags: vec!["scenic".into(), "flat".into()],
        });
        assert!(prompt.contains("\"Coastal Sprint\""));
        assert!(prompt.contains("5.2km long with 79m"));
        assert!(prompt.contains("Tags: scenic, flat."));
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Great pace! "}, {"text": "Rest well.\n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "Great pace! Rest well.");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(empty.text(), "");
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_a_request() {
        let client = GeminiClient::new(reqwest::Client::new(), &ProviderConfig::default());
        let result = client
            .route_description(&RouteDescriptionRequest {
                name: "x".into(),
                distance_km: 1.0,
                elevation_gain_m: 15.0,
                tags: Vec::new(),
            })
            .await;
        assert!(matches!(result, Err(ProviderError::NotConfigured("GEMINI_API_KEY"))));
    }
}
