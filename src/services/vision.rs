use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One recognized food line item, as returned by the vision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEstimate {
    pub name: String,
    pub portion: String,
    pub protein_grams: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_grams: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealAnalysis {
    pub foods: Vec<FoodEstimate>,
    pub total_protein: f64,
    /// "high", "medium" or "low"
    pub confidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[async_trait]
pub trait VisionAi: Send + Sync {
    /// Analyze the image behind a (time-limited) URL. Errors propagate to
    /// the caller; the cache layer does not catch them.
    async fn analyze(&self, image_url: &str) -> Result<MealAnalysis>;

    async fn health(&self) -> bool;
}

pub struct HttpVisionAi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpVisionAi {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    image_url: &'a str,
}

#[async_trait]
impl VisionAi for HttpVisionAi {
    async fn analyze(&self, image_url: &str) -> Result<MealAnalysis> {
        let mut req = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&AnalyzeRequest { image_url });

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;
        let analysis: MealAnalysis = response.json().await?;

        Ok(analysis)
    }

    async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
