use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::ScanResult;

use super::{MatchType, Scanner, split_sentences};

/// Prompt-injection scanner backed by a hosted text-classification model,
/// e.g. a DeBERTa prompt-injection checkpoint behind a Hugging Face style
/// inference endpoint.
#[derive(Debug, Clone)]
pub struct ClassifierInjectionScanner {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    threshold: f64,
    match_type: MatchType,
}

impl ClassifierInjectionScanner {
    pub fn new(
        endpoint: String,
        api_token: Option<String>,
        threshold: f64,
        match_type: MatchType,
    ) -> anyhow::Result<Self> {
        let endpoint = endpoint.trim().to_owned();
        if endpoint.is_empty() {
            anyhow::bail!("injection classifier endpoint is empty");
        }
        reqwest::Url::parse(&endpoint)
            .map_err(|error| anyhow::anyhow!("invalid injection classifier endpoint: {error}"))?;

        Ok(Self {
            client: Client::new(),
            endpoint,
            api_token,
            threshold,
            match_type,
        })
    }

    async fn classify(&self, text: &str) -> anyhow::Result<f64> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { inputs: text });

        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<ClassifyResponse>()
            .await?;

        injection_probability(&response.into_labels())
            .ok_or_else(|| anyhow::anyhow!("classifier returned no INJECTION or SAFE label"))
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassifyResponse {
    fn into_labels(self) -> Vec<LabelScore> {
        match self {
            ClassifyResponse::Nested(batches) => batches.into_iter().flatten().collect(),
            ClassifyResponse::Flat(labels) => labels,
        }
    }
}

fn injection_probability(labels: &[LabelScore]) -> Option<f64> {
    if let Some(injection) = labels
        .iter()
        .find(|item| item.label.eq_ignore_ascii_case("injection"))
    {
        return Some(injection.score);
    }

    labels
        .iter()
        .find(|item| item.label.eq_ignore_ascii_case("safe"))
        .map(|safe| 1.0 - safe.score)
}

#[async_trait]
impl Scanner for ClassifierInjectionScanner {
    fn name(&self) -> &str {
        "classifier_prompt_injection"
    }

    async fn scan(&self, text: &str) -> anyhow::Result<ScanResult> {
        let risk_score = match self.match_type {
            MatchType::Full => self.classify(text).await?,
            MatchType::Sentence => {
                let mut highest = 0.0_f64;
                for sentence in split_sentences(text) {
                    highest = highest.max(self.classify(sentence).await?);
                }
                highest
            }
        };

        Ok(ScanResult {
            sanitized: text.to_owned(),
            is_valid: risk_score <= self.threshold,
            risk_score,
        })
    }
}
