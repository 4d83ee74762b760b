use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{FilterError, Rejection},
    safety::{FORBIDDEN_STRINGS, find_forbidden_matches},
    scanner::{BanSubstrings, BanSubstringsOptions, INJECTION_THRESHOLD, Scanner, SubstringMatch},
    types::{RequestBody, ScanResult},
    valves::Valves,
};

pub const FILTER_ID: &str = "llmguard_prompt_injection_filter_pipeline";
pub const FILTER_NAME: &str = "LLMGuard Prompt Injection Filter";

/// Constructs the prompt-injection scanner when the filter starts.
pub type InjectionScannerBuilder =
    Arc<dyn Fn() -> anyhow::Result<Arc<dyn Scanner>> + Send + Sync>;

#[derive(Debug)]
pub enum InletVerdict {
    Pass(RequestBody),
    Reject(Rejection),
}

struct Scanners {
    injection: Arc<dyn Scanner>,
    ban_substrings: Arc<dyn Scanner>,
}

/// Inlet filter screening the latest chat message (plus attached file text)
/// for prompt injection and confidential strings.
pub struct InletFilter {
    valves: RwLock<Arc<Valves>>,
    build_injection: InjectionScannerBuilder,
    scanners: RwLock<Option<Arc<Scanners>>>,
}

impl InletFilter {
    pub fn new(valves: Valves, build_injection: InjectionScannerBuilder) -> Self {
        Self {
            valves: RwLock::new(Arc::new(valves)),
            build_injection,
            scanners: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &'static str {
        FILTER_ID
    }

    pub fn name(&self) -> &'static str {
        FILTER_NAME
    }

    pub async fn startup(&self) -> Result<(), FilterError> {
        info!(filter = FILTER_ID, "on_startup");

        let injection = (self.build_injection)().map_err(FilterError::Startup)?;
        let ban_substrings = BanSubstrings::new(
            FORBIDDEN_STRINGS,
            BanSubstringsOptions {
                match_type: SubstringMatch::Str,
                case_sensitive: false,
                redact: false,
                contains_all: false,
            },
        )
        .map_err(FilterError::Startup)?;

        info!(
            injection = injection.name(),
            forbidden = FORBIDDEN_STRINGS.len(),
            "scanners ready"
        );

        *self.scanners.write().await = Some(Arc::new(Scanners {
            injection,
            ban_substrings: Arc::new(ban_substrings),
        }));
        Ok(())
    }

    /// Drops the filter's handle on the scanners. Requests already running
    /// hold their own and finish against them.
    pub async fn shutdown(&self) {
        info!(filter = FILTER_ID, "on_shutdown");
        self.scanners.write().await.take();
    }

    pub async fn reconfigure(&self) {
        debug!(filter = FILTER_ID, "on_valves_updated");
    }

    pub async fn is_started(&self) -> bool {
        self.scanners.read().await.is_some()
    }

    pub async fn valves(&self) -> Arc<Valves> {
        self.valves.read().await.clone()
    }

    pub async fn update_valves(&self, valves: Valves) {
        *self.valves.write().await = Arc::new(valves);
        self.reconfigure().await;
    }

    pub async fn inlet(
        &self,
        mut body: RequestBody,
        user: Option<&Value>,
    ) -> Result<InletVerdict, FilterError> {
        let scanners = self
            .scanners
            .read()
            .await
            .clone()
            .ok_or(FilterError::NotStarted)?;

        info!(user = user_label(user), "inlet");

        let user_message = body
            .messages
            .last()
            .ok_or_else(|| FilterError::MalformedRequest("messages is empty".to_owned()))?
            .text()
            .ok_or_else(|| {
                FilterError::MalformedRequest("last message has no text content".to_owned())
            })?
            .to_owned();

        let files = body.metadata.files.get_or_insert_with(Vec::new);
        let has_files = !files.is_empty();
        let files_text = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                file.content().map(Option::unwrap_or_default).map_err(|_| {
                    FilterError::MalformedRequest(format!("file {index} content is not text"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(" ");

        let injection = run_scan(scanners.injection.as_ref(), &user_message).await?;
        if injection.risk_score > INJECTION_THRESHOLD {
            warn!(risk_score = injection.risk_score, "prompt injection rejected");
            return Ok(InletVerdict::Reject(Rejection::PromptInjection {
                risk_score: injection.risk_score,
            }));
        }

        let full_content = if has_files {
            format!("{user_message} {files_text}")
        } else {
            user_message
        };

        let confidential = run_scan(scanners.ban_substrings.as_ref(), &full_content).await?;
        if !confidential.is_valid {
            let matches = find_forbidden_matches(&full_content, FORBIDDEN_STRINGS);
            warn!(matched = matches.len(), "confidential content rejected");
            return Ok(InletVerdict::Reject(Rejection::ConfidentialContent { matches }));
        }

        Ok(InletVerdict::Pass(body))
    }
}

async fn run_scan(scanner: &dyn Scanner, text: &str) -> Result<ScanResult, FilterError> {
    scanner.scan(text).await.map_err(|source| FilterError::Scanner {
        scanner: scanner.name().to_owned(),
        source,
    })
}

fn user_label(user: Option<&Value>) -> &str {
    user.and_then(|user| {
        user.get("name")
            .or_else(|| user.get("id"))
            .and_then(Value::as_str)
    })
    .unwrap_or("anonymous")
}
