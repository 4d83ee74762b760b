use std::{env, net::SocketAddr, sync::Arc};

use tracing::{info, warn};

use crate::{
    filter::InjectionScannerBuilder,
    scanner::{
        ClassifierInjectionScanner, HeuristicInjectionScanner, INJECTION_THRESHOLD, MatchType,
        Scanner,
    },
    valves::Valves,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: SocketAddr,
    pub injection_scanner: String,
    pub classifier_url: Option<String>,
    pub classifier_token: Option<String>,
    pub pipelines: Vec<String>,
    pub priority: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| "9099".to_owned());
        let http_bind = env::var("HTTP_BIND").unwrap_or_else(|_| format!("0.0.0.0:{port}"));
        let http_bind = http_bind.parse()?;

        Ok(Self {
            http_bind,
            injection_scanner: env::var("INJECTION_SCANNER")
                .unwrap_or_else(|_| "classifier".to_owned()),
            classifier_url: env_non_empty("INJECTION_CLASSIFIER_URL"),
            classifier_token: env_non_empty("INJECTION_CLASSIFIER_TOKEN"),
            pipelines: env::var("FILTER_PIPELINES")
                .map(|raw| parse_list(&raw))
                .unwrap_or_else(|_| vec!["*".to_owned()]),
            priority: env_i64("FILTER_PRIORITY", 0),
        })
    }

    pub fn valves(&self) -> Valves {
        Valves {
            pipelines: self.pipelines.clone(),
            priority: self.priority,
        }
    }

    /// Builder for the configured prompt-injection backend. Misconfiguration
    /// surfaces when the filter starts, not here.
    pub fn injection_scanner_builder(&self) -> InjectionScannerBuilder {
        let mode = self.injection_scanner.trim().to_lowercase();
        let url = self.classifier_url.clone();
        let token = self.classifier_token.clone();

        Arc::new(move || -> anyhow::Result<Arc<dyn Scanner>> {
            match mode.as_str() {
                "classifier" => {
                    let url = url.clone().ok_or_else(|| {
                        anyhow::anyhow!(
                            "INJECTION_SCANNER=classifier needs INJECTION_CLASSIFIER_URL"
                        )
                    })?;
                    info!(endpoint = %url, "using classifier prompt-injection scanner");
                    Ok(Arc::new(ClassifierInjectionScanner::new(
                        url,
                        token.clone(),
                        INJECTION_THRESHOLD,
                        MatchType::Full,
                    )?))
                }
                "heuristic" => {
                    warn!("using heuristic prompt-injection scanner instead of a classifier model");
                    Ok(Arc::new(HeuristicInjectionScanner::new(
                        INJECTION_THRESHOLD,
                        MatchType::Full,
                    )?))
                }
                other => Err(anyhow::anyhow!(
                    "unknown INJECTION_SCANNER value {other:?}; valid values are classifier|heuristic"
                )),
            }
        })
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    let items = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    if items.is_empty() {
        vec!["*".to_owned()]
    } else {
        items
    }
}
