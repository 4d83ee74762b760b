use serde::{Deserialize, Serialize};

/// Host-visible settings of the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valves {
    /// Pipeline ids this filter attaches to; `"*"` attaches to all of them.
    #[serde(default)]
    pub pipelines: Vec<String>,
    /// Lower runs earlier among filters on the same pipeline.
    #[serde(default)]
    pub priority: i64,
}

impl Default for Valves {
    fn default() -> Self {
        Self {
            pipelines: vec!["*".to_owned()],
            priority: 0,
        }
    }
}
