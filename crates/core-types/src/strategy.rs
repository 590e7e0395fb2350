use serde::{Deserialize, Serialize};
use toml::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    // This will hold the `params = { ... }` table from the TOML
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

fn empty_params() -> Value {
    Value::Table(Default::default())
}
