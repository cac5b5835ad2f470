use std::env;

pub const DEFAULT_TABLE_NAME: &str = "college-cms";

/// Runtime settings read once at cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            table_name: lookup("TABLE_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_defaults() {
        assert_eq!(Config::from_lookup(|_| None).table_name, "college-cms");
        assert_eq!(Config::from_lookup(|_| Some(String::new())).table_name, "college-cms");
        assert_eq!(
            Config::from_lookup(|k| (k == "TABLE_NAME").then(|| "staging".to_string())).table_name,
            "staging"
        );
    }
}
