// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
    use crate::loader::{LoaderError, ReplacerLoader};
    use crate::rewrite::{RuleError, RuleSet};
    use serde_json::Value;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;
    use std::io::Write;

    #[derive(Debug)]
    struct MockConfigProvider {
        values: HashMap<String, Value>,
    }

    impl MockConfigProvider {
        fn new(values: &[(&str, Value)]) -> Self {
            Self {
                values: values
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    impl ConfigProvider for MockConfigProvider {
        fn has(&self, key: &str) -> bool {
            self.values.contains_key(key)
        }

        fn provider_name(&self) -> &str {
            "mock"
        }

        fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
            Ok(self.values.get(key).cloned())
        }
    }

    fn rules_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loader_with_programmatic_rules() {
        let replacer = ReplacerLoader::new()
            .without_logging_init()
            .with_provider(MockConfigProvider::new(&[
                ("server.port", serde_json::json!(9090)),
                ("server.host", serde_json::json!("0.0.0.0")),
            ]))
            .with_rules(RuleSet::from_pairs([("a", "b")]))
            .build()
            .await
            .unwrap();

        assert_eq!(replacer.rules().len(), 1);
        let server = replacer.server().config();
        assert_eq!(server.port, 9090);
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.health_port, 8081);
        assert_eq!(replacer.server().core().filters.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_rules_file_from_config() {
        let file = rules_file("origin.example.com,cdn.example.com\n\nhttp://,https://\n");
        let replacer = ReplacerLoader::new()
            .without_logging_init()
            .with_provider(MockConfigProvider::new(&[(
                "rewrite.rules_file",
                serde_json::json!(file.path().to_str().unwrap()),
            )]))
            .build()
            .await
            .unwrap();

        assert_eq!(replacer.rules().len(), 2);
        assert_eq!(
            replacer.rules().rewrite_str("http://origin.example.com/").unwrap(),
            "https://cdn.example.com/"
        );
    }

    #[tokio::test]
    async fn test_missing_rules_is_fatal() {
        let err = ReplacerLoader::new()
            .without_logging_init()
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::RulesError(RuleError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_malformed_rules_is_fatal() {
        let file = rules_file("good,better\nno comma here\n");
        let err = ReplacerLoader::new()
            .without_logging_init()
            .with_rules_file(file.path())
            .build()
            .await
            .unwrap_err();

        match err {
            LoaderError::RulesError(RuleError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed rules, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_rules_file_is_fatal() {
        let err = ReplacerLoader::new()
            .without_logging_init()
            .with_rules_file("/nonexistent/rules.csv")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::RulesError(RuleError::Io { .. })));
    }

    #[tokio::test]
    async fn test_bad_config_file_is_fatal() {
        let err = ReplacerLoader::new()
            .without_logging_init()
            .with_config_file("/nonexistent/replacer.toml")
            .with_rules(RuleSet::new())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_with_config_and_overriding_provider() {
        let base = Config::builder()
            .with_provider(MockConfigProvider::new(&[
                ("server.port", serde_json::json!(8000)),
                ("proxy.timeout", serde_json::json!(3)),
            ]))
            .build();

        let replacer = ReplacerLoader::new()
            .without_logging_init()
            .with_config(base)
            .with_provider(MockConfigProvider::new(&[("server.port", serde_json::json!(9000))]))
            .with_rules(RuleSet::new())
            .build()
            .await
            .unwrap();

        assert_eq!(replacer.server().config().port, 9000);
        assert_eq!(replacer.config().get::<u64>("proxy.timeout").unwrap(), Some(3));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_overrides_file() {
        let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        config_file
            .write_all(b"[server]\nport = 7000\nhealth_port = 7001\n")
            .unwrap();
        unsafe {
            env::set_var("REPLACER_SERVER_PORT", "7500");
        }

        let result = ReplacerLoader::new()
            .without_logging_init()
            .with_config_file(config_file.path())
            .with_env_vars()
            .with_rules(RuleSet::new())
            .build()
            .await;

        unsafe {
            env::remove_var("REPLACER_SERVER_PORT");
        }

        let replacer = result.unwrap();
        assert_eq!(replacer.server().config().port, 7500);
        assert_eq!(replacer.server().config().health_port, 7001);
    }
}
