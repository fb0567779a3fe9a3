use crate::config::{parse_duration, Config};
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        let valid_providers = ["fastembed", "hashing"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        let timeout = config.embedding.timeout.trim();
        if !timeout.is_empty() {
            match parse_duration(timeout) {
                None => errors.push(ValidationError::new(
                    "embedding.timeout",
                    format!("Invalid duration format: {}", timeout),
                )),
                Some(d) if d.is_zero() => errors.push(ValidationError::new(
                    "embedding.timeout",
                    "Timeout must be greater than 0 (leave empty to disable)",
                )),
                Some(_) => {}
            }
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        let metric = &config.indexing.metric;
        if metric != "l2" && metric != "cosine" {
            errors.push(ValidationError::new(
                "indexing.metric",
                format!("Metric must be 'l2' or 'cosine', got '{}'", metric),
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_max_layer == 0 || config.indexing.hnsw_max_layer > 16 {
            errors.push(ValidationError::new(
                "indexing.hnsw_max_layer",
                "HNSW max_layer must be between 1 and 16",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.ingest.stream_buffer == 0 {
            errors.push(ValidationError::new(
                "ingest.stream_buffer",
                "Stream buffer must be greater than 0",
            ));
        }

        let interval = &config.ingest.inbox_poll_interval;
        match parse_duration(interval) {
            None => errors.push(ValidationError::new(
                "ingest.inbox_poll_interval",
                format!("Invalid duration format: {}", interval),
            )),
            Some(d) if d.is_zero() => errors.push(ValidationError::new(
                "ingest.inbox_poll_interval",
                "Poll interval must be greater than 0",
            )),
            Some(_) => {}
        }

        // Same normalisation as the directory loader: leading dot optional
        for ext in &config.ingest.extensions {
            let bare = ext.trim().trim_start_matches('.');
            if bare.is_empty() || bare.contains(['/', '\\']) {
                errors.push(ValidationError::new(
                    "ingest.extensions",
                    format!("Invalid extension: '{}'", ext),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_metric() {
        let mut config = Config::default();
        config.indexing.metric = "manhattan".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "openai".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut config = Config::default();
        config.indexing.vector_dim = 0;
        config.embedding.batch_size = 0;
        config.ingest.extensions = vec![".".to_string()];

        match ConfigValidator::validate(&config) {
            Err(RagError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_extensions_with_or_without_dot() {
        let mut config = Config::default();
        config.ingest.extensions = vec!["txt".to_string(), ".md".to_string(), "RST".to_string()];
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(RagError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.ingest.inbox_poll_interval = "0s".to_string();
        assert_eq!(error_paths(&config), vec!["ingest.inbox_poll_interval"]);

        config.ingest.inbox_poll_interval = "0ms".to_string();
        assert_eq!(error_paths(&config), vec!["ingest.inbox_poll_interval"]);
    }

    #[test]
    fn test_zero_embedding_timeout_rejected() {
        let mut config = Config::default();
        config.embedding.timeout = "0s".to_string();
        assert_eq!(error_paths(&config), vec!["embedding.timeout"]);

        config.embedding.timeout = "250ms".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.embedding.timeout = String::new();
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
