use serde_json::{Map, Value};

use super::ConfigError;

pub fn validate_settings(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimensions", "dimensions", 1, 65_536)?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_optional_string_field(generation, "generation.base_url", "base_url")?;
        validate_optional_string_field(generation, "generation.model", "model")?;
        validate_f64_field(generation, "generation.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(generation, "generation.max_tokens", "max_tokens", 1, 1_000_000)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.k", "k", 1, 100)?;
    }

    if let Some(ingest) = expect_optional_object(root, "ingest")? {
        validate_u64_field(ingest, "ingest.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(ingest, "ingest.chunk_overlap", "chunk_overlap", 0, 1_000_000)?;
        validate_u64_field(ingest, "ingest.batch_size", "batch_size", 1, 10_000)?;
        validate_u64_field(ingest, "ingest.min_chunk_chars", "min_chunk_chars", 0, 1_000_000)?;
        validate_u64_field(
            ingest,
            "ingest.fetch_timeout_secs",
            "fetch_timeout_secs",
            1,
            86_400,
        )?;

        let size = ingest.get("chunk_size").and_then(Value::as_u64).unwrap_or(4000);
        let overlap = ingest.get("chunk_overlap").and_then(Value::as_u64).unwrap_or(200);
        if overlap >= size {
            return Err(ConfigError::Invalid {
                path: "ingest.chunk_overlap".to_string(),
                reason: "must be smaller than ingest.chunk_size".to_string(),
            });
        }
    }

    if let Some(questions) = expect_optional_object(root, "questions")? {
        validate_f64_field(questions, "questions.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(questions, "questions.count", "count", 0, 20)?;
        validate_u64_field(
            questions,
            "questions.max_context_chars",
            "max_context_chars",
            1,
            1_000_000,
        )?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(()),
        Some(_) => Err(ConfigError::Invalid {
            path: path.to_string(),
            reason: "value cannot be empty".to_string(),
        }),
        None => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: format!("{}[{}]", path, index),
                reason: "value cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

fn range_error<T: std::fmt::Display>(path: &str, min: T, max: T) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("must be between {} and {}", min, max),
    }
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("expected {}", expected),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejects_non_object_sections() {
        let err = validate_settings(&json!({ "retrieval": 5 })).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref path, .. } if path == "retrieval"));
    }

    #[test]
    fn rejects_blank_origins() {
        let err = validate_settings(&json!({
            "server": { "cors_allowed_origins": ["http://localhost:3000", " "] }
        }))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref path, .. } if path == "server.cors_allowed_origins[1]")
        );
    }

    #[test]
    fn accepts_full_document() {
        validate_settings(&json!({
            "embedding": { "model": "embedding-3", "dimensions": 1024 },
            "generation": { "temperature": 0.3, "max_tokens": 512 },
            "retrieval": { "k": 4 },
            "ingest": { "chunk_size": 1000, "chunk_overlap": 100, "batch_size": 32 },
            "questions": { "count": 4 },
            "server": { "cors_allowed_origins": ["http://localhost:3000"] }
        }))
        .unwrap();
    }
}
