//! Schema and pattern generation through an external model
//!
//! Generation is an effectful, fallible boundary kept off the extraction
//! path: run it once per site structure, cache the result, and extract with
//! the cached definition from then on. A failed or unusable generation is
//! always an error, never an empty definition.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::{CachePayload, SchemaCache};
use crate::error::{CacheError, ExtractError, GenerationError};
use crate::patterns::PatternSetDefinition;
use crate::schema::SchemaDefinition;
use crate::settings::GeneratorSettings;

/// What the generated schema should capture
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaTarget {
    /// Natural-language description of the wanted data
    Query(String),
    /// Example of one wanted record
    Example(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRequest {
    /// Representative markup, ideally one or two repeated items
    pub sample_html: String,
    pub target: SchemaTarget,
    pub schema_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternRequest {
    /// Label the generated pattern is stored under
    pub label: String,
    pub sample_text: String,
    pub query: Option<String>,
    /// Values the pattern must match
    pub examples: Vec<String>,
}

/// Capability that infers definitions from samples
pub trait SchemaGenerator: Send + Sync {
    fn generate_schema(&self, request: &SchemaRequest) -> Result<SchemaDefinition, GenerationError>;

    fn generate_patterns(&self, request: &PatternRequest) -> Result<PatternSetDefinition, GenerationError>;
}

/// Generator backed by an OpenAI-compatible chat completions endpoint
pub struct LlmGenerator {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_sample_chars: usize,
}

impl LlmGenerator {
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self, GenerationError> {
        let base = url::Url::parse(&settings.api_base_url)
            .map_err(|e| GenerationError::NotConfigured(format!("invalid api_base_url: {}", e)))?;
        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(settings.timeout_secs)))
                .build(),
        );

        Ok(Self {
            agent,
            endpoint,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_sample_chars: settings.max_sample_chars,
        })
    }

    fn complete(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured("api_key is not set".to_string()))?;

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0
        })
        .to_string();

        debug!(endpoint = %self.endpoint, model = %self.model, "requesting generation");
        let response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
            .map_err(map_transport)?;

        let text = response.into_body().read_to_string().map_err(map_transport)?;
        completion_content(&text)
    }
}

impl SchemaGenerator for LlmGenerator {
    fn generate_schema(&self, request: &SchemaRequest) -> Result<SchemaDefinition, GenerationError> {
        let prompt = schema_prompt(request, self.max_sample_chars);
        let content = self.complete(SCHEMA_SYSTEM_PROMPT, &prompt)?;
        let schema = parse_schema_reply(&content, request.schema_name.as_deref())?;
        info!(schema = %schema.name, fields = schema.fields.len(), "generated schema");
        Ok(schema)
    }

    fn generate_patterns(&self, request: &PatternRequest) -> Result<PatternSetDefinition, GenerationError> {
        let prompt = pattern_prompt(request, self.max_sample_chars);
        let content = self.complete(PATTERN_SYSTEM_PROMPT, &prompt)?;
        let patterns = parse_patterns_reply(&content)?;
        info!(label = %request.label, "generated pattern set");
        Ok(patterns)
    }
}

fn map_transport(e: ureq::Error) -> GenerationError {
    match e {
        ureq::Error::Timeout(_) => GenerationError::Timeout,
        ureq::Error::StatusCode(code) => GenerationError::Status(code),
        other => GenerationError::Transport(other.to_string()),
    }
}

const SCHEMA_SYSTEM_PROMPT: &str = "You write reusable extraction schemas for HTML pages. \
Reply with a single JSON object and nothing else.";

const PATTERN_SYSTEM_PROMPT: &str = "You write regular expressions in Rust `regex` crate syntax \
(no look-around, no backreferences). Reply with a single JSON object and nothing else.";

fn schema_prompt(request: &SchemaRequest, max_chars: usize) -> String {
    let goal = match &request.target {
        SchemaTarget::Query(query) => format!("Data to extract: {}", query),
        SchemaTarget::Example(example) => format!("Each record should look like this example: {}", example),
    };

    format!(
        "Produce a schema of the form\n\
         {{\"name\": string, \"baseSelector\": css, \"baseFields\": [field], \"fields\": [field]}}\n\
         where field is {{\"name\", \"selector\", \"type\"}} and type is one of \
         text, attribute (add \"attribute\"), html, regex (add \"pattern\"), \
         nested or nested_list (add \"fields\"). Selectors are relative to the base element; \
         an empty selector means the element itself. Prefer stable classes and attributes \
         over positions.\n\n{}\n\nSample HTML:\n{}",
        goal,
        truncate_chars(&request.sample_html, max_chars)
    )
}

fn pattern_prompt(request: &PatternRequest, max_chars: usize) -> String {
    let mut prompt = format!(
        "Write one regular expression labelled \"{}\". Reply as {{\"{}\": \"<regex>\"}}.",
        request.label, request.label
    );
    if let Some(query) = &request.query {
        prompt.push_str(&format!("\nIt should match: {}", query));
    }
    if !request.examples.is_empty() {
        prompt.push_str(&format!("\nIt must match each of: {}", json!(request.examples)));
    }
    prompt.push_str("\n\nSample text:\n");
    prompt.push_str(truncate_chars(&request.sample_text, max_chars));
    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Pull the assistant message out of a chat completions response body
fn completion_content(body: &str) -> Result<String, GenerationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| GenerationError::Unparsable(format!("response is not JSON: {}", e)))?;
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| GenerationError::Unparsable("response has no message content".to_string()))
}

/// Model replies often wrap JSON in a markdown fence
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse and validate a generated schema
pub fn parse_schema_reply(content: &str, name: Option<&str>) -> Result<SchemaDefinition, GenerationError> {
    let mut schema: SchemaDefinition = serde_json::from_str(strip_fences(content))
        .map_err(|e| GenerationError::Unparsable(e.to_string()))?;

    if let Some(name) = name {
        schema.name = name.to_string();
    }
    validate_schema(&schema)?;
    Ok(schema)
}

/// Parse and validate a generated pattern set: either `{"label": "regex", ...}`
/// or a full `{"builtins": [...], "custom": {...}}` definition
pub fn parse_patterns_reply(content: &str) -> Result<PatternSetDefinition, GenerationError> {
    let value: Value = serde_json::from_str(strip_fences(content))
        .map_err(|e| GenerationError::Unparsable(e.to_string()))?;

    let is_full = value.get("builtins").is_some() || value.get("custom").is_some();
    let patterns = if is_full {
        serde_json::from_value(value).map_err(|e| GenerationError::Unparsable(e.to_string()))?
    } else {
        let custom = serde_json::from_value(value)
            .map_err(|e| GenerationError::Unparsable(format!("expected label -> regex object: {}", e)))?;
        PatternSetDefinition {
            builtins: Vec::new(),
            custom,
        }
    };

    validate_patterns(&patterns)?;
    Ok(patterns)
}

fn validate_schema(schema: &SchemaDefinition) -> Result<(), GenerationError> {
    if schema.fields.is_empty() {
        return Err(GenerationError::EmptyResult);
    }
    schema.compile().map_err(GenerationError::InvalidSchema)?;
    Ok(())
}

fn validate_patterns(patterns: &PatternSetDefinition) -> Result<(), GenerationError> {
    if patterns.is_empty() {
        return Err(GenerationError::EmptyResult);
    }
    patterns.compile().map_err(GenerationError::InvalidSchema)?;
    Ok(())
}

/// How cache failures are treated by the get-or-generate helpers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Cache failures are returned to the caller
    #[default]
    Strict,
    /// Cache failures are logged and the definition is regenerated
    Degraded,
}

/// Return the schema cached under `key`, generating and caching it on a miss
pub fn load_or_generate_schema(
    cache: &dyn SchemaCache,
    key: &str,
    generator: &dyn SchemaGenerator,
    request: &SchemaRequest,
    mode: CacheMode,
) -> Result<SchemaDefinition, ExtractError> {
    load_or_generate(
        cache,
        key,
        mode,
        CachePayload::into_schema,
        || {
            let schema = generator.generate_schema(request)?;
            validate_schema(&schema)?;
            Ok(schema)
        },
        CachePayload::Schema,
    )
}

/// Return the pattern set cached under `key`, generating and caching it on a miss
pub fn load_or_generate_patterns(
    cache: &dyn SchemaCache,
    key: &str,
    generator: &dyn SchemaGenerator,
    request: &PatternRequest,
    mode: CacheMode,
) -> Result<PatternSetDefinition, ExtractError> {
    load_or_generate(
        cache,
        key,
        mode,
        CachePayload::into_patterns,
        || {
            let patterns = generator.generate_patterns(request)?;
            validate_patterns(&patterns)?;
            Ok(patterns)
        },
        CachePayload::Patterns,
    )
}

fn load_or_generate<T: Clone>(
    cache: &dyn SchemaCache,
    key: &str,
    mode: CacheMode,
    from_payload: impl Fn(CachePayload, &str) -> Result<T, CacheError>,
    generate: impl FnOnce() -> Result<T, GenerationError>,
    wrap: impl Fn(T) -> CachePayload,
) -> Result<T, ExtractError> {
    match cache.get(key).and_then(|entry| entry.map(|e| from_payload(e.payload, key)).transpose()) {
        Ok(Some(definition)) => {
            debug!(key, "using cached definition");
            return Ok(definition);
        }
        Ok(None) => debug!(key, "no cached definition, generating"),
        Err(e) => tolerate(mode, e)?,
    }

    let definition = generate()?;
    if let Err(e) = cache.put(key, wrap(definition.clone())) {
        tolerate(mode, e)?;
    }
    Ok(definition)
}

fn tolerate(mode: CacheMode, error: CacheError) -> Result<(), ExtractError> {
    match mode {
        CacheMode::Strict => Err(error.into()),
        CacheMode::Degraded => {
            warn!(error = %error, "cache unavailable, continuing without it");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryCache};
    use crate::error::ConfigError;
    use crate::schema::SelectorSpec;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Stub {
        calls: AtomicUsize,
        schema: Result<SchemaDefinition, &'static str>,
    }

    impl Stub {
        fn ok(schema: SchemaDefinition) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                schema: Ok(schema),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                schema: Err("upstream down"),
            }
        }
    }

    impl SchemaGenerator for Stub {
        fn generate_schema(&self, _request: &SchemaRequest) -> Result<SchemaDefinition, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.schema
                .clone()
                .map_err(|reason| GenerationError::Transport(reason.to_string()))
        }

        fn generate_patterns(&self, request: &PatternRequest) -> Result<PatternSetDefinition, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PatternSetDefinition::default().with_custom(request.label.clone(), r"SKU-\d+"))
        }
    }

    /// Cache whose every operation fails
    struct Broken;

    impl SchemaCache for Broken {
        fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("disk gone".into()))
        }

        fn put(&self, _key: &str, _payload: CachePayload) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("disk gone".into()))
        }

        fn remove(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
    }

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new("Jobs", "li.job", vec![SelectorSpec::text("title", "h3").into()])
    }

    fn request() -> SchemaRequest {
        SchemaRequest {
            sample_html: "<li class=\"job\"><h3>Engineer</h3></li>".into(),
            target: SchemaTarget::Query("job titles".into()),
            schema_name: None,
        }
    }

    #[test]
    fn test_generates_once_then_reuses_cache() {
        let cache = MemoryCache::new();
        let generator = Stub::ok(schema());

        for _ in 0..3 {
            let got = load_or_generate_schema(&cache, "jobs/v1", &generator, &request(), CacheMode::Strict).unwrap();
            assert_eq!(got, schema());
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generation_failure_is_reported_and_not_cached() {
        let cache = MemoryCache::new();
        let err = load_or_generate_schema(&cache, "jobs/v1", &Stub::failing(), &request(), CacheMode::Strict)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Generation(GenerationError::Transport(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_generated_schema_is_rejected() {
        let cache = MemoryCache::new();
        let bad = SchemaDefinition::new("Bad", "li[", vec![SelectorSpec::text("t", "h3").into()]);
        let err = load_or_generate_schema(&cache, "k", &Stub::ok(bad), &request(), CacheMode::Strict).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Generation(GenerationError::InvalidSchema(ConfigError::InvalidSelector { .. }))
        ));

        let empty = SchemaDefinition::new("Empty", "li", vec![]);
        let err = load_or_generate_schema(&cache, "k", &Stub::ok(empty), &request(), CacheMode::Strict).unwrap_err();
        assert!(matches!(err, ExtractError::Generation(GenerationError::EmptyResult)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_failures_by_mode() {
        let generator = Stub::ok(schema());
        let err = load_or_generate_schema(&Broken, "k", &generator, &request(), CacheMode::Strict).unwrap_err();
        assert!(matches!(err, ExtractError::Cache(_)));

        let got = load_or_generate_schema(&Broken, "k", &generator, &request(), CacheMode::Degraded).unwrap();
        assert_eq!(got, schema());
        let again = load_or_generate_schema(&Broken, "k", &generator, &request(), CacheMode::Degraded).unwrap();
        assert_eq!(again, schema());
        // degraded mode regenerates every time
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pattern_generation_is_cached() {
        let cache = MemoryCache::new();
        let generator = Stub::ok(schema());
        let request = PatternRequest {
            label: "Sku".into(),
            sample_text: "SKU-1 SKU-22".into(),
            query: None,
            examples: vec!["SKU-1".into()],
        };
        let first = load_or_generate_patterns(&cache, "sku", &generator, &request, CacheMode::Strict).unwrap();
        let second = load_or_generate_patterns(&cache, "sku", &generator, &request, CacheMode::Strict).unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        // a schema stored under a pattern key is a mismatch, not a silent miss
        cache.put("mixed", CachePayload::Schema(schema())).unwrap();
        let err = load_or_generate_patterns(&cache, "mixed", &generator, &request, CacheMode::Strict).unwrap_err();
        assert!(matches!(err, ExtractError::Cache(CacheError::PayloadMismatch { .. })));
    }

    #[test]
    fn test_parse_schema_reply() {
        let reply = "```json\n{\"name\": \"x\", \"baseSelector\": \"div.item\", \"fields\": [\
                     {\"name\": \"title\", \"selector\": \"h2\", \"type\": \"text\"}]}\n```";
        let schema = parse_schema_reply(reply, Some("Items")).unwrap();
        assert_eq!(schema.name, "Items");
        assert_eq!(schema.base_selector, "div.item");

        assert!(matches!(
            parse_schema_reply("Sure! Here is your schema", None),
            Err(GenerationError::Unparsable(_))
        ));
        assert!(matches!(
            parse_schema_reply(r#"{"name": "x", "baseSelector": "div", "fields": []}"#, None),
            Err(GenerationError::EmptyResult)
        ));
    }

    #[test]
    fn test_parse_patterns_reply() {
        let simple = parse_patterns_reply(r#"{"OrderId": "ORD-\\d{6}"}"#).unwrap();
        assert_eq!(simple.custom["OrderId"], r"ORD-\d{6}");

        let full = parse_patterns_reply(r#"{"builtins": ["Email"], "custom": {}}"#).unwrap();
        assert_eq!(full.builtins.len(), 1);

        assert!(matches!(
            parse_patterns_reply(r#"{"Bad": "(oops"}"#),
            Err(GenerationError::InvalidSchema(_))
        ));
        assert!(matches!(parse_patterns_reply("{}"), Err(GenerationError::EmptyResult)));
    }

    #[test]
    fn test_prompt_truncates_sample_on_char_boundary() {
        let req = SchemaRequest {
            sample_html: "ééééé".into(),
            target: SchemaTarget::Example(json!({"title": "x"})),
            schema_name: None,
        };
        let prompt = schema_prompt(&req, 3);
        assert!(prompt.ends_with("ééé"));
        assert!(prompt.contains(r#"{"title":"x"}"#));
    }

    fn settings(base: String, timeout_secs: u64) -> GeneratorSettings {
        GeneratorSettings {
            api_base_url: base,
            api_key: Some("test-key".into()),
            model: "test-model".into(),
            timeout_secs,
            max_sample_chars: 1000,
        }
    }

    /// Serve one canned HTTP response after reading the full request
    fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[test]
    fn test_llm_generator_round_trip() {
        let content = json!({
            "name": "Jobs",
            "baseSelector": "li.job",
            "fields": [{"name": "title", "selector": "h3", "type": "text"}]
        })
        .to_string();
        let body = json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string();
        let base = serve_once("200 OK", body);

        let generator = LlmGenerator::from_settings(&settings(base, 10)).unwrap();
        let generated = generator.generate_schema(&request()).unwrap();
        assert_eq!(generated, schema());
    }

    #[test]
    fn test_llm_generator_http_error() {
        let base = serve_once("500 Internal Server Error", "{}".into());
        let generator = LlmGenerator::from_settings(&settings(base, 10)).unwrap();
        assert!(matches!(
            generator.generate_schema(&request()),
            Err(GenerationError::Status(500))
        ));
    }

    #[test]
    fn test_llm_generator_times_out() {
        // accepted by the kernel backlog but never answered
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        let generator = LlmGenerator::from_settings(&settings(base, 1)).unwrap();
        assert!(matches!(
            generator.generate_schema(&request()),
            Err(GenerationError::Timeout)
        ));
        drop(listener);
    }

    #[test]
    fn test_llm_generator_requires_key() {
        let mut s = settings("http://127.0.0.1:9/v1".into(), 1);
        s.api_key = None;
        let generator = LlmGenerator::from_settings(&s).unwrap();
        assert!(matches!(
            generator.generate_schema(&request()),
            Err(GenerationError::NotConfigured(_))
        ));
        assert!(LlmGenerator::from_settings(&settings("not a url".into(), 1)).is_err());
    }
}
