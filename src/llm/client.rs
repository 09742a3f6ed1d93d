use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, RequestError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the OpenAI-compatible completion API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (from OPENAI_API_KEY env var)
    pub api_key: String,
    /// Organization id (from OPENAI_API_ORG env var)
    pub organization: String,
    /// API root, without the `/chat/completions` suffix
    pub base_url: String,
    /// Model to use (e.g., "gpt-4o-mini")
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingEnv("OPENAI_API_KEY"))?;
        let organization =
            get("OPENAI_API_ORG").ok_or(ConfigError::MissingEnv("OPENAI_API_ORG"))?;

        let timeout = match get("OPENAI_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "OPENAI_TIMEOUT_SECONDS",
                    value: raw,
                })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            organization,
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
        })
    }

    /// Create with custom settings
    pub fn new(api_key: String, organization: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            organization,
            base_url,
            model,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single-shot chat completion endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the messages and return the first choice's text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RequestError>;
}

/// OpenAI chat completions client
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            ConfigError::InvalidEnv {
                name: "OPENAI_API_KEY",
                value: "<redacted>".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);

        let org = HeaderValue::from_str(&config.organization).map_err(|_| {
            ConfigError::InvalidEnv {
                name: "OPENAI_API_ORG",
                value: config.organization.clone(),
            }
        })?;
        headers.insert("OpenAI-Organization", org);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RequestError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        let response = self.client.post(self.chat_url()).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Api { status, body });
        }

        let body = response.text().await?;
        let response: ChatCompletionResponse = serde_json::from_str(&body)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(RequestError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().cloned().collect();
        move |name: &str| vars.get(name).map(|v| v.to_string())
    }

    fn test_client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig::new(
            "sk-test".to_string(),
            "org-test".to_string(),
            server.uri(),
            "gpt-4o-mini".to_string(),
        ))
        .unwrap()
    }

    #[test]
    fn test_config_requires_key_and_org() {
        let err = OpenAiConfig::from_lookup(lookup(&[("OPENAI_API_ORG", "org")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("OPENAI_API_KEY")));

        let vars = lookup(&[("OPENAI_API_KEY", "sk"), ("OPENAI_API_ORG", " ")]);
        let err = OpenAiConfig::from_lookup(vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("OPENAI_API_ORG")));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let vars = lookup(&[("OPENAI_API_KEY", "sk"), ("OPENAI_API_ORG", "org")]);
        let config = OpenAiConfig::from_lookup(vars).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let config = OpenAiConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("OPENAI_API_ORG", "org"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_TIMEOUT_SECONDS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let err = OpenAiConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("OPENAI_API_ORG", "org"),
            ("OPENAI_TIMEOUT_SECONDS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "OPENAI_TIMEOUT_SECONDS",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-organization", "org-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "prompt"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let content = client
            .complete(&[ChatMessage::system("sys"), ChatMessage::user("prompt")])
            .await
            .unwrap();

        assert_eq!(content, "first");
    }

    #[tokio::test]
    async fn test_complete_surfaces_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .complete(&[ChatMessage::user("prompt")])
            .await
            .unwrap_err();

        match err {
            RequestError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_complete_without_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .complete(&[ChatMessage::user("prompt")])
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_complete_rejects_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .complete(&[ChatMessage::user("prompt")])
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::InvalidResponse(_)));
    }
}
