//! OpenAI-compatible structured-extraction client.

use std::{sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use time::PrimitiveDateTime;

use super::{Inference, InferenceError};
use crate::transform::clean;

const START_PROMPT: &str = "Below are a date string and a time string. Return the ISO 8601 datetime that \
represents the values from both the date and time strings. The datetime must not have a time zone. \
The input date string is in the format m/d/YY and the input time string is in the format HH:MM a.m. \
or HH:MM p.m. If the input time is not provided, assume it is 00:00:00.";

const RESTORATION_PROMPT: &str = "Below is a string that describes the restoration date and time of a \
power outage. Convert it to an ISO 8601 datetime, considering the following:
- The restoration datetime is less than 6 months after the start date of the event.
- The string is usually in the format 'HH:MM a.m./p.m. Month D', e.g. '6:00 a.m. June 2', but may differ.
- Use the start date's year, unless the restoration month and day fall before the start date; then use the following year.
- The datetime must not have a time zone.
- If only a date is present, assume the time is 23:59:59.";

const NUMBER_PROMPT: &str = "Below is a string that is supposed to represent an integer. Return the \
numeric value as an integer.
- If the string specifies a range, return the highest value in the range.
- If the string uses English words for the number or an approximate number, return the closest numeric value.
- If the string is empty or says the value is not available, return -1.";

// A trailing `Z` or `±HH[:MM]` after a clock time.
static UTC_OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)\s*(?:[Zz]|[+-]\d{2}(?::?\d{2})?)$").expect("valid regex")
});

/// Drops a UTC designator or offset; the wall-clock value is kept as is.
fn without_offset(raw: &str) -> &str {
    match UTC_OFFSET_RE.captures(raw) {
        Some(c) => c.get(1).map_or(raw, |m| m.as_str()),
        None => raw,
    }
}

/// Target shape of a structured answer.
#[derive(Debug, Clone, Copy)]
enum Shape {
    Datetime,
    Number,
}

impl Shape {
    fn response_format(self) -> Value {
        let (name, property, kind) = match self {
            Shape::Datetime => ("DateResponse", "datetime", "string"),
            Shape::Number => ("NumberResponse", "number", "integer"),
        };
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "strict": true,
                "schema": {
                    "type": "object",
                    "properties": { property: { "type": kind } },
                    "required": [property],
                    "additionalProperties": false
                }
            }
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct DateResponse {
    datetime: String,
}

#[derive(Deserialize)]
struct NumberResponse {
    number: i64,
}

/// Chat-completions client with JSON-schema constrained answers.
///
/// One `reqwest::Client` is shared by every call; the client holds no
/// per-call state, so concurrent calls need no locking.
pub struct OpenAiInference {
    /// Base URL (e.g., "https://api.openai.com")
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: Arc<Client>,
}

impl OpenAiInference {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration, client: Arc<Client>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout,
            client,
        }
    }

    async fn extract<T: DeserializeOwned>(&self, system: &str, user: &str, shape: Shape) -> Result<T, InferenceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: shape.response_format(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    InferenceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InferenceError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::InvalidResponse(format!("failed to read response body: {e}")))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::InvalidResponse(format!("failed to parse chat response: {e}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| InferenceError::InvalidResponse("response has no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(InferenceError::Refused(refusal));
        }
        let content = message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| InferenceError::InvalidResponse("empty structured answer".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| InferenceError::InvalidResponse(format!("answer {content:?} does not match shape: {e}")))
    }

    async fn extract_datetime(&self, system: &str, user: &str) -> Result<PrimitiveDateTime, InferenceError> {
        let answer: DateResponse = self.extract(system, user, Shape::Datetime).await?;
        let raw = answer.datetime.trim();
        if raw.is_empty() {
            return Err(InferenceError::InvalidResponse("empty datetime".to_string()));
        }
        let local = without_offset(raw);
        if local.len() != raw.len() {
            tracing::debug!(answer = raw, "dropping timezone from inferred datetime");
        }
        clean::parse_iso_datetime(local)
            .ok_or_else(|| InferenceError::InvalidResponse(format!("unparseable datetime {raw:?}")))
    }
}

#[async_trait::async_trait]
impl Inference for OpenAiInference {
    async fn resolve_number(&self, raw: &str) -> Result<Option<u64>, InferenceError> {
        let answer: NumberResponse = self.extract(NUMBER_PROMPT, raw, Shape::Number).await?;
        match answer.number {
            -1 => Ok(None),
            n if n < 0 => Err(InferenceError::InvalidResponse(format!("negative number {n}"))),
            n => Ok(Some(n as u64)),
        }
    }

    async fn resolve_start_datetime(&self, date: &str, time: Option<&str>) -> Result<PrimitiveDateTime, InferenceError> {
        let user = format!("Date: {date}\nTime: {}", time.unwrap_or("None"));
        self.extract_datetime(START_PROMPT, &user).await
    }

    async fn resolve_restoration_datetime(
        &self,
        date: &str,
        restoration: &str,
    ) -> Result<Option<PrimitiveDateTime>, InferenceError> {
        if clean::is_not_available(restoration) {
            return Ok(None);
        }

        let user = format!("Start Date: {date}\nRestoration Time: {restoration}");
        let restored = self.extract_datetime(RESTORATION_PROMPT, &user).await?;

        if let Some(start) = clean::parse_date(date) {
            if !clean::within_restoration_window(start, restored) {
                return Err(InferenceError::OutOfWindow {
                    start: date.to_string(),
                    restored: restored.to_string(),
                });
            }
        }

        Ok(Some(restored))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> OpenAiInference {
        OpenAiInference::new(
            server.uri(),
            "test-key".to_string(),
            "test-model".to_string(),
            Duration::from_secs(5),
            Arc::new(Client::new()),
        )
    }

    fn answer(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[tokio::test]
    async fn number_answer_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "response_format": { "json_schema": { "name": "NumberResponse" } }
            })))
            .respond_with(answer(r#"{"number": 3000}"#))
            .expect(1)
            .mount(&server)
            .await;

        let n = client_for(&server).resolve_number("about three thousand").await.expect("number");
        assert_eq!(n, Some(3000));
    }

    #[tokio::test]
    async fn minus_one_means_not_available() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"number": -1}"#))
            .mount(&server)
            .await;

        let n = client_for(&server).resolve_number("unknown").await.expect("number");
        assert_eq!(n, None);
    }

    #[tokio::test]
    async fn start_datetime_is_timezone_free() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"datetime": "2002-01-05T15:00:00"}"#))
            .mount(&server)
            .await;

        let dt = client_for(&server)
            .resolve_start_datetime("1/5/02", Some("3 in the afternoon"))
            .await
            .expect("datetime");
        assert_eq!(dt, datetime!(2002-01-05 15:00:00));
    }

    #[tokio::test]
    async fn zoned_answer_keeps_its_wall_clock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"datetime": "2002-01-05T15:00:00Z"}"#))
            .mount(&server)
            .await;

        let dt = client_for(&server)
            .resolve_start_datetime("1/5/02", Some("3 in the afternoon"))
            .await
            .expect("datetime");
        assert_eq!(dt, datetime!(2002-01-05 15:00:00));
    }

    #[test]
    fn offsets_are_stripped_after_a_clock_time_only() {
        assert_eq!(without_offset("2002-01-05T15:00:00Z"), "2002-01-05T15:00:00");
        assert_eq!(without_offset("2002-01-05T15:00:00+00:00"), "2002-01-05T15:00:00");
        assert_eq!(without_offset("2002-01-05T15:00:00.000-0500"), "2002-01-05T15:00:00.000");
        assert_eq!(without_offset("2002-01-05T15:00"), "2002-01-05T15:00");
        assert_eq!(without_offset("2002-01-05"), "2002-01-05");
    }

    #[tokio::test]
    async fn malformed_answer_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"datetime": "sometime"}"#))
            .mount(&server)
            .await;

        let res = client_for(&server).resolve_start_datetime("1/5/02", None).await;
        assert!(matches!(res, Err(InferenceError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(""))
            .mount(&server)
            .await;

        let res = client_for(&server).resolve_number("x").await;
        assert!(matches!(res, Err(InferenceError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn refusal_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": null, "refusal": "no" } }]
            })))
            .mount(&server)
            .await;

        let res = client_for(&server).resolve_number("x").await;
        assert!(matches!(res, Err(InferenceError::Refused(_))));
    }

    #[tokio::test]
    async fn upstream_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let res = client_for(&server).resolve_number("x").await;
        match res {
            Err(InferenceError::Upstream { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn restoration_sentinel_skips_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"datetime": "2002-01-06T00:00:00"}"#))
            .expect(0)
            .mount(&server)
            .await;

        let res = client_for(&server).resolve_restoration_datetime("1/5/02", "N/A").await;
        assert!(matches!(res, Ok(None)));
    }

    #[tokio::test]
    async fn restoration_outside_window_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(r#"{"datetime": "2003-03-01T23:59:59"}"#))
            .mount(&server)
            .await;

        let res = client_for(&server)
            .resolve_restoration_datetime("6/1/02", "early March")
            .await;
        assert!(matches!(res, Err(InferenceError::OutOfWindow { .. })));
    }

    #[tokio::test]
    async fn restoration_within_window_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "response_format": { "json_schema": { "name": "DateResponse" } }
            })))
            .respond_with(answer(r#"{"datetime": "2002-06-02T06:00:00"}"#))
            .mount(&server)
            .await;

        let res = client_for(&server)
            .resolve_restoration_datetime("6/1/02", "by dawn on the 2nd")
            .await
            .expect("restoration");
        assert_eq!(res, Some(datetime!(2002-06-02 06:00:00)));
    }
}
