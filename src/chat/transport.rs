use super::{ChatError, ChatPayload};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};

/// Raw response body, one item per network read.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// Opens the streamed response for one chat request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_stream(&self, url: &str, payload: &ChatPayload) -> Result<ByteStream, ChatError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, url: &str, payload: &ChatPayload) -> Result<ByteStream, ChatError> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            };
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if status == StatusCode::NO_CONTENT || resp.content_length() == Some(0) {
            return Err(ChatError::MissingBody);
        }

        Ok(resp.bytes_stream().map_err(ChatError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> ChatPayload {
        ChatPayload {
            message: "hi".into(),
        }
    }

    #[tokio::test]
    async fn test_streams_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/global/stream"))
            .and(header("accept", "text/event-stream"))
            .and(body_json(serde_json::json!({ "message": "hi" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: {\"text\":\"Hi\"}\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/api/chat/global/stream", server.uri());
        let body = HttpTransport::new()
            .open_stream(&url, &payload())
            .await
            .expect("open stream");
        let bytes: Vec<Bytes> = body.try_collect().await.expect("read body");
        let joined: Vec<u8> = bytes.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(joined, b"data: {\"text\":\"Hi\"}\n");
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let url = format!("{}/api/chat/global/stream", server.uri());
        let err = HttpTransport::new()
            .open_stream(&url, &payload())
            .await
            .err()
            .expect("should fail");
        assert_eq!(err.to_string(), "HTTP 429: slow down");
    }

    #[tokio::test]
    async fn test_empty_error_body_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = format!("{}/x", server.uri());
        let err = HttpTransport::new()
            .open_stream(&url, &payload())
            .await
            .err()
            .expect("should fail");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[tokio::test]
    async fn test_no_content_is_missing_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let url = format!("{}/x", server.uri());
        let err = HttpTransport::new()
            .open_stream(&url, &payload())
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, ChatError::MissingBody));
    }

    #[tokio::test]
    async fn test_empty_success_body_is_missing_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("{}/x", server.uri());
        let err = HttpTransport::new()
            .open_stream(&url, &payload())
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, ChatError::MissingBody));
    }
}
