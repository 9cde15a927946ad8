use super::{Ticket, TicketCreate, TicketError};
use crate::config::ClientConfig;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// JSON client for the ticket endpoints.
#[derive(Debug, Clone)]
pub struct TicketClient {
    client: Client,
    url: String,
}

impl TicketClient {
    pub fn new(config: &ClientConfig) -> Result<Self, TicketError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            url: config.tickets_url(),
        })
    }

    pub async fn list(&self) -> Result<Vec<Ticket>, TicketError> {
        // The backend mounts the collection with a trailing slash.
        self.send(self.client.get(format!("{}/", self.url))).await
    }

    pub async fn get(&self, id: &str) -> Result<Ticket, TicketError> {
        self.send(self.client.get(format!("{}/{id}", self.url))).await
    }

    pub async fn create(&self, ticket: &TicketCreate) -> Result<Ticket, TicketError> {
        ticket.validate()?;
        self.send(self.client.post(format!("{}/", self.url)).json(ticket))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, TicketError> {
        let resp = req.send().await.map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(&text).unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
                .trim_end()
                .to_string()
            });
            tracing::error!(status = status.as_u16(), message = %message, "ticket API error");
            return Err(TicketError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data = resp.json::<T>().await.map_err(classify)?;
        tracing::debug!("ticket API success");
        Ok(data)
    }
}

fn classify(e: reqwest::Error) -> TicketError {
    if e.is_timeout() {
        TicketError::Timeout
    } else {
        TicketError::Http(e)
    }
}

/// `detail` is a string for handled errors and a list for validation errors.
fn error_message(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ErrorBody>(body).ok()?.detail?;
    match detail {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::TicketCategory;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ticket_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": "Printer on fire",
            "description": "It is literally on fire",
            "category": "Other",
            "tags": ["hardware"],
            "image": null,
            "ai_summary": "Hardware incident",
            "created_at": "2025-01-01T10:00:00"
        })
    }

    fn client_for(server: &MockServer) -> TicketClient {
        TicketClient::new(&ClientConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_list_tickets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tickets/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([ticket_json("a")])),
            )
            .mount(&server)
            .await;

        let tickets = client_for(&server).list().await.expect("list tickets");
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].ai_summary.as_deref(), Some("Hardware incident"));
    }

    #[tokio::test]
    async fn test_get_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tickets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ticket_json("abc")))
            .mount(&server)
            .await;

        let ticket = client_for(&server).get("abc").await.expect("get ticket");
        assert_eq!(ticket.id, "abc");
    }

    #[tokio::test]
    async fn test_create_ticket_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tickets/"))
            .and(body_json(serde_json::json!({
                "title": "Printer on fire",
                "description": "It is literally on fire",
                "category": "Other",
                "tags": ["hardware"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ticket_json("new")))
            .expect(1)
            .mount(&server)
            .await;

        let draft = TicketCreate {
            title: "Printer on fire".into(),
            description: "It is literally on fire".into(),
            category: TicketCategory::Other,
            tags: vec!["hardware".into()],
            image: None,
        };
        let created = client_for(&server).create(&draft).await.expect("create");
        assert_eq!(created.id, "new");
    }

    #[tokio::test]
    async fn test_content_type_sent_once_and_only_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ticket_json("new")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let draft = TicketCreate {
            title: "Printer on fire".into(),
            description: "It is literally on fire".into(),
            category: TicketCategory::Other,
            tags: vec![],
            image: None,
        };
        client.create(&draft).await.expect("create");
        client.list().await.expect("list");

        let requests = server.received_requests().await.expect("recording enabled");
        assert_eq!(requests.len(), 2);
        let post: Vec<&str> = requests[0]
            .headers
            .get_all("content-type")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(post, vec!["application/json"]);
        assert!(requests[1].headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_invalid_draft_never_hits_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let draft = TicketCreate {
            title: "Hi".into(),
            description: "It is literally on fire".into(),
            category: TicketCategory::Other,
            tags: vec![],
            image: None,
        };
        let err = client_for(&server).create(&draft).await.unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));
    }

    #[tokio::test]
    async fn test_api_error_uses_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({ "detail": "Rate limit exceeded" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let draft = TicketCreate {
            title: "Printer on fire".into(),
            description: "It is literally on fire".into(),
            category: TicketCategory::Other,
            tags: vec![],
            image: None,
        };
        match client.create(&draft).await.unwrap_err() {
            TicketError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let err = client.get("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(server.uri());
        config.request_timeout = Duration::from_millis(50);
        let err = TicketClient::new(&config).unwrap().list().await.unwrap_err();
        assert!(matches!(err, TicketError::Timeout));
    }
}
