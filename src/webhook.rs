use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Why a webhook did not accept a forwarded message or file.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// JSON body posted to the message webhook.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessagePayload {
    pub text: String,
    pub user_id: u64,
    pub first_name: String,
    pub username: Option<String>,
}

/// A downloaded document plus the sender fields sent alongside it.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    pub user_id: u64,
    pub first_name: String,
    pub username: Option<String>,
}

impl FileUpload {
    fn into_form(self) -> Result<Form, DeliveryError> {
        let mut part = Part::bytes(self.bytes).file_name(self.file_name);
        if let Some(mime) = &self.mime_type {
            part = part.mime_str(mime)?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("user_id", self.user_id.to_string())
            .text("first_name", self.first_name);

        // n8n sees no field at all for users without a username
        if let Some(username) = self.username {
            form = form.text("username", username);
        }

        Ok(form)
    }
}

pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build webhook HTTP client")?;
        Ok(Self { client })
    }

    /// POST a text message as JSON.
    pub async fn post_message(
        &self,
        url: &str,
        payload: &MessagePayload,
    ) -> Result<(), DeliveryError> {
        debug!("Posting message from user {} to webhook", payload.user_id);
        deliver(self.client.post(url).json(payload)).await
    }

    /// POST a document as multipart/form-data.
    pub async fn post_file(&self, url: &str, upload: FileUpload) -> Result<(), DeliveryError> {
        debug!(
            "Posting file '{}' ({} bytes) from user {} to webhook",
            upload.file_name,
            upload.bytes.len(),
            upload.user_id
        );
        let form = upload.into_form()?;
        deliver(self.client.post(url).multipart(form)).await
    }
}

async fn deliver(request: RequestBuilder) -> Result<(), DeliveryError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DeliveryError::Status { status, body });
    }

    debug!("Webhook accepted delivery ({})", status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(text: &str) -> MessagePayload {
        MessagePayload {
            text: text.to_string(),
            user_id: 42,
            first_name: "Ada".to_string(),
            username: None,
        }
    }

    fn upload(username: Option<&str>) -> FileUpload {
        FileUpload {
            file_name: "report.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.4 fake".to_vec(),
            user_id: 42,
            first_name: "Ada".to_string(),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_payload_serializes_null_username() {
        let value = serde_json::to_value(payload("hello")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "text": "hello",
                "user_id": 42,
                "first_name": "Ada",
                "username": null
            })
        );
    }

    #[tokio::test]
    async fn test_post_message_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/msg"))
            .and(body_json(serde_json::json!({
                "text": "hello",
                "user_id": 42,
                "first_name": "Ada",
                "username": null
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebhookClient::new(None).unwrap();
        let url = format!("{}/webhook/msg", server.uri());
        client.post_message(&url, &payload("hello")).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_message_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("workflow crashed"))
            .mount(&server)
            .await;

        let client = WebhookClient::new(None).unwrap();
        let err = client
            .post_message(&server.uri(), &payload("hello"))
            .await
            .unwrap_err();

        match err {
            DeliveryError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "workflow crashed");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_message_unreachable() {
        // Reserve a free port, then close it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/webhook/msg", listener.local_addr().unwrap());
        drop(listener);

        let client = WebhookClient::new(Some(Duration::from_secs(5))).unwrap();
        let err = client.post_message(&url, &payload("hello")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_post_file_multipart_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/file"))
            .and(header_regex("content-type", "^multipart/form-data; boundary="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebhookClient::new(None).unwrap();
        let url = format!("{}/webhook/file", server.uri());
        client.post_file(&url, upload(Some("ada_l"))).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains(r#"name="file"; filename="report.pdf""#));
        assert!(body.to_lowercase().contains("content-type: application/pdf"));
        assert!(body.contains("%PDF-1.4 fake"));
        assert!(body.contains(r#"name="user_id""#));
        assert!(body.contains("\r\n\r\n42\r\n"));
        assert!(body.contains(r#"name="first_name""#));
        assert!(body.contains(r#"name="username""#));
        assert!(body.contains("ada_l"));
    }

    #[tokio::test]
    async fn test_post_file_omits_missing_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = WebhookClient::new(None).unwrap();
        client.post_file(&server.uri(), upload(None)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(!body.contains(r#"name="username""#));
    }

    #[tokio::test]
    async fn test_post_file_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = WebhookClient::new(None).unwrap();
        let err = client.post_file(&server.uri(), upload(None)).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Status { status, .. } if status == StatusCode::NOT_FOUND
        ));
    }
}
