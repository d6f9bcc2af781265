use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use url::Url;

use crate::errors::TransportError;
use crate::models::TaskMessage;

/// An outbound request ready to be sent, built from a [`TaskMessage`].
#[derive(Debug, Clone)]
pub struct OutboundRequest {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
}

impl OutboundRequest {
  /// Fails when the method or a header cannot be represented on the wire.
  /// Every value of a multi-valued header is appended.
  pub fn from_message(message: &TaskMessage) -> Result<Self, TransportError> {
    let method = Method::from_bytes(message.method.as_bytes())
      .map_err(|e| TransportError::InvalidRequest(format!("method {:?}: {}", message.method, e)))?;

    let mut headers = HeaderMap::new();
    for (name, values) in &message.headers {
      let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
      for value in values {
        let header_value = HeaderValue::from_str(value)
          .map_err(|e| TransportError::InvalidRequest(format!("header {:?} value: {}", name, e)))?;
        headers.append(header_name.clone(), header_value);
      }
    }

    Ok(Self {
      method,
      url: message.url.clone(),
      headers,
    })
  }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
  pub status: u16,
  pub content_length: Option<u64>,
  pub headers: HeaderMap,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
  /// Performs one request. `Err` means no response was received at all.
  async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

/// Transport over a shared [`reqwest::Client`] with its default settings.
/// The response body is never read.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
  async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
    let response = self.client
      .request(request.method, request.url)
      .headers(request.headers)
      .send()
      .await?;

    Ok(OutboundResponse {
      status: response.status().as_u16(),
      content_length: response.content_length(),
      headers: response.headers().clone(),
    })
  }
}
