use crate::error::GatewayError;
use crate::gateways::GatewayHeaders;
use crate::transport::{form, HttpTransport, OutboundRequest, TransportResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Form,
}

impl Encoding {
    fn content_type(&self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// Uniform result of one outbound call, whatever happened on the wire.
/// `status_code` is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGatewayEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub body: Option<Value>,
    pub error: Option<String>,
}

impl CallGatewayEnvelope {
    pub fn from_response(resp: TransportResponse) -> Self {
        let body = if resp.body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice::<Value>(&resp.body).unwrap_or_else(|_| {
                    Value::String(String::from_utf8_lossy(&resp.body).into_owned())
                }),
            )
        };
        let success = (200..300).contains(&resp.status);
        let error = if success {
            None
        } else {
            Some(format!("gateway responded with HTTP {}", resp.status))
        };
        Self {
            success,
            status_code: resp.status,
            body,
            error,
        }
    }

    pub fn unsent(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: 0,
            body: None,
            error: Some(message.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// The decoded body of a 2xx call, or a `Transport` error carrying the
    /// whole envelope.
    pub fn into_result(self) -> Result<Value, GatewayError> {
        if self.success {
            return Ok(self.body.unwrap_or(Value::Null));
        }
        let raw = self.to_value();
        Err(GatewayError::Transport {
            status_code: self.status_code,
            message: self
                .error
                .unwrap_or_else(|| "gateway call failed".to_string()),
            raw: Some(raw),
        })
    }
}

pub struct RequestExecutor {
    pub gateway: &'static str,
    pub base_url: String,
    pub headers: GatewayHeaders,
    pub transport: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    pub fn new(
        gateway: &'static str,
        base_url: impl Into<String>,
        headers: GatewayHeaders,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
            headers,
            transport,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
        encoding: Encoding,
    ) -> CallGatewayEnvelope {
        self.execute_with(method, path, payload, encoding, &GatewayHeaders::new())
            .await
    }

    pub async fn execute_with(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
        encoding: Encoding,
        extra_headers: &GatewayHeaders,
    ) -> CallGatewayEnvelope {
        let url = self.url(path);

        let mut headers = match header_map(self.headers.iter().chain(extra_headers.iter())) {
            Ok(h) => h,
            Err(msg) => {
                tracing::error!(gateway = self.gateway, %msg, "invalid outbound header");
                return CallGatewayEnvelope::unsent(msg);
            }
        };

        let body = payload.map(|p| match encoding {
            Encoding::Json => serde_json::to_vec(p).unwrap_or_default(),
            Encoding::Form => form::encode(p).into_bytes(),
        });
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(encoding.content_type()));
        }

        let request = OutboundRequest {
            method: method.clone(),
            url: url.clone(),
            headers,
            body,
        };

        match self.transport.send(request).await {
            Ok(resp) => {
                let envelope = CallGatewayEnvelope::from_response(resp);
                if envelope.success {
                    tracing::debug!(gateway = self.gateway, %method, %url, status_code = envelope.status_code, "gateway call ok");
                } else {
                    tracing::warn!(gateway = self.gateway, %method, %url, status_code = envelope.status_code, "gateway call rejected");
                }
                envelope
            }
            Err(e) => {
                tracing::error!(gateway = self.gateway, %method, %url, error = %e, "gateway call failed");
                CallGatewayEnvelope::unsent(e.to_string())
            }
        }
    }
}

fn header_map<'a>(
    pairs: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid header name `{name}`"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("invalid value for header `{name}`"))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_2xx_keeps_status_and_body() {
        let env = CallGatewayEnvelope::from_response(TransportResponse {
            status: 422,
            body: br#"{"message":"bad amount"}"#.to_vec(),
        });
        assert!(!env.success);
        assert_eq!(env.status_code, 422);
        assert_eq!(env.body, Some(json!({"message": "bad amount"})));
        assert!(env.error.is_some());
    }

    #[test]
    fn non_json_body_is_kept_as_text() {
        let env = CallGatewayEnvelope::from_response(TransportResponse {
            status: 200,
            body: b"OK".to_vec(),
        });
        assert!(env.success);
        assert_eq!(env.body, Some(json!("OK")));
    }

    #[test]
    fn unsent_envelope_converts_to_transport_error() {
        let err = CallGatewayEnvelope::unsent("gateway timeout")
            .into_result()
            .expect_err("unsent");
        match err {
            GatewayError::Transport { status_code, raw, .. } => {
                assert_eq!(status_code, 0);
                assert_eq!(raw.expect("raw")["error"], json!("gateway timeout"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
