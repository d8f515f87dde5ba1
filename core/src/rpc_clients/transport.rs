use std::collections::BTreeMap;
use std::task;

use alloy::{
    rpc::json_rpc::{RequestPacket, ResponsePacket},
    transports::{
        TransportError, TransportErrorKind, TransportFut, TransportResult,
        http::reqwest::{
            self,
            header::{HeaderMap, HeaderName, HeaderValue},
        },
    },
};
use tower::Service;
use tracing::{Instrument, debug, debug_span, trace};

use crate::error::FlowError;

/// HTTP JSON-RPC transport that adds a fixed set of headers to every request.
///
/// Wallet bridges and hosted bundlers commonly gate access on an API key header.
#[derive(Clone, Debug)]
pub struct HeaderInjectingTransport {
    client: reqwest::Client,
    url: reqwest::Url,
    custom_headers: HeaderMap,
}

impl HeaderInjectingTransport {
    pub fn new(client: reqwest::Client, url: reqwest::Url, headers: HeaderMap) -> Self {
        Self {
            client,
            url,
            custom_headers: headers,
        }
    }

    async fn do_request(self, req: RequestPacket) -> TransportResult<ResponsePacket> {
        let mut request_builder = self.client.post(self.url).json(&req);

        for (name, value) in &self.custom_headers {
            request_builder = request_builder.header(name, value);
        }

        let resp = request_builder
            .send()
            .await
            .map_err(TransportErrorKind::custom)?;

        let status = resp.status();
        debug!(?status, "received response from server");

        let body = resp.bytes().await.map_err(TransportErrorKind::custom)?;
        debug!(bytes = body.len(), "retrieved response body");
        trace!(body = ?String::from_utf8_lossy(&body), "response body");

        if !status.is_success() {
            return Err(TransportErrorKind::http_error(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|err| TransportError::deser_err(err, String::from_utf8_lossy(&body)))
    }
}

impl Service<RequestPacket> for HeaderInjectingTransport {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    #[inline]
    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    #[inline]
    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let this = self.clone();
        let span = debug_span!("HeaderInjectingTransport", url = %this.url);
        Box::pin(this.do_request(req).instrument(span))
    }
}

/// Hands out transports that share one reqwest connection pool.
#[derive(Clone, Debug)]
pub struct SharedClientTransportBuilder {
    shared_client: reqwest::Client,
}

impl SharedClientTransportBuilder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            shared_client: client,
        }
    }

    pub fn with_headers(&self, url: reqwest::Url, headers: HeaderMap) -> HeaderInjectingTransport {
        HeaderInjectingTransport::new(self.shared_client.clone(), url, headers)
    }

    pub fn default_transport(&self, url: reqwest::Url) -> HeaderInjectingTransport {
        self.with_headers(url, HeaderMap::new())
    }
}

/// Builds a header map from configured name/value pairs.
pub fn header_map_from_pairs(pairs: &BTreeMap<String, String>) -> Result<HeaderMap, FlowError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            FlowError::RpcConfigError {
                message: format!("Invalid header name `{name}`: {e}"),
            }
        })?;
        headers.insert(name, HeaderValue::from_str(value)?);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs_are_validated() {
        let mut pairs = BTreeMap::new();
        pairs.insert("x-api-key".to_string(), "secret".to_string());
        let headers = header_map_from_pairs(&pairs).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");

        let mut bad = BTreeMap::new();
        bad.insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            header_map_from_pairs(&bad),
            Err(FlowError::RpcConfigError { .. })
        ));
    }
}
