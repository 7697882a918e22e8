use crate::{translate_api_error, ControlPlane, EventPage, RemoteConfig, RemoteError};
use serde::{Deserialize, Serialize};
use stackpilot_schema::{StackDefinition, StackDescription, StackId};
use std::io::Read;

/// HTTP-based control-plane client.
///
/// Expects a JSON REST API:
/// - `POST   /stacks`                       submit create, returns `{"stack_id"}`
/// - `PUT    /stacks/<id>`                  submit update
/// - `DELETE /stacks/<id>`                  submit delete
/// - `GET    /stacks/<id>`                  describe, returns `{"stacks": [...]}`
/// - `GET    /stacks/<id>/events`           newest event page
/// - `GET    /stacks/<id>/events?next_token=<t>`  following pages
///
/// Non-2xx responses carry `{"code", "message"}`.
pub struct HttpControlPlane {
    config: RemoteConfig,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateResponse {
    stack_id: StackId,
}

#[derive(Debug, Serialize, Deserialize)]
struct DescribeResponse {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

type HttpResult = Result<ureq::http::Response<ureq::Body>, ureq::Error>;

impl HttpControlPlane {
    pub fn new(config: RemoteConfig) -> Self {
        // Error statuses carry a JSON body we need to read.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { config, agent }
    }

    fn stack_url(&self, stack_id: &StackId) -> String {
        format!("{}/stacks/{}", self.config.url, encode_segment(stack_id))
    }

    fn events_url(&self, stack_id: &StackId, page_token: Option<&str>) -> String {
        let base = format!("{}/events", self.stack_url(stack_id));
        match page_token {
            Some(token) => format!("{base}?next_token={}", encode_segment(token)),
            None => base,
        }
    }

    fn decorate<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req.header("X-Stackpilot-Protocol", &crate::PROTOCOL_VERSION.to_string());
        match self.config.auth_token {
            Some(ref token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    fn do_get(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!("GET {url}");
        let result = self.decorate(self.agent.get(url)).call();
        Self::finish(result, url)
    }

    fn do_delete(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!("DELETE {url}");
        let result = self.decorate(self.agent.delete(url)).call();
        Self::finish(result, url)
    }

    fn do_post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!("POST {url} ({} bytes)", body.len());
        let result = self
            .decorate(self.agent.post(url))
            .header("Content-Type", "application/json")
            .send(body);
        Self::finish(result, url)
    }

    fn do_put(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!("PUT {url} ({} bytes)", body.len());
        let result = self
            .decorate(self.agent.put(url))
            .header("Content-Type", "application/json")
            .send(body);
        Self::finish(result, url)
    }

    fn finish(result: HttpResult, url: &str) -> Result<Vec<u8>, RemoteError> {
        let resp = result.map_err(|e| RemoteError::Http(e.to_string()))?;
        let code = resp.status().as_u16();

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        if code >= 400 {
            return Err(error_from_response(code, &body, url));
        }
        Ok(body)
    }
}

fn error_from_response(code: u16, body: &[u8], url: &str) -> RemoteError {
    if let Ok(api) = serde_json::from_slice::<ApiErrorBody>(body) {
        tracing::debug!("HTTP {code} for {url}: {}: {}", api.code, api.message);
        return translate_api_error(&api.code, &api.message);
    }
    if code == 404 {
        return RemoteError::StackNotFound(url.to_owned());
    }
    RemoteError::Http(format!("HTTP {code} for {url}"))
}

/// Percent-encode a path or query component. Stack ids are usually ARNs and
/// contain `:` and `/`.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn decode_json<T: serde::de::DeserializeOwned>(body: &[u8], what: &str) -> Result<T, RemoteError> {
    serde_json::from_slice(body)
        .map_err(|e| RemoteError::Serialization(format!("invalid {what} response: {e}")))
}

impl ControlPlane for HttpControlPlane {
    fn submit_create(&self, definition: &StackDefinition) -> Result<StackId, RemoteError> {
        let url = format!("{}/stacks", self.config.url);
        let body = serde_json::to_vec(definition)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        let resp = self.do_post(&url, &body)?;
        let created: CreateResponse = decode_json(&resp, "create")?;
        Ok(created.stack_id)
    }

    fn submit_update(
        &self,
        stack_id: &StackId,
        definition: &StackDefinition,
    ) -> Result<(), RemoteError> {
        let body = serde_json::to_vec(definition)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        self.do_put(&self.stack_url(stack_id), &body)?;
        Ok(())
    }

    fn submit_delete(&self, stack_id: &StackId) -> Result<(), RemoteError> {
        self.do_delete(&self.stack_url(stack_id))?;
        Ok(())
    }

    fn describe_stack(&self, stack_id: &StackId) -> Result<Option<StackDescription>, RemoteError> {
        let resp = self.do_get(&self.stack_url(stack_id))?;
        let described: DescribeResponse = decode_json(&resp, "describe")?;
        let mut stacks = described.stacks;
        match stacks.len() {
            0 => Ok(None),
            1 => Ok(stacks.pop()),
            n => Err(RemoteError::Serialization(format!(
                "found {n} stacks for {stack_id}, expected 1"
            ))),
        }
    }

    fn fetch_event_page(
        &self,
        stack_id: &StackId,
        page_token: Option<&str>,
    ) -> Result<EventPage, RemoteError> {
        let resp = self.do_get(&self.events_url(stack_id, page_token))?;
        decode_json(&resp, "events")
    }
}
