//! HTTP transport to the analysis service.

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{SessionId, TreeMethod},
    error::{ErrorBody, ServiceError},
    protocol::{
        AlignResponse, BuildTreeResponse, CompareTreesRequest, CompareTreesResponse,
        GetTreeResponse, HealthResponse, SessionInfoResponse, SessionListResponse,
        UploadResponse,
    },
};
use url::Url;

use crate::{config::Settings, upload::FastaUpload};

/// Upper bound on `{`/`[` nesting accepted from the service. Tree payloads
/// nest two levels per tree level, so this admits trees ~500 levels deep.
pub const MAX_JSON_NESTING: usize = 1024;

#[async_trait]
pub trait PhyloBackend: Send + Sync {
    async fn upload_fasta(&self, upload: &FastaUpload) -> Result<UploadResponse, ServiceError>;
    async fn align(&self, session_id: &SessionId) -> Result<AlignResponse, ServiceError>;
    async fn build_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<BuildTreeResponse, ServiceError>;
    async fn compare_trees(
        &self,
        session_id: &SessionId,
        method1: TreeMethod,
        method2: TreeMethod,
    ) -> Result<CompareTreesResponse, ServiceError>;
    async fn get_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<GetTreeResponse, ServiceError>;
    async fn session_info(&self, session_id: &SessionId)
        -> Result<SessionInfoResponse, ServiceError>;
    async fn list_sessions(&self) -> Result<SessionListResponse, ServiceError>;
    async fn health(&self) -> Result<HealthResponse, ServiceError>;
}

pub struct HttpPhyloBackend {
    http: Client,
    base_url: Url,
}

impl HttpPhyloBackend {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = Url::parse(&settings.api_base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("api url '{}' cannot carry a path", settings.api_base_url);
        }
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, &body));
        }
        decode_json(&body)
    }
}

#[async_trait]
impl PhyloBackend for HttpPhyloBackend {
    async fn upload_fasta(&self, upload: &FastaUpload) -> Result<UploadResponse, ServiceError> {
        let part = multipart::Part::bytes(upload.bytes.clone()).file_name(upload.filename.clone());
        let form = multipart::Form::new().part("file", part);
        self.execute(
            self.http
                .post(self.endpoint(&["api", "upload_fasta"]))
                .multipart(form),
        )
        .await
    }

    async fn align(&self, session_id: &SessionId) -> Result<AlignResponse, ServiceError> {
        self.execute(
            self.http
                .post(self.endpoint(&["api", "align", session_id.as_str()])),
        )
        .await
    }

    async fn build_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<BuildTreeResponse, ServiceError> {
        self.execute(self.http.post(self.endpoint(&[
            "api",
            "build_tree",
            session_id.as_str(),
            method.token(),
        ])))
        .await
    }

    async fn compare_trees(
        &self,
        session_id: &SessionId,
        method1: TreeMethod,
        method2: TreeMethod,
    ) -> Result<CompareTreesResponse, ServiceError> {
        self.execute(
            self.http
                .post(self.endpoint(&["api", "compare_trees", session_id.as_str()]))
                .json(&CompareTreesRequest { method1, method2 }),
        )
        .await
    }

    async fn get_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<GetTreeResponse, ServiceError> {
        self.execute(self.http.get(self.endpoint(&[
            "api",
            "get_tree",
            session_id.as_str(),
            method.token(),
        ])))
        .await
    }

    async fn session_info(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionInfoResponse, ServiceError> {
        self.execute(
            self.http
                .get(self.endpoint(&["api", "session", session_id.as_str()])),
        )
        .await
    }

    async fn list_sessions(&self) -> Result<SessionListResponse, ServiceError> {
        self.execute(self.http.get(self.endpoint(&["api", "sessions"])))
            .await
    }

    async fn health(&self) -> Result<HealthResponse, ServiceError> {
        self.execute(self.http.get(self.endpoint(&["api", "health"])))
            .await
    }
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        ServiceError::network(format!("analysis service unreachable: {err}"))
    } else if err.is_decode() || err.is_body() {
        ServiceError::server(format!("unreadable response from analysis service: {err}"))
    } else {
        ServiceError::unknown(err.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ServiceError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    let message = format!("HTTP {}: {message}", status.as_u16());

    if status == StatusCode::NOT_FOUND {
        ServiceError::not_found(message)
    } else if status.is_server_error() {
        ServiceError::server(message)
    } else {
        ServiceError::unknown(message)
    }
}

/// Deepest `{`/`[` nesting in a JSON document, ignoring string contents.
pub fn json_nesting_depth(bytes: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in bytes {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    deepest
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ServiceError> {
    let depth = json_nesting_depth(bytes);
    if depth > MAX_JSON_NESTING {
        return Err(ServiceError::server(format!(
            "response nests {depth} levels deep; the limit is {MAX_JSON_NESTING}"
        )));
    }

    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    deserializer.disable_recursion_limit();
    let value = <T as serde::Deserialize>::deserialize(&mut deserializer)
        .map_err(|e| ServiceError::server(format!("malformed response payload: {e}")))?;
    deserializer
        .end()
        .map_err(|e| ServiceError::server(format!("malformed response payload: {e}")))?;
    Ok(value)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
