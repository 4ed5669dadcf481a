use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
pub use http::HeaderName;
pub use http::header;
use reqwest::Body;
use reqwest::Method;
use reqwest::Request;
use reqwest::Response;
use reqwest::Url;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::Instrument as _;
use tracing::debug;
use tracing::debug_span;

use crate::exception::CoreRsResult;
use crate::exception::error_code;

pub struct HttpClient {
    client: reqwest::Client,
}

pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<HeaderName, String>,
    // streamed from disk when the request is sent
    body: Option<PathBuf>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: String) -> Self {
        HttpRequest {
            method,
            url,
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    pub fn file_body(&mut self, path: PathBuf, content_type: impl Into<String>) {
        self.body = Some(path);
        self.headers.insert(header::CONTENT_TYPE, content_type.into());
    }

    pub fn full_url(&self) -> CoreRsResult<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|err| exception!(message = format!("invalid url, url={}", self.url), source = err))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HttpMethod {
    GET,
    POST,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
        }
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<HeaderName, String>,
    pub body: String,
}

/// Response whose body has not been read yet.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<HeaderName, String>,
    response: Response,
}

impl HttpStreamResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    pub async fn chunk(&mut self) -> CoreRsResult<Option<Bytes>> {
        self.response.chunk().await.map_err(|err| {
            exception!(
                code = error_code::HTTP_TRANSPORT,
                message = "failed to read response body",
                source = err
            )
        })
    }

    pub async fn text(self) -> CoreRsResult<String> {
        self.response.text().await.map_err(|err| {
            exception!(
                code = error_code::HTTP_TRANSPORT,
                message = "failed to read response body",
                source = err
            )
        })
    }
}

impl HttpClient {
    pub fn new(timeout: Duration) -> CoreRsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(300))
            .connection_verbose(false)
            .build()
            .map_err(|err| exception!(message = "failed to build http client", source = err))?;
        Ok(HttpClient { client })
    }

    pub async fn execute(&self, request: HttpRequest) -> CoreRsResult<HttpResponse> {
        let span = debug_span!("http_client", url = request.url, method = ?request.method);
        async {
            let response = self.send(request).await?;
            let status = response.status;
            let headers = response.headers.clone();
            let body = response.text().await?;
            if let Some(content_type) = headers.get(&header::CONTENT_TYPE)
                && (content_type.contains("json") || content_type.contains("text"))
            {
                debug!("[response] body={body}");
            }
            Ok(HttpResponse { status, headers, body })
        }
        .instrument(span)
        .await
    }

    /// sends the request and returns once headers arrived, the body is read by caller
    pub async fn stream(&self, request: HttpRequest) -> CoreRsResult<HttpStreamResponse> {
        let span = debug_span!("http_client", url = request.url, method = ?request.method);
        self.send(request).instrument(span).await
    }

    async fn send(&self, request: HttpRequest) -> CoreRsResult<HttpStreamResponse> {
        debug!(method = ?request.method, "[request]");
        let url = request.full_url()?;
        debug!(url = url.as_str(), "[request]");
        let mut http_request = Request::new(request.method.into(), url);
        for (key, value) in request.headers {
            debug!("[header] {}={}", key, value);
            http_request.headers_mut().insert(key, value.parse()?);
        }
        if let Some(path) = request.body {
            let file = File::open(&path).await.map_err(|err| {
                exception!(
                    message = format!("failed to open file, path={}", path.to_string_lossy()),
                    source = err
                )
            })?;
            let length = file.metadata().await?.len();
            debug!("[request] body=file, path={}, length={length}", path.to_string_lossy());
            http_request
                .headers_mut()
                .insert(header::CONTENT_LENGTH, length.to_string().parse()?);
            *http_request.body_mut() = Some(Body::wrap_stream(ReaderStream::new(file)));
        }

        let response = self.client.execute(http_request).await.map_err(|err| {
            exception!(
                code = error_code::HTTP_TRANSPORT,
                message = "failed to send http request",
                source = err
            )
        })?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        debug!(status, "[response]");
        for (key, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).to_string();
            debug!("[header] {key}={value}");
            headers.insert(key.to_owned(), value);
        }

        Ok(HttpStreamResponse {
            status,
            headers,
            response,
        })
    }
}
