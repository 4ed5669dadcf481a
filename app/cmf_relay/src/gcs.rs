use std::path::Path;

use framework::exception;
use framework::exception::CoreRsResult;
use framework::http::HeaderName;
use framework::http::HttpClient;
use framework::http::HttpMethod;
use framework::http::HttpRequest;
use framework::http::header;
use framework::json;
use framework::shell;
use serde::Deserialize;
use tracing::Instrument as _;
use tracing::debug_span;
use tracing::info;

/// Google Cloud Storage client over the JSON API.
pub struct GcsClient {
    http_client: HttpClient,
    uri: String,
    credential: Credential,
}

pub enum Credential {
    // cloud run / gce, token of the attached service account
    MetadataServer { uri: String },
    // local run, token of the gcloud login
    GcloudCli,
    // storage emulator, e.g. fake-gcs-server
    Anonymous,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

impl GcsClient {
    pub fn new(http_client: HttpClient, uri: &str, credential: Credential) -> Self {
        GcsClient {
            http_client,
            uri: uri.trim_end_matches('/').to_owned(),
            credential,
        }
    }

    pub async fn upload(&self, bucket: &str, object_name: &str, path: &Path, content_type: &str) -> CoreRsResult<()> {
        let span = debug_span!("gcs", bucket, object_name);
        async {
            let mut request = HttpRequest::new(
                HttpMethod::POST,
                format!("{}/upload/storage/v1/b/{bucket}/o", self.uri),
            );
            request.query("uploadType", "media");
            request.query("name", object_name);
            if let Some(token) = self.access_token().await? {
                request.headers.insert(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            request.file_body(path.to_path_buf(), content_type);

            let response = self.http_client.execute(request).await?;
            if response.status >= 400 {
                return Err(exception!(
                    message = format!(
                        "failed to upload object, bucket={bucket}, object={object_name}, status={}, body={}",
                        response.status, response.body
                    )
                ));
            }
            info!(
                "file uploaded, path={}, location=gs://{bucket}/{object_name}",
                path.to_string_lossy()
            );
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn access_token(&self) -> CoreRsResult<Option<String>> {
        match self.credential {
            Credential::MetadataServer { ref uri } => {
                let mut request = HttpRequest::new(
                    HttpMethod::GET,
                    format!("{uri}/computeMetadata/v1/instance/service-accounts/default/token"),
                );
                request
                    .headers
                    .insert(HeaderName::from_static("metadata-flavor"), "Google".to_owned());
                let response = self.http_client.execute(request).await?;
                if response.status != 200 {
                    return Err(exception!(
                        message = format!("failed to get access token from metadata server, status={}", response.status)
                    ));
                }
                let token: AccessToken = json::from_json(&response.body)?;
                Ok(Some(token.access_token))
            }
            Credential::GcloudCli => {
                let token = shell::run("gcloud auth print-access-token")
                    .await
                    .map_err(|err| exception!(message = "failed to get access token from gcloud", source = err))?;
                Ok(Some(token))
            }
            Credential::Anonymous => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use axum::http::StatusCode;
    use framework::http::HttpClient;

    use super::Credential;
    use super::GcsClient;
    use crate::mock::MockResponse;
    use crate::mock::MockServer;

    #[tokio::test]
    async fn upload() {
        let storage = MockServer::start(MockResponse::new(StatusCode::OK, r#"{"name": "a"}"#)).await;
        let metadata = MockServer::start(MockResponse::new(StatusCode::OK, r#"{"access_token": "token-1", "expires_in": 3599, "token_type": "Bearer"}"#)).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xls");
        fs::write(&path, b"quota values").unwrap();
        let client = GcsClient::new(
            HttpClient::new(Duration::from_secs(10)).unwrap(),
            &format!("{}/", storage.uri),
            Credential::MetadataServer {
                uri: metadata.uri.clone(),
            },
        );

        client
            .upload("quota-bucket", "cmf-valores-cuota/2024/03/05/report.xls", &path, "application/vnd.ms-excel")
            .await
            .unwrap();

        let requests = storage.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/upload/storage/v1/b/quota-bucket/o");
        assert_eq!(
            request.query.as_deref(),
            Some("uploadType=media&name=cmf-valores-cuota%2F2024%2F03%2F05%2Freport.xls")
        );
        assert_eq!(request.header("authorization").as_deref(), Some("Bearer token-1"));
        assert_eq!(request.header("content-type").as_deref(), Some("application/vnd.ms-excel"));
        assert_eq!(request.body, b"quota values".as_slice());

        let token_requests = metadata.requests();
        assert_eq!(
            token_requests[0].path,
            "/computeMetadata/v1/instance/service-accounts/default/token"
        );
        assert_eq!(token_requests[0].header("metadata-flavor").as_deref(), Some("Google"));
    }

    #[tokio::test]
    async fn upload_rejected() {
        let storage = MockServer::start(MockResponse::new(StatusCode::FORBIDDEN, "access denied")).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xls");
        fs::write(&path, b"quota values").unwrap();
        let client = GcsClient::new(
            HttpClient::new(Duration::from_secs(10)).unwrap(),
            &storage.uri,
            Credential::Anonymous,
        );

        let result = client
            .upload("quota-bucket", "report.xls", &path, "application/vnd.ms-excel")
            .await;

        let exception = result.unwrap_err();
        assert!(exception.message.contains("status=403"));
        assert!(storage.requests()[0].header("authorization").is_none());
    }
}
