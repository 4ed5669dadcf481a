use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::io;

use axum::http::StatusCode;
use chrono::NaiveDate;
use chrono::Utc;
use framework::exception;
use framework::exception::Exception;
use framework::exception::Severity;
use framework::exception::error_code;
use framework::fs::scoped_file::ScopedFile;
use framework::http::header;
use framework::web::error::HttpError;
use tokio::fs;
use tokio::io::AsyncWriteExt as _;
use tracing::debug;
use tracing::info;

use crate::AppState;
use crate::cmf;

// upstream error pages can be large html documents
const MAX_UPSTREAM_BODY_LENGTH: usize = 500;

#[derive(Debug)]
pub struct Relayed {
    pub target_date: NaiveDate,
    pub location: String,
}

#[derive(Debug)]
pub enum RelayError {
    Upstream { status: StatusCode, message: String },
    Transport(Exception),
    Configuration(String),
    Processing(Exception),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Upstream { status, .. } => *status,
            RelayError::Transport(_) | RelayError::Configuration(_) | RelayError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RelayError::Upstream { .. } => "UPSTREAM_HTTP_ERROR",
            RelayError::Transport(_) => "TRANSPORT_ERROR",
            RelayError::Configuration(_) => "CONFIGURATION_ERROR",
            RelayError::Processing(_) => "PROCESSING_ERROR",
        }
    }
}

impl Display for RelayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Upstream { message, .. } => write!(f, "http error during request, {message}"),
            RelayError::Transport(exception) => write!(f, "http request failed, error={}", exception.describe()),
            RelayError::Configuration(message) => write!(f, "configuration error, {message}"),
            RelayError::Processing(exception) => write!(f, "failed to process, error={}", exception.describe()),
        }
    }
}

impl From<Exception> for RelayError {
    fn from(exception: Exception) -> Self {
        if exception.has_code(error_code::HTTP_TRANSPORT) {
            RelayError::Transport(exception)
        } else {
            RelayError::Processing(exception)
        }
    }
}

impl From<RelayError> for HttpError {
    fn from(error: RelayError) -> Self {
        let status = error.status();
        let code = error.error_code();
        let message = error.to_string();
        let exception = match error {
            RelayError::Upstream { .. } => exception!(severity = Severity::Warn, code = code, message = message),
            RelayError::Configuration(_) => exception!(code = code, message = message),
            RelayError::Transport(source) | RelayError::Processing(source) => {
                exception!(code = code, message = message, source = source)
            }
        };
        HttpError::new(status, exception)
    }
}

/// Downloads the quota value file of (today - offset days) and uploads it to the bucket.
///
/// The downloaded file is removed before returning, whether the relay succeeded or not.
pub async fn fetch_and_upload(state: &AppState, today: NaiveDate) -> Result<Relayed, RelayError> {
    fs::create_dir_all(&state.download_dir).await.map_err(|err| {
        exception!(
            message = format!("failed to create download dir, dir={}", state.download_dir.to_string_lossy()),
            source = err
        )
    })?;

    let target_date = cmf::target_date(today, state.source.offset_days)?;
    info!("download quota values, today={today}, target_date={target_date}");
    debug!(target_date = %target_date, "context");

    let request = cmf::download_request(&state.source, target_date);
    let url = request.full_url()?;
    info!("request url, url={url}");
    let mut response = state.http_client.stream(request).await?;

    if response.is_error() {
        let status = response.status;
        let body: String = match response.text().await {
            Ok(body) => body.chars().take(MAX_UPSTREAM_BODY_LENGTH).collect(),
            Err(exception) => format!("failed to read body, error={}", exception.describe()),
        };
        return Err(RelayError::Upstream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: format!("status={status}, url={url}, body={body}"),
        });
    }

    let file_name = cmf::file_name(
        response.headers.get(&header::CONTENT_DISPOSITION).map(String::as_str),
        target_date,
    );
    debug!(file_name, "context");

    let (local_file, mut file) = ScopedFile::create(state.download_dir.join(&file_name)).await?;
    let mut length = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(|err| write_error(&local_file, err))?;
        length += chunk.len();
    }
    file.flush().await.map_err(|err| write_error(&local_file, err))?;
    drop(file);
    info!(
        "file downloaded, path={}, length={length}",
        local_file.path().to_string_lossy()
    );
    debug!(download_bytes = length, "stats");

    let Some(ref bucket) = state.bucket else {
        return Err(RelayError::Configuration(
            "GCS_BUCKET_NAME is not configured, skip upload".to_owned(),
        ));
    };

    let object_name = cmf::object_name(&state.folder, target_date, Utc::now().naive_utc(), &file_name);
    debug!(object_name, "context");
    state
        .gcs
        .upload(bucket, &object_name, local_file.path(), cmf::content_type(&file_name))
        .await
        .map_err(RelayError::Processing)?;

    Ok(Relayed {
        target_date,
        location: format!("gs://{bucket}/{object_name}"),
    })
}

fn write_error(local_file: &ScopedFile, err: io::Error) -> Exception {
    exception!(
        message = format!("failed to write file, path={}", local_file.path().to_string_lossy()),
        source = err
    )
}
