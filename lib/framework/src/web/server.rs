use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse as _;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::exception::CoreRsResult;
use crate::log;
use crate::web::client_info::client_info;

pub struct HttpServerConfig {
    pub bind_address: String,
    pub max_forwarded_ips: usize,
}

impl HttpServerConfig {
    pub fn with_port(port: u16) -> Self {
        HttpServerConfig {
            bind_address: format!("0.0.0.0:{port}"),
            ..HttpServerConfig::default()
        }
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        HttpServerConfig {
            bind_address: "0.0.0.0:8080".to_owned(),
            max_forwarded_ips: 2,
        }
    }
}

pub async fn start_http_server(
    router: Router,
    shutdown_signal: broadcast::Receiver<()>,
    config: HttpServerConfig,
) -> CoreRsResult<()> {
    let listener = TcpListener::bind(&config.bind_address).await.map_err(|err| {
        exception!(
            message = format!("failed to bind http server, bind={}", config.bind_address),
            source = err
        )
    })?;
    info!("http server started, bind={}", config.bind_address);
    serve(listener, router, shutdown_signal, config.max_forwarded_ips).await?;
    info!("http server stopped");

    Ok(())
}

async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_signal: broadcast::Receiver<()>,
    max_forwarded_ips: usize,
) -> CoreRsResult<()> {
    let app = Router::new()
        .merge(router)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(move |request: Request, next: Next| {
            http_server_layer(request, next, max_forwarded_ips)
        }))
        .into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _: Result<(), RecvError> = shutdown_signal.recv().await;
        })
        .await?;
    Ok(())
}

// last line of defense, the handler must not take the process down
#[allow(clippy::needless_pass_by_value)] // CatchPanicLayer::custom hands over the owned payload
fn panic_response(detail: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = detail.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = detail.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    };
    error!(error_code = "HANDLER_PANIC", "handler panicked, detail={detail}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        format!("internal server error, detail={detail}"),
    )
        .into_response()
}

async fn http_server_layer(mut request: Request, next: Next, max_forwarded_ips: usize) -> Response {
    // skip log for health check
    if request.uri().path() == "/health-check" {
        return StatusCode::OK.into_response();
    }

    let mut response = None;
    log::start_action("http", None, async {
        let method = request.method().clone();
        let uri = request.uri().clone();
        debug!(method = ?method, "[request]");
        debug!(uri = ?uri, "[request]");
        for (name, value) in request.headers() {
            if name != header::COOKIE {
                debug!("[header] {name}={value:?}");
            }
        }
        let cookies = CookieJar::from_headers(request.headers());
        for cookie in cookies.iter() {
            debug!("[cookie] {}={}", cookie.name(), cookie.value());
        }

        debug!(uri = ?uri, method = ?method, "context");

        let client_info = client_info(&request, max_forwarded_ips);
        debug!(client_ip = client_info.client_ip, "context");
        if let Some(ref user_agent) = client_info.user_agent {
            debug!(user_agent, "context");
        }
        request.extensions_mut().insert(Arc::new(client_info));

        if let Some(matched_path) = request.extensions().get::<MatchedPath>() {
            debug!(matched_path = matched_path.as_str(), "context");
        }

        let http_response = next.run(request).await;

        let status = http_response.status().as_u16();
        debug!(status, "[response]");
        debug!(response_status = status, "context");
        for (name, value) in http_response.headers() {
            debug!("[header] {name}={value:?}");
        }
        response = Some(http_response);
        Ok(())
    })
    .await;
    response.unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
