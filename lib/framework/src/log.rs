use std::fmt::Debug;

pub use appender::ConsoleAppender;
use chrono::DateTime;
use chrono::Utc;
use indexmap::IndexMap;
use layer::ActionLogLayer;
use serde::Serialize;
use tracing::Instrument as _;
use tracing::Level;
use tracing::info_span;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::exception::CoreRsResult;
use crate::exception::Exception;
use crate::exception::Severity;

mod appender;
pub mod id_generator;
mod layer;

pub trait ActionLogAppender {
    fn append(&self, action_log: ActionLogMessage);
}

pub fn init_with_action<T>(appender: T)
where
    T: ActionLogAppender + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false) // cloud run log console doesn't render color
                .with_line_number(true)
                .with_thread_ids(true)
                .with_filter(LevelFilter::INFO),
        )
        .with(ActionLogLayer { appender })
        .init();
}

macro_rules! log_event {
    (level = $level:ident, error_code = $error_code:expr, $($arg:tt)+) => {
        match ($level, $error_code) {
            (::tracing::Level::WARN, Some(error_code)) => ::tracing::warn!(error_code, $($arg)+),
            (::tracing::Level::WARN, None) => ::tracing::warn!($($arg)+),
            (_, Some(error_code)) => ::tracing::error!(error_code, $($arg)+),
            (_, None) => ::tracing::error!($($arg)+),
        }
    };
}

/// Runs the task inside an `action` span, every debug event of the task is collected into the action log.
pub async fn start_action<T>(action: &str, ref_id: Option<String>, task: T)
where
    T: Future<Output = CoreRsResult<()>>,
{
    let action_id = id_generator::random_id();
    let action_span = info_span!("action", action, action_id, ref_id);
    async {
        let result = task.await;
        if let Err(e) = result {
            log_exception(&e);
        }
    }
    .instrument(action_span)
    .await;
}

pub(crate) fn log_exception(e: &Exception) {
    let level = match e.severity {
        Severity::Warn => Level::WARN,
        Severity::Error => Level::ERROR,
    };
    let message = &e.message;
    let error_code = e.code.as_deref();
    log_event!(
        level = level,
        error_code = error_code,
        backtrace = e.to_string(),
        "{message}"
    );
}

#[derive(Serialize, Debug)]
pub struct ActionLogMessage {
    pub id: String,
    pub date: DateTime<Utc>,
    pub action: String,
    pub result: ActionResult,
    pub ref_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub context: IndexMap<&'static str, String>,
    pub stats: IndexMap<String, u128>,
    pub trace: Option<String>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Debug)]
pub enum ActionResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}
