use std::fmt;
use std::fmt::Debug;
use std::fmt::Write as _;
use std::thread;
use std::time::Instant;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use indexmap::IndexMap;
use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::span::Attributes;
use tracing::span::Id;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::registry::Scope;
use tracing_subscriber::registry::SpanRef;

use super::ActionLogAppender;
use super::ActionLogMessage;
use super::ActionResult;

const ACTION_SPAN: &str = "action";
const MAX_ERROR_MESSAGE_LENGTH: usize = 200;

pub(super) struct ActionLogLayer<T>
where
    T: ActionLogAppender,
{
    pub(super) appender: T,
}

struct ActionLog {
    id: String,
    action: String,
    date: DateTime<Utc>,
    start_time: Instant,
    result: ActionResult,
    ref_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    context: IndexMap<&'static str, String>,
    stats: IndexMap<String, u128>,
    logs: Vec<String>,
}

impl ActionLog {
    fn elapsed_prefix(&self) -> String {
        let elapsed = self.start_time.elapsed();
        let total_seconds = elapsed.as_secs();
        format!(
            "{:02}:{:02}.{:09}",
            total_seconds / 60,
            total_seconds % 60,
            elapsed.subsec_nanos()
        )
    }

    fn close(mut self) -> ActionLogMessage {
        let elapsed = self.start_time.elapsed();
        self.stats.insert("elapsed".to_owned(), elapsed.as_nanos());
        let trace = if self.result > ActionResult::Ok {
            self.logs.push(format!("elapsed={elapsed:?}\n=== action end ===\n"));
            Some(self.logs.join("\n"))
        } else {
            None
        };
        ActionLogMessage {
            id: self.id,
            date: self.date,
            action: self.action,
            result: self.result,
            ref_id: self.ref_id,
            error_code: self.error_code,
            error_message: self.error_message,
            context: self.context,
            stats: self.stats,
            trace,
        }
    }
}

// start time of a span nested inside an action
struct NestedSpan {
    start_time: Instant,
}

impl<T, S> Layer<S> for ActionLogLayer<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    T: ActionLogAppender + 'static,
{
    fn on_new_span(&self, attrs: &Attributes, id: &Id, context: Context<S>) {
        let Some(span) = context.span(id) else {
            return;
        };

        if span.name() == ACTION_SPAN {
            let mut visitor = ActionVisitor::default();
            attrs.record(&mut visitor);
            if let Some(action_log) = visitor.into_action_log() {
                span.extensions_mut().insert(action_log);
            }
            return;
        }

        if let Some(action_span) = action_span(context.span_scope(id))
            && let Some(action_log) = action_span.extensions_mut().get_mut::<ActionLog>()
        {
            let mut log = format!("[span:{}] ", span.name());
            attrs.record(&mut LogVisitor(&mut log));
            log.push_str(">>>");
            action_log.logs.push(log);
            span.extensions_mut().insert(NestedSpan {
                start_time: Instant::now(),
            });
        }
    }

    fn on_close(&self, id: Id, context: Context<S>) {
        let Some(span) = context.span(&id) else {
            return;
        };

        if let Some(action_log) = span.extensions_mut().remove::<ActionLog>() {
            self.appender.append(action_log.close());
            return;
        }

        if let Some(action_span) = action_span(context.span_scope(&id))
            && let Some(action_log) = action_span.extensions_mut().get_mut::<ActionLog>()
            && let Some(nested_span) = span.extensions_mut().remove::<NestedSpan>()
        {
            let elapsed = nested_span.start_time.elapsed();
            action_log
                .logs
                .push(format!("[span:{}] elapsed={elapsed:?} <<<", span.name()));
            *action_log.stats.entry(format!("{}_elapsed", span.name())).or_default() += elapsed.as_nanos();
            *action_log.stats.entry(format!("{}_count", span.name())).or_default() += 1;
        }
    }

    fn on_event(&self, event: &Event, context: Context<S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level == Level::TRACE {
            return;
        }

        let Some(span) = action_span(context.event_scope(event)) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        let Some(action_log) = extensions.get_mut::<ActionLog>() else {
            return;
        };

        let mut log = action_log.elapsed_prefix();
        let _: fmt::Result = write!(log, " {level} {}:{} ", metadata.target(), metadata.line().unwrap_or(0));

        if level == Level::ERROR || level == Level::WARN {
            let mut visitor = ErrorVisitor::default();
            event.record(&mut visitor);
            if let Some(ref error_code) = visitor.code {
                let _: fmt::Result = write!(log, "[{error_code}] ");
            }
            let result = if level == Level::ERROR {
                ActionResult::Error
            } else {
                ActionResult::Warn
            };
            if result > action_log.result {
                action_log.result = result;
                action_log.error_code = visitor.code;
                action_log.error_message = visitor.message;
            }
        }

        event.record(&mut LogVisitor(&mut log));
        action_log.logs.push(log);

        // debug!(key = value, "context") and debug!(key = value, "stats") are collected into the action log
        event.record(&mut ContextVisitor {
            action_log,
            context_type: None,
        });
    }
}

fn action_span<'a, S>(scope: Option<Scope<'a, S>>) -> Option<SpanRef<'a, S>>
where
    S: for<'lookup> LookupSpan<'lookup>,
{
    scope?.find(|span| span.name() == ACTION_SPAN && span.extensions().get::<ActionLog>().is_some())
}

#[derive(Default)]
struct ActionVisitor {
    action: Option<String>,
    action_id: Option<String>,
    ref_id: Option<String>,
}

impl ActionVisitor {
    fn into_action_log(self) -> Option<ActionLog> {
        let (Some(action), Some(id)) = (self.action, self.action_id) else {
            return None;
        };
        let date = Utc::now();
        let mut logs = vec![format!(
            "=== action begin ===\ntype={action}\nid={id}\ndate={}\nthread={:?}",
            date.to_rfc3339_opts(SecondsFormat::Nanos, true),
            thread::current().id()
        )];
        if let Some(ref ref_id) = self.ref_id {
            logs.push(format!("ref_id={ref_id}"));
        }
        Some(ActionLog {
            id,
            action,
            date,
            start_time: Instant::now(),
            result: ActionResult::Ok,
            ref_id: self.ref_id,
            error_code: None,
            error_message: None,
            context: IndexMap::new(),
            stats: IndexMap::new(),
            logs,
        })
    }
}

impl Visit for ActionVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "action" => self.action = Some(value.to_owned()),
            "action_id" => self.action_id = Some(value.to_owned()),
            "ref_id" => self.ref_id = Some(value.to_owned()),
            _ => {}
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn Debug) {}
}

struct LogVisitor<'a>(&'a mut String);

impl Visit for LogVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "backtrace" => {
                let _: fmt::Result = write!(self.0, "\n{value}");
            }
            "error_code" => {}
            name => {
                let _: fmt::Result = write!(self.0, "{name}={value} ");
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let _: fmt::Result = write!(self.0, "{value:?} ");
        } else {
            let _: fmt::Result = write!(self.0, "{}={value:?} ", field.name());
        }
    }
}

enum ContextType {
    Context,
    Stats,
}

struct ContextVisitor<'a> {
    action_log: &'a mut ActionLog,
    context_type: Option<ContextType>,
}

impl Visit for ContextVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_u128(field, u128::try_from(value).unwrap_or_default());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_u128(field, u128::from(value));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        match self.context_type {
            Some(ContextType::Stats) => {
                *self.action_log.stats.entry(field.name().to_owned()).or_default() += value;
            }
            Some(ContextType::Context) => {
                self.action_log.context.insert(field.name(), value.to_string());
            }
            None => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let Some(ContextType::Context) = self.context_type {
            self.action_log.context.insert(field.name(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.context_type = match format!("{value:?}").as_str() {
                "context" => Some(ContextType::Context),
                "stats" => Some(ContextType::Stats),
                _ => None,
            };
        } else if let Some(ContextType::Context) = self.context_type {
            self.action_log.context.insert(field.name(), format!("{value:?}"));
        }
    }
}

#[derive(Default)]
struct ErrorVisitor {
    code: Option<String>,
    message: Option<String>,
}

impl Visit for ErrorVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "error_code" {
            self.code = Some(value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let message = format!("{value:?}");
            self.message = Some(message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect());
        }
    }
}
