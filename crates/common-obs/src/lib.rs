//! Logging initialisation shared by tokenwatch binaries.

use std::{fmt, io, str::FromStr, sync::Arc};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::field::{Field, Visit};
use tracing_subscriber::{
    fmt::{self as tsfmt, format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    EnvFilter, Registry,
};

#[derive(Debug, thiserror::Error)]
pub enum ObsInitError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human readable single-line output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Initialize logging for a service.
pub struct ObsInit;

impl ObsInit {
    /// Install the global subscriber writing to stderr.
    ///
    /// `filter` is used when `RUST_LOG` is unset; `LOG_LEVEL` and then `info`
    /// are the fallbacks after that.
    pub fn init(
        service: &str,
        format: LogFormat,
        filter: Option<&str>,
    ) -> Result<(), ObsInitError> {
        let result = match format {
            LogFormat::Json => tracing::subscriber::set_global_default(
                Self::subscriber_with_writer(service, filter, io::stderr),
            ),
            LogFormat::Compact => {
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(env_filter(filter))
                    .with_writer(io::stderr)
                    .compact()
                    .finish();
                tracing::subscriber::set_global_default(subscriber)
            }
        };

        result.map_err(|err| {
            if tracing::dispatcher::has_been_set() {
                ObsInitError::AlreadyInitialized
            } else {
                ObsInitError::Install(err)
            }
        })
    }

    /// Build a JSON-line subscriber using the provided writer.
    pub fn subscriber_with_writer<W>(
        service: &str,
        filter: Option<&str>,
        writer: W,
    ) -> impl tracing::Subscriber
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        let fmt_layer = tsfmt::layer()
            .with_ansi(false)
            .event_format(JsonLineFormat::new(Arc::from(service)))
            .with_writer(writer);

        Registry::default()
            .with(env_filter(filter))
            .with(fmt_layer)
    }
}

fn env_filter(filter: Option<&str>) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }
    let level = filter
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

struct JsonLineFormat {
    service: Arc<str>,
}

impl JsonLineFormat {
    fn new(service: Arc<str>) -> Self {
        Self { service }
    }
}

impl<S, N> FormatEvent<S, N> for JsonLineFormat
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let spans: Vec<&str> = ctx
            .event_scope()
            .map(|scope| scope.from_root().map(|span| span.name()).collect())
            .unwrap_or_default();

        let line = json!({
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "level": metadata.level().as_str().to_ascii_lowercase(),
            "target": metadata.target(),
            "service": &*self.service,
            "spans": spans,
            "fields": Value::Object(visitor.fields),
        });
        writeln!(writer, "{line}")
    }
}

#[derive(Default)]
struct JsonFieldVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let number = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), number);
    }
}
