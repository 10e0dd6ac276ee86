use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as sfmt, Layer};

use crate::config::{logs_dir, run_log_file, student_log_file};

/// Span name that scopes a per-student log file; its `id` field names the file.
pub const STUDENT_SPAN: &str = "student";
const STUDENT_ID_FIELD: &str = "id";

pub fn init(output: &Path, debug: bool) -> io::Result<()> {
    let console_level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let console = sfmt::layer()
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(console_level);

    let run_log = sfmt::layer()
        .with_writer(Mutex::new(File::create(run_log_file(output))?))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(run_log)
        .with(StudentLogLayer::new(logs_dir(output)))
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Failed to install logging: {}", e)))
}

pub fn init_console() {
    let _ = tracing_subscriber::registry()
        .with(sfmt::layer().with_writer(io::stderr).without_time().with_target(false))
        .with(LevelFilter::INFO)
        .try_init();
}

/// Mirrors INFO-and-above events into `<logs>/<id>.log` for the student
/// whose span they happen in. The file lives as long as the span.
pub struct StudentLogLayer {
    logs: PathBuf,
}

struct StudentLog(Mutex<File>);

impl StudentLogLayer {
    pub fn new(logs: PathBuf) -> Self {
        StudentLogLayer { logs }
    }
}

impl<S> Layer<S> for StudentLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != STUDENT_SPAN {
            return;
        }
        let mut visitor = FieldVisitor::named(STUDENT_ID_FIELD);
        attrs.record(&mut visitor);
        let Some(student) = visitor.value else {
            return;
        };

        let path = student_log_file(&self.logs, &student);
        match File::create(&path) {
            Ok(file) => {
                if let Some(span) = ctx.span(id) {
                    span.extensions_mut().insert(StudentLog(Mutex::new(file)));
                }
            }
            // Can't log from inside the subscriber.
            Err(e) => eprintln!("Failed to create {}: {}", path.display(), e),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        for span in scope {
            let extensions = span.extensions();
            let Some(log) = extensions.get::<StudentLog>() else {
                continue;
            };
            let mut visitor = FieldVisitor::named("message");
            event.record(&mut visitor);
            let line = format!(
                "{} - {} - {}: {}{}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                event.metadata().target(),
                level,
                visitor.value.unwrap_or_default(),
                visitor.rest
            );
            if let Ok(mut file) = log.0.lock() {
                let _ = file.write_all(line.as_bytes());
            }
            return;
        }
    }
}

struct FieldVisitor {
    name: &'static str,
    value: Option<String>,
    rest: String,
}

impl FieldVisitor {
    fn named(name: &'static str) -> Self {
        FieldVisitor {
            name,
            value: None,
            rest: String::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == self.name {
            self.value = Some(value.to_string());
        } else {
            self.rest.push_str(&format!(" {}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == self.name {
            self.value = Some(format!("{:?}", value));
        } else {
            self.rest.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
