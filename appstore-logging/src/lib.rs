use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "/tmp/appstore.log";

// --- Writer that duplicates output to two sinks ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write_all(buf).map(|_| buf.len());
        let res_b = self.b.write_all(buf).map(|_| buf.len());
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            "off" | "none" => LogOutput::Off,
            _ => LogOutput::Console,
        }
    }

    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Logging configuration, normally read from `APPSTORE_LOG_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `appstore_store=debug`
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Base name of the daily rotated log file
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Unknown values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            level: non_empty("APPSTORE_LOG_LEVEL").unwrap_or(defaults.level),
            format: match non_empty("APPSTORE_LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Human,
            },
            output: non_empty("APPSTORE_LOG_OUTPUT")
                .map(|v| LogOutput::parse(&v))
                .unwrap_or(defaults.output),
            file: non_empty("APPSTORE_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.file),
        }
    }

    fn file_parts(&self) -> (&Path, &std::ffi::OsStr) {
        let dir = match self.file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = self
            .file
            .file_name()
            .unwrap_or_else(|| "appstore.log".as_ref());
        (dir, name)
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(writer: W, format: LogFormat) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Human => layer.boxed(),
    }
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process. Calling this twice is harmless; the second call
/// leaves the first subscriber in place.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&settings.level)
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("sqlx=warn".parse().expect("static directive"));

    let mut guard = None;
    let output: Option<BoxedLayer> = match settings.output {
        LogOutput::Off => None,
        LogOutput::Console => Some(fmt_layer(io::stdout, settings.format)),
        output => {
            let (dir, name) = settings.file_parts();
            let appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);

            if output.console() && output.file() {
                let tee = MakeTee {
                    make_a: io::stdout,
                    make_b: non_blocking,
                };
                Some(fmt_layer(tee, settings.format))
            } else {
                Some(fmt_layer(non_blocking, settings.format))
            }
        }
    };

    // Filter is attached last so it applies to the boxed output layer
    let result = registry().with(output.with_filter(env_filter)).try_init();
    if result.is_err() {
        return None;
    }

    guard
}
