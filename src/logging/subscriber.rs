//! Console output and global subscriber initialisation.
use std::io::IsTerminal as _;

use tracing::Level;

use super::STAGE_TARGET;
use super::file::{FileLayer, strip_colors};

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
pub(super) struct MessageExtractor {
    message: String,
}

impl MessageExtractor {
    /// Return the formatted message of `event`, or an empty string.
    pub(super) fn extract(event: &tracing::Event<'_>) -> String {
        let mut extractor = Self::default();
        event.record(&mut extractor);
        extractor.message
    }
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Module path of an engine event without the crate prefix.
pub(super) fn short_target(target: &str) -> &str {
    target.strip_prefix("cfgpatch::").unwrap_or(target)
}

/// Wrap `text` in the SGR `code` when colour is enabled.
fn paint(color: bool, code: &str, text: &str) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// One console line for an event. Stage headers stand out, warnings and
/// errors are tagged, and engine debug output names the module it came from.
fn console_line(level: Level, target: &str, msg: &str, color: bool) -> String {
    match level {
        Level::ERROR => format!("{} {msg}", paint(color, "31", "ERROR")),
        Level::WARN => format!("{}  {msg}", paint(color, "33", "WARN")),
        Level::INFO if target == STAGE_TARGET => {
            format!("{} {}", paint(color, "1;34", "==>"), paint(color, "1", msg))
        }
        Level::INFO => format!("  {msg}"),
        _ => {
            let module = short_target(target);
            format!("  {}", paint(color, "2", &format!("{module}: {msg}")))
        }
    }
}

/// Console output on stderr.
struct ConsoleFormatter {
    color: bool,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut msg = MessageExtractor::extract(event);
        if !self.color {
            msg = strip_colors(&msg).into_owned();
        }
        writeln!(
            writer,
            "{}",
            console_line(*metadata.level(), metadata.target(), &msg, self.color)
        )
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// The console layer follows `RUST_LOG` when it is set, otherwise `info`
/// (or `debug` with `verbose`) and writes to stderr, leaving stdout to
/// command output; colour is used only when stderr is a terminal and
/// `NO_COLOR` is unset. The file layer writes every event at `debug` and
/// above to `$XDG_CACHE_HOME/cfgpatch/<command>.log`.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::{
        EnvFilter, Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let color = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter { color })
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
