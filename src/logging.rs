//! Logging setup
//!
//! Tools built on this crate print terse, user-facing messages. The format
//! depends on the level:
//!
//! | Level          | Output                          |
//! |----------------|---------------------------------|
//! | TRACE / DEBUG  | `[LEVEL] <timestamp> <message>` |
//! | INFO           | `<message>`                     |
//! | WARN           | `Warning: <message>`            |
//! | ERROR          | `Error: <message>`              |

use crate::misc::current_time;
use crate::parallel::TaskFailure;
use std::fmt::{self, Write as _};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Local time with microseconds and UTC offset.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%z";

/// Event formatter with one template per level
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelFormatter;

impl<S, N> FormatEvent<S, N> for LevelFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        match level {
            Level::INFO => {}
            Level::WARN => write!(&mut writer, "Warning: ")?,
            Level::ERROR => write!(&mut writer, "Error: ")?,
            _ => write!(&mut writer, "[{}] {} ", level, current_time().format(TIME_FORMAT))?,
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(LevelFormatter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Reporter for [`Dispatcher::with_reporter`](crate::parallel::Dispatcher::with_reporter)
/// that logs each failed task at error level.
pub fn report_failure(failure: &TaskFailure) {
    tracing::error!("{}", failure);
}
