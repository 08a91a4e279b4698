use std::path::Path;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub(crate) const DEFAULT_FILTER: &str = "pred_core=info,pred_cli=info";

/// Install the global subscriber: JSON lines under `log_dir` when given,
/// plain text on stderr otherwise. `RUST_LOG` overrides the default filter.
pub fn init_tracing(log_dir: Option<&Path>) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        match log_dir {
            Some(dir) => {
                let file_appender = tracing_appender::rolling::never(dir, "predtool-trace.jsonl");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                std::mem::forget(guard); // flushed at process exit

                tracing_subscriber::fmt()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
                    .with_env_filter(filter)
                    .init();
            }
            None => {
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_env_filter(filter)
                    .init();
            }
        }
    });
}
