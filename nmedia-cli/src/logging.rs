use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

const VERBOSE_FILTER: &str = "nmedia_client=debug,nmedia_cli=debug";

/// Логи идут в stderr, чтобы не смешиваться с выводом команд.
///
/// `--verbose` перекрывает и `RUST_LOG`, и уровень из настроек.
pub(crate) fn init_logging(level: &str, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))
}
