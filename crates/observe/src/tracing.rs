use {
    crate::Config,
    std::{
        io::IsTerminal,
        panic::PanicHookInfo,
        sync::Once,
    },
    time::macros::format_description,
    tracing::Level,
    tracing_subscriber::{
        EnvFilter,
        fmt::{
            time::UtcTime,
            writer::{BoxMakeWriter, MakeWriterExt as _},
        },
        prelude::*,
        util::SubscriberInitExt,
    },
};

/// Initializes tracing setup that is shared between the binaries.
/// `env_filter` has similar syntax to env_logger. It is documented at
/// https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
pub fn initialize(config: &Config) {
    set_tracing_subscriber(config);
    std::panic::set_hook(Box::new(tracing_panic_hook));
}

/// Like [`initialize`], but can be called multiple times in a row. Later calls
/// are ignored.
///
/// Useful for tests.
pub fn initialize_reentrant(env_filter: &str) {
    // The tracing subscriber below is global object so initializing it again in the
    // same process by a different thread would fail.
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        set_tracing_subscriber(&Config::default().with_env_filter(env_filter));
        std::panic::set_hook(Box::new(tracing_panic_hook));
    });
}

/// Events at or above `stderr_threshold` go to stderr, everything else to
/// stdout.
fn writer(stderr_threshold: Option<Level>) -> BoxMakeWriter {
    match stderr_threshold {
        Some(level) => BoxMakeWriter::new(
            std::io::stderr
                .with_min_level(level)
                .or_else(std::io::stdout),
        ),
        None => BoxMakeWriter::new(std::io::stdout),
    }
}

fn set_tracing_subscriber(config: &Config) {
    let stderr_threshold = config.stderr_threshold;
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ));

    let (plain, json) = if config.use_json_format {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer(stderr_threshold))
            .with_timer(timer);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer(stderr_threshold))
            .with_timer(timer)
            .with_ansi(std::io::stdout().is_terminal());
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.env_filter))
        .with(plain)
        .with(json)
        .init();
}

/// Panic hook that prints roughly the same message as the default panic hook
/// but uses tracing:error instead of stderr.
fn tracing_panic_hook(panic: &PanicHookInfo) {
    let thread = std::thread::current();
    let name = thread.name().unwrap_or("<unnamed>");
    let backtrace = std::backtrace::Backtrace::force_capture();
    tracing::error!("thread '{name}' {panic}\nstack backtrace:\n{backtrace}");
}
