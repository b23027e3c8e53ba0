use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// JSON logs on stderr, `RUST_LOG` taking precedence over the `--debug` level.
pub fn init_logging(debug: bool) {
    let base_level = if debug { "debug" } else { "info" };

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));
    if let Ok(directive) = "tokenizers::tokenizer::serialization=error".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}
