/// Initialize structured logging: fmt subscriber with `RUST_LOG` filtering,
/// INFO by default. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}
