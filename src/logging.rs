use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that respects `RUST_LOG` and writes
/// through the test harness. Safe to call from every test; only the
/// first call installs.
pub fn init_for_tests() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}
