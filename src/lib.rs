//! Net-worth reporting backend: monthly aggregation of transaction history,
//! bootstrap projection bands, and the rows a net-worth chart binds to.

pub mod api;
pub mod core;
pub mod error;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Installs the global tracing subscriber. Safe to call more than once.
pub fn init() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("networth=info"));
        let _ = fmt().with_env_filter(filter).try_init();
        tracing::debug!("tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
        super::init();
    }
}
