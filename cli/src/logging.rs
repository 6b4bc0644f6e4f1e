//! Tracing initialisation for the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainwatch_core::config::LogConfig;

/// Filter directives from the config block; `verbose` raises the global
/// level to `debug`.
pub fn directives(config: &LogConfig, verbose: bool) -> String {
    if !verbose {
        return config.directives();
    }
    let mut raised = config.clone();
    raised.level = "debug".into();
    raised.directives()
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// config when set. Call once at startup.
pub fn init_tracing(config: &LogConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(config, verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn verbose_raises_global_level_only() {
        let config = LogConfig {
            level: "warn".into(),
            components: HashMap::from([("chainwatch-ws".to_string(), "trace".to_string())]),
            json: false,
        };
        assert_eq!(directives(&config, false), "warn,chainwatch_ws=trace");
        assert_eq!(directives(&config, true), "debug,chainwatch_ws=trace");
    }
}
