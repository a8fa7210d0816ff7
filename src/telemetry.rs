use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Console logging settings used by [telemetry_init]
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into))]
pub struct TelemetryOptions {
    /// [EnvFilter] directives used when `RUST_LOG` is unset
    #[builder(default = "info".to_string())]
    pub filter: String,
    /// Use the multi-line pretty formatter instead of the compact one
    #[builder(default)]
    pub pretty: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            pretty: false,
        }
    }
}

impl TelemetryOptions {
    fn env_filter(&self) -> Result<EnvFilter, anyhow::Error> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .map_err(|e| anyhow::anyhow!("Invalid log filter {:?}: {}", self.filter, e))
    }
}

/// Initialize tracing subscribers and output. The engine never calls this itself, it exists so
/// that hosts and tests have an easy way to see its logs.
///
/// Only the first call has any effect. `RUST_LOG`, if set, takes precedence over
/// [TelemetryOptions::filter].
pub fn telemetry_init(opts: &TelemetryOptions) -> Result<(), anyhow::Error> {
    TRACING_INIT
        .get_or_try_init(|| {
            let filter_layer = opts.env_filter()?;
            let pretty = opts
                .pretty
                .then(|| tracing_subscriber::fmt::layer().with_target(false).pretty());
            let compact = (!opts.pretty).then(|| tracing_subscriber::fmt::layer().compact());
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(pretty)
                .with(compact)
                .try_init()?;
            Ok::<_, anyhow::Error>(())
        })
        .map(|_| ())
}
