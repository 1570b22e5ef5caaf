//! Flattenable telemetry flags, mirroring the shape of the teacher's own
//! `TelemetryOptions` but built directly against this workspace's
//! `telemetry` crate rather than reusing a pre-packaged clap type.

use clap::Args;
use snafu::ResultExt;
use telemetry::tracing::settings::Settings;
use telemetry::Tracing;
use tracing::level_filters::LevelFilter;

use crate::error::{Result, TracingInitSnafu};

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TelemetryArgs {
    /// Enable the console log subscriber.
    #[arg(long, env, default_value_t = true)]
    pub console_log_enabled: bool,

    /// Default console log level, overridable at runtime via `CONTROL_PLANE_LOG`.
    #[arg(long, env, default_value = "info")]
    pub console_log_level: LevelFilter,

    /// Enable the OTLP log exporter.
    #[arg(long, env, default_value_t = false)]
    pub otlp_log_enabled: bool,

    /// Default OTLP log level, overridable at runtime via `CONTROL_PLANE_OTLP_LOG`.
    #[arg(long, env, default_value = "debug")]
    pub otlp_log_level: LevelFilter,

    /// Enable the OTLP trace exporter.
    #[arg(long, env, default_value_t = false)]
    pub otlp_trace_enabled: bool,

    /// Default OTLP trace level, overridable at runtime via `CONTROL_PLANE_OTLP_TRACE`.
    #[arg(long, env, default_value = "debug")]
    pub otlp_trace_level: LevelFilter,
}

impl TelemetryArgs {
    /// Initializes the process-wide tracing subscribers described by these
    /// flags, returning a guard that must be held for the lifetime of the
    /// process (dropping it tears the subscribers down).
    pub fn init(&self, service_name: &'static str) -> Result<Tracing> {
        Tracing::builder()
            .service_name(service_name)
            .with_console_output(
                Settings::builder()
                    .with_environment_variable("CONTROL_PLANE_LOG")
                    .with_default_level(self.console_log_level)
                    .enabled(self.console_log_enabled)
                    .console_log_settings_builder()
                    .build(),
            )
            .with_otlp_log_exporter(
                Settings::builder()
                    .with_environment_variable("CONTROL_PLANE_OTLP_LOG")
                    .with_default_level(self.otlp_log_level)
                    .enabled(self.otlp_log_enabled)
                    .otlp_log_settings_builder()
                    .build(),
            )
            .with_otlp_trace_exporter(
                Settings::builder()
                    .with_environment_variable("CONTROL_PLANE_OTLP_TRACE")
                    .with_default_level(self.otlp_trace_level)
                    .enabled(self.otlp_trace_enabled)
                    .otlp_trace_settings_builder()
                    .build(),
            )
            .build()
            .init()
            .context(TracingInitSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_args_default_console_level_is_info() {
        let args = TelemetryArgs {
            console_log_enabled: true,
            console_log_level: LevelFilter::INFO,
            otlp_log_enabled: false,
            otlp_log_level: LevelFilter::DEBUG,
            otlp_trace_enabled: false,
            otlp_trace_level: LevelFilter::DEBUG,
        };
        assert_eq!(args.console_log_level, LevelFilter::INFO);
    }
}
