//! Tower/Axum instrumentation layers built on top of the `tracing`
//! subscribers configured in [`crate::tracing`].

pub mod axum;

pub use axum::TraceLayer as AxumTraceLayer;
