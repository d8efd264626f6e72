pub mod logging;

pub use logging::{LogFormat, TracingConfig, init_tracing};
