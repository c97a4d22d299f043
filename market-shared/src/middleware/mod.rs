pub mod metrics_layer;

pub use metrics_layer::{init_metrics, metrics_middleware};
