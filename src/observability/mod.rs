pub mod events;
pub mod health;
pub mod logging;
pub mod metrics;

pub use events::{EventSubject, PipelineEvent};
pub use health::{AggregatedHealth, DependencyHealth, HealthChecker, HealthStatus};
pub use logging::{init_logging, mask_amount, mask_id, mask_sensitive, LogConfig, LogFormat};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};
