mod describe;
mod health;
mod index;
mod metrics;

pub use describe::{DescribeBody, describe_handler};
pub use health::health_handler;
pub use index::index_handler;
pub use metrics::metrics_handler;
