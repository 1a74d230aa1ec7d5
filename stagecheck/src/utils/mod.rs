//! Small helpers shared across components.

mod ids;
mod panic;

pub use ids::{format_cluster_name, random_region, unique_id, UNIQUE_ID_LEN};
pub use panic::panic_message;
