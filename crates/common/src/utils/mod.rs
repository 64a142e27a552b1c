mod id;
mod outgoing;
mod time;

pub use id::generate_correlation_id;
pub use outgoing::spawn_write_task;
pub use time::{http_date, http_date_at};
