mod frame;
pub mod message;

pub use frame::{CorrelationId, Frame, encode_frame};
pub use message::{
    error_response, extract_route, find_header_end, rewrite_host, tagged_error_response,
    timeout_response,
};
