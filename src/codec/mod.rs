//! Response codec (spec.md §4.6): render invocation outcomes to reply
//! frames and invert that on the client.

pub mod response;

pub use response::{decode_v1, decode_v2, encode_v1, encode_v2, encode_v2_error, ResponseBody};
