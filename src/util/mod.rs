//! Small helpers shared across modules.

mod b64;

pub use b64::{decode as b64_decode, encode as b64_encode};
