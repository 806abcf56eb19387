//! Client library for the Anthropic messages API.
//!
//! Requests are encoded from provider-neutral chat types, responses are
//! decoded into completions, and streaming responses are assembled from
//! server-sent events into cumulative chunk snapshots.

pub mod assembler;
pub mod client;
pub mod errors;
pub mod request;
pub mod stream;
pub mod types;
pub mod utils;

#[allow(unused_imports)]
pub use assembler::*;
#[allow(unused_imports)]
pub use client::*;
#[allow(unused_imports)]
pub use errors::*;
#[allow(unused_imports)]
pub use request::*;
#[allow(unused_imports)]
pub use stream::*;
#[allow(unused_imports)]
pub use types::*;
