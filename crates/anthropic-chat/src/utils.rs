//! Wire-format utility helpers (SSE scanning, media sources, canonical JSON).

pub mod json;
pub mod media;
pub mod sse;

pub use json::*;
pub use media::*;
pub use sse::*;
