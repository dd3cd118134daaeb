//! Built-in capability set.
//!
//! Registers the stock `text` and `fs` tools into a capability registry.
//! Everything here is deliberately small and deterministic; model-backed
//! tools plug in through the same `Capability` trait.

pub mod fs;
pub mod text;

use syllog_core::body::{Body, BodyContext};

/// Construct a registry preloaded with the built-in tools.
pub fn standard_body(ctx: BodyContext) -> Body {
    let mut body = Body::new(ctx);
    text::register(&mut body);
    fs::register(&mut body);
    body
}
