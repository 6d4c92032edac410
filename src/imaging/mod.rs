//! Image processing: codec, validated operations and the pixel engine.
//!
//! - **Codec**: PNG/JPEG bytes ⇄ `DynamicImage`, format detected on decode
//! - **Operation**: option maps validated into typed parameters
//! - **Engine**: [`TransformBackend`] trait + [`ImageEngine`]

pub mod codec;
pub mod engine;
pub mod operation;

pub use codec::CodecError;
pub use engine::{ImageEngine, TransformBackend, apply_chain, apply_one};
pub use operation::{Operation, TransformError, plan};
