//! Core data models for the image service.
//!
//! `ImageMetadata` maps onto the `images` table via `sqlx::FromRow`;
//! `Transformation` is the caller-facing description of one pipeline step.

pub mod image;
pub mod transformation;
