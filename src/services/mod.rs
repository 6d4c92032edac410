pub mod image_service;

pub use image_service::{
    ImageEntry, ImagePage, ImageService, ServiceConfig, ServiceError, ServiceResult,
};
