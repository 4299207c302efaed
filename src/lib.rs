//! OCR relay: forwards uploaded images to OCR.space and returns their text.
//!
//! The [`server`] module is the relay endpoint; [`uploader`] is the client
//! that validates and submits images to it.

pub mod config;
pub mod error;
pub mod ocr;
pub mod schema;
pub mod server;
pub mod upload;
pub mod uploader;
