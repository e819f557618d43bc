//! Scatto renders Markdown, including math and highlighted code, into a
//! single raster image by driving one shared headless browser instance.
//!
//! The crate splits into three layers: [`config`] resolves layered settings,
//! [`application::engine`] owns the browser lifecycle, and
//! [`application::render`] runs the per-request pipeline from raw text to a
//! captured image artifact.

pub mod application;
pub mod config;
pub mod infra;
