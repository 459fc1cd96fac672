//! Blogicum - a small blog publishing platform
//!
//! Authors write posts filed under categories and optionally tagged with a
//! location; readers browse published posts and leave comments. Staff
//! manage everything through the admin screens.

pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
pub mod web;
