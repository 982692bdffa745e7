// Library exports for postboard
// Integration tests build the router through these modules

pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod format;
pub mod likes;
pub mod pagination;
pub mod routes;
pub mod state;
