pub mod auth;
pub mod backend;
pub mod comments;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod pdfs;
pub mod review;
pub mod routes;
pub mod state;
