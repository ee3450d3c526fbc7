//! PsycheConecta - marketplace connecting wellness and ceremony guides
//! with the people looking for them
//!
//! This library provides the HTTP API, services and storage behind the
//! `psycheconecta` server binary.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
