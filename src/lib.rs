//! Order-taking backend for a food-delivery service.
//!
//! The interesting part is the restaurant matcher: for an order it finds the
//! restaurants stocking every ordered product ([`menu`]), geocodes the
//! delivery and restaurant addresses through a persistent cache
//! ([`geocoder`], [`store`]) and ranks the candidates by great-circle
//! distance ([`geo`], [`matcher`]). [`api`] and [`cli`] are thin shells
//! around it.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod geo;
pub mod geocoder;
pub mod matcher;
pub mod menu;
pub mod orders;
pub mod state;
pub mod store;
pub mod utils;
