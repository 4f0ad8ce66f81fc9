pub mod api;
pub mod client;
pub mod controller;
#[cfg(feature = "server")]
pub mod db;
pub mod drawer;
pub mod error;
pub mod retry;
pub mod settings;
#[cfg(feature = "server")]
pub mod settlement;
pub mod slip;
