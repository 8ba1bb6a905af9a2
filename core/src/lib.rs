pub mod coach;
pub mod compartments;
pub mod db;
pub mod import;
pub mod models;
pub mod plan;
pub mod service;
pub mod session;
