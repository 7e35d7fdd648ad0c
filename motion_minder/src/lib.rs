pub mod accumulator;
pub mod communication;
pub mod config;
pub mod controller_service;
pub mod homing;
pub mod logging;
pub mod models;
pub mod odometer;
pub mod persistence;
pub mod router;
pub mod state_monitor;
pub mod subscription;
