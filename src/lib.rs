pub mod configuration;
pub mod consumidor;
pub mod domain;
pub mod gateway;
pub mod publicador;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod utils;
