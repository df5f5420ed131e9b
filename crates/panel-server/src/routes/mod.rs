pub mod control;
pub mod dashboard;
pub mod reload;
pub mod webhook;
