pub mod status;
pub mod webhook;
