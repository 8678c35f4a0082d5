//! HTTP features behind the gateway

pub mod records;
