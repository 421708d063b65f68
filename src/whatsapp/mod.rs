//! WhatsApp Cloud API: outbound text messages and the inbound webhook

pub mod client;
pub mod webhook;

pub use client::{normalize_phone, WhatsAppClient, WhatsAppError};
