//! Embeds de respuesta para los comandos de la radio

pub mod embeds;
