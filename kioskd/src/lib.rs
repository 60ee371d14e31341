//! # kioskd - Démon d'affichage kiosque
//!
//! Relie le backend de gestion (canal d'événements JSON ligne par ligne sur
//! stdin/stdout) au cœur d'affichage :
//!
//! - [`protocol`] : enveloppes `{event, payload}` et leur décodage typé
//! - [`channel`] : transport ligne par ligne
//! - [`dispatcher`] : routage des événements vers le scheduler et la session
//! - [`screencast`] : captures périodiques et flux d'images
//! - [`logging`] : subscriber `tracing` vers stderr

pub mod channel;
pub mod dispatcher;
pub mod logging;
pub mod protocol;
pub mod screencast;

pub use channel::{EventChannel, LineChannel};
pub use dispatcher::{Dispatcher, run_event_loop, spawn_state_forwarder};
pub use protocol::{DisplayUpdate, Envelope, InboundEvent, OutboundEvent, ProtocolError};
pub use screencast::{Outbound, Screencast, spawn_screenshot_uploader};
