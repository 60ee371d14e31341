//! OS-level helpers shared by the kiosk crates.
//!
//! - [`reap_processes`] : termine les processus orphelins d'un pilote de rendu

mod process;

pub use process::{ReapedProcess, matches_any_pattern, reap_processes};
