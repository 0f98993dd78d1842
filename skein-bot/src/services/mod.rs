//! Service implementations for chat platforms.
//!
//! This module provides concrete implementations of the
//! [`Service`](crate::service::Service) trait.
//!
//! # Available Services
//!
//! - [`irc::IrcService`] - IRC over plain TCP

pub mod irc;

pub use irc::IrcService;
