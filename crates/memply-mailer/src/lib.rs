//! # Memply Mailer
//!
//! Outbound reminder delivery: the SMTP `Transport` implementation
//! (async lettre) and the placeholder template renderer.

pub mod smtp;
pub mod template;

pub use smtp::SmtpMailer;
pub use template::{reminder_vars, render};
