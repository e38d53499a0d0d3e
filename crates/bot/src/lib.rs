//! Chat front end of the manga bot.
//!
//! [`EventRouter`] turns inbound events into commands ([`grammar`]) and runs
//! them against the download queue and artifact store. [`CompletionNotifier`]
//! reports finished downloads back to whoever asked for them.

pub mod error;
pub mod grammar;
pub mod mention;
pub mod notifier;
pub mod replies;
pub mod router;

pub use {
    error::{Error, Result},
    grammar::{Command, CommandKind, ParseError, ParsedCommand, ValidationError},
    notifier::CompletionNotifier,
    router::EventRouter,
};
