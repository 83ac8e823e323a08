//! Command registry.
//!
//! Maps invocable command tokens to their handlers and owning extension, and
//! keeps the per-extension view (owned tokens and free-text description)
//! used by the loader, the dispatcher and the help surface.
//!
//! The registry is an explicit object shared through `Arc`, never a global.
//! Extensions do not write to it directly: their registrations are collected
//! into a [`RegistrationBatch`] and installed with [`CommandRegistry::apply`]
//! in one critical section, so a concurrent reader sees either none or all of
//! an extension's commands.

mod commands;

pub use commands::{
    AppliedBatch, CommandContext, CommandEntry, CommandHandler, CommandRegistry, CommandReply,
    RegisterOutcome, RegistrationBatch,
};
