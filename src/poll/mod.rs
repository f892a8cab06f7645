//! Poll domain — model, command grammar, lifecycle engine, dispatcher.

pub mod command;
pub mod dispatcher;
pub mod engine;
pub mod model;

pub use command::Command;
pub use dispatcher::Dispatcher;
pub use engine::PollEngine;
pub use model::{Vote, VoteOption};
