//! Command dispatch.
//!
//! The server only depends on [`Executor`]. [`CommandTable`] is a name-keyed
//! registry of handlers that executors can build on; [`Database`] is the
//! built-in executor over the sharded keyspace.

use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::Reply;
use bytes::Bytes;
use std::collections::HashMap;

mod executor;
mod string;

pub use executor::{Database, Keyspace};

/// Runs decoded command arrays on behalf of a session
pub trait Executor: Send + Sync {
    /// Execute one command line.
    ///
    /// `None` tells the server it has no reply for this input; the server then
    /// answers with a generic error.
    fn execute(&self, session: &Session, args: &[Option<Bytes>]) -> Option<Reply>;

    /// Called once while the server stops, after every session was closed
    fn close(&self) {}
}

/// A single command implementation over shared state `S`.
///
/// `args` excludes the command name.
pub trait CommandHandler<S>: Send + Sync {
    fn execute(&self, state: &S, session: &Session, args: &[Bytes]) -> Reply;
}

impl<S, F> CommandHandler<S> for F
where
    F: Fn(&S, &Session, &[Bytes]) -> Reply + Send + Sync,
{
    fn execute(&self, state: &S, session: &Session, args: &[Bytes]) -> Reply {
        self(state, session, args)
    }
}

struct Command<S> {
    /// Redis-style: name included, negative means "at least"
    arity: i32,
    handler: Box<dyn CommandHandler<S>>,
}

impl<S> Command<S> {
    fn accepts(&self, argc: usize) -> bool {
        let wanted = self.arity.unsigned_abs() as usize;
        if self.arity < 0 {
            argc >= wanted
        } else {
            argc == wanted
        }
    }
}

/// Case-insensitive registry from command name to handler
pub struct CommandTable<S> {
    commands: HashMap<String, Command<S>>,
}

impl<S> CommandTable<S> {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any previous entry
    pub fn register<H>(&mut self, name: &str, arity: i32, handler: H) -> &mut Self
    where
        H: CommandHandler<S> + 'static,
    {
        self.commands.insert(
            name.to_ascii_lowercase(),
            Command {
                arity,
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Look up `args[0]` and run it with the remaining arguments
    pub fn dispatch(&self, state: &S, session: &Session, args: &[Bytes]) -> Result<Reply> {
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| Error::InvalidCommand(String::new()))?;

        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let command = self
            .commands
            .get(&name)
            .ok_or_else(|| Error::InvalidCommand(name.clone()))?;

        if !command.accepts(args.len()) {
            return Err(Error::WrongArity(name));
        }

        Ok(command.handler.execute(state, session, rest))
    }
}

impl<S> Default for CommandTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
