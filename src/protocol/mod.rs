pub mod command;
pub mod decoder;
pub mod resp;

pub use command::{CommandHandler, CommandTable, Database, Executor};
pub use decoder::{Decoder, Payload};
pub use resp::Reply;
