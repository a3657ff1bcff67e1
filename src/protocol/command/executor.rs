use super::string;
use super::{CommandTable, Executor};
use crate::network::Session;
use crate::protocol::Reply;
use crate::store::ShardedStore;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// The keyspace served by [`Database`]
pub type Keyspace = ShardedStore<Bytes>;

/// Executes commands from the built-in table against a sharded keyspace
pub struct Database {
    keyspace: Arc<Keyspace>,
    commands: CommandTable<Keyspace>,
}

impl Database {
    /// Create a database over a fresh keyspace sized from `capacity_hint`
    pub fn with_capacity(capacity_hint: usize) -> Self {
        Self::new(Arc::new(Keyspace::new(capacity_hint)))
    }

    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        let mut commands = CommandTable::new();
        commands
            .register("ping", -1, ping)
            .register("echo", 2, echo)
            .register("dbsize", 1, dbsize);
        string::register(&mut commands);

        info!(
            "Keyspace ready with {} shards, {} commands",
            keyspace.shard_count(),
            commands.len()
        );

        Self { keyspace, commands }
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    /// Table used for dispatch, for registering extra commands
    pub fn commands_mut(&mut self) -> &mut CommandTable<Keyspace> {
        &mut self.commands
    }
}

impl Executor for Database {
    fn execute(&self, session: &Session, args: &[Option<Bytes>]) -> Option<Reply> {
        if args.is_empty() {
            return None;
        }

        let Some(args) = args.iter().cloned().collect::<Option<Vec<Bytes>>>() else {
            return Some(Reply::error("ERR invalid null argument"));
        };

        debug!(
            "session {} exec {}",
            session.id(),
            String::from_utf8_lossy(&args[0])
        );

        let reply = self
            .commands
            .dispatch(&self.keyspace, session, &args)
            .unwrap_or_else(|e| e.to_reply());
        Some(reply)
    }

    fn close(&self) {
        info!(
            "Closing keyspace ({} keys inserted)",
            self.keyspace.approx_len()
        );
    }
}

fn ping(_keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    match args {
        [] => Reply::SimpleString("PONG".to_string()),
        [msg] => Reply::BulkString(Some(msg.clone())),
        _ => Reply::error("ERR wrong number of arguments for 'ping' command"),
    }
}

fn echo(_keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    Reply::BulkString(Some(args[0].clone()))
}

fn dbsize(keyspace: &Keyspace, _session: &Session, _args: &[Bytes]) -> Reply {
    Reply::Integer(keyspace.approx_len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::test_support::loopback_session;

    fn cmd(parts: &[&str]) -> Vec<Option<Bytes>> {
        parts
            .iter()
            .map(|p| Some(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    #[test]
    fn test_ping_echo() {
        let (session, _peer) = loopback_session();
        let db = Database::with_capacity(0);

        assert_eq!(
            db.execute(&session, &cmd(&["PING"])),
            Some(Reply::SimpleString("PONG".into()))
        );
        assert_eq!(
            db.execute(&session, &cmd(&["ping", "hi"])),
            Some(Reply::bulk("hi"))
        );
        assert_eq!(
            db.execute(&session, &cmd(&["ping", "a", "b"])),
            Some(Reply::error(
                "ERR wrong number of arguments for 'ping' command"
            ))
        );
        assert_eq!(
            db.execute(&session, &cmd(&["echo", "hello"])),
            Some(Reply::bulk("hello"))
        );
    }

    #[test]
    fn test_empty_and_null_arguments() {
        let (session, _peer) = loopback_session();
        let db = Database::with_capacity(0);

        assert_eq!(db.execute(&session, &[]), None);
        assert_eq!(
            db.execute(&session, &[Some(Bytes::from_static(b"GET")), None]),
            Some(Reply::error("ERR invalid null argument"))
        );
    }

    #[test]
    fn test_unknown_and_arity_errors() {
        let (session, _peer) = loopback_session();
        let db = Database::with_capacity(0);

        assert_eq!(
            db.execute(&session, &cmd(&["FLY"])),
            Some(Reply::error("ERR unknown command 'fly'"))
        );
        assert_eq!(
            db.execute(&session, &cmd(&["GET"])),
            Some(Reply::error(
                "ERR wrong number of arguments for 'get' command"
            ))
        );
    }

    #[test]
    fn test_dbsize_counts_first_inserts() {
        let (session, _peer) = loopback_session();
        let db = Database::with_capacity(0);

        db.execute(&session, &cmd(&["SET", "a", "1"]));
        db.execute(&session, &cmd(&["SET", "a", "2"]));
        db.execute(&session, &cmd(&["SET", "b", "1"]));
        assert_eq!(
            db.execute(&session, &cmd(&["DBSIZE"])),
            Some(Reply::Integer(2))
        );
    }

    #[test]
    fn test_extra_commands() {
        let (session, _peer) = loopback_session();
        let mut db = Database::with_capacity(0);
        db.commands_mut().register(
            "shards",
            1,
            |ks: &Keyspace, _: &Session, _: &[Bytes]| -> Reply {
                Reply::Integer(ks.shard_count() as i64)
            },
        );

        assert_eq!(
            db.execute(&session, &cmd(&["SHARDS"])),
            Some(Reply::Integer(16))
        );
    }
}
