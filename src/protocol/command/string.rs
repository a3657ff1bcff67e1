//! String commands.
//!
//! Multi-key commands run inside one `lock`/`rlock` section so they observe
//! and update all their keys atomically.

use super::{CommandTable, Keyspace};
use crate::error::Error;
use crate::network::Session;
use crate::protocol::Reply;
use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable<Keyspace>) {
    table
        .register("get", 2, get)
        .register("set", 3, set)
        .register("setnx", 3, setnx)
        .register("mget", -2, mget)
        .register("mset", -3, mset)
        .register("msetnx", -3, msetnx)
        .register("exists", -2, exists);
}

fn get(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    Reply::BulkString(keyspace.get(&args[0]))
}

fn set(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    keyspace.put(args[0].clone(), args[1].clone());
    Reply::ok()
}

fn setnx(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    let mut locks = keyspace.lock(&args[..1]);
    if locks.contains_key(&args[0]) {
        return Reply::Integer(0);
    }
    locks.put(args[0].clone(), args[1].clone());
    locks.unlock();
    Reply::Integer(1)
}

fn mget(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    let locks = keyspace.rlock(args);
    let values = args.iter().map(|key| locks.get(key).cloned()).collect();
    locks.runlock();
    Reply::Array(Some(values))
}

fn mset(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    let Some(keys) = pair_keys(args) else {
        return Error::WrongArity("mset".into()).to_reply();
    };

    let mut locks = keyspace.lock(&keys);
    for pair in args.chunks_exact(2) {
        locks.put(pair[0].clone(), pair[1].clone());
    }
    locks.unlock();
    Reply::ok()
}

fn msetnx(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    let Some(keys) = pair_keys(args) else {
        return Error::WrongArity("msetnx".into()).to_reply();
    };

    let mut locks = keyspace.lock(&keys);
    if keys.iter().any(|key| locks.contains_key(key)) {
        return Reply::Integer(0);
    }
    for pair in args.chunks_exact(2) {
        locks.put(pair[0].clone(), pair[1].clone());
    }
    locks.unlock();
    Reply::Integer(1)
}

fn exists(keyspace: &Keyspace, _session: &Session, args: &[Bytes]) -> Reply {
    let locks = keyspace.rlock(args);
    let found = args.iter().filter(|key| locks.contains_key(key)).count();
    Reply::Integer(found as i64)
}

/// Keys of a `key value [key value ...]` list, or `None` if it is not paired up
fn pair_keys(args: &[Bytes]) -> Option<Vec<&[u8]>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return None;
    }
    Some(args.iter().step_by(2).map(|key| &key[..]).collect())
}
