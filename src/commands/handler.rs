//! Command Dispatch
//!
//! This module routes decoded commands to the storage engine and shapes the
//! results into wire replies. Command names are case-insensitive ASCII;
//! keys, fields, values, and members are binary-safe byte strings and pass
//! through untouched.
//!
//! ## Supported commands
//!
//! Strings: `SET` (with `EX`/`PX`), `GET`, `MSET`, `MGET`, `DEL`, `EXISTS`,
//! `INCR`, `DECR`, `INCRBY`, `DECRBY`, `EXPIRE`, `TTL`
//!
//! Lists: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LRANGE`, `LINDEX`
//!
//! Hashes: `HSET`, `HGET`, `HDEL`, `HEXISTS`, `HGETALL`, `HKEYS`, `HVALS`,
//! `HLEN`
//!
//! Sets: `SADD`, `SMEMBERS`, `SISMEMBER`, `SREM`, `SCARD`, `SINTER`,
//! `SUNION`
//!
//! Sorted sets: `ZADD`, `ZRANGE` (with `WITHSCORES`), `ZRANK`, `ZREM`,
//! `ZSCORE`, `ZCARD`
//!
//! Keyspace and server: `KEYS`, `TYPE`, `DBSIZE`, `FLUSHDB`, `PING`,
//! `ECHO`, `QUIT`
//!
//! ## Error policy
//!
//! Every command-level failure (bad arity, type conflict, unparsable
//! number) becomes an error reply; state is never touched and the
//! connection stays open. Only `QUIT` asks the connection layer to close,
//! and only after its `+OK` has been written.

use crate::protocol::Reply;
use crate::storage::{format_score, StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Routes commands to the storage engine. Cheap to clone; one per
/// connection.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

/// Arity-error reply; the command name is lowercased by convention.
fn wrong_args(name: &str) -> Reply {
    Reply::error(format!(
        "wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn store_err(err: StoreError) -> Reply {
    Reply::error(err.to_string())
}

fn not_integer() -> Reply {
    Reply::error("value is not an integer or out of range")
}

fn syntax_error() -> Reply {
    Reply::error("syntax error")
}

fn parse_int(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// Parses a score. NaN is rejected here so it can never enter a sorted set.
fn parse_float(arg: &[u8]) -> Option<f64> {
    let f: f64 = std::str::from_utf8(arg).ok()?.parse().ok()?;
    if f.is_nan() {
        return None;
    }
    Some(f)
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes one decoded command.
    ///
    /// Returns the reply and whether the connection should close after the
    /// reply has been flushed (true only for QUIT).
    pub fn execute(&self, args: Vec<Bytes>) -> (Reply, bool) {
        let name_bytes = match args.first() {
            Some(name) => name.clone(),
            None => return (Reply::error("empty command"), false),
        };
        let original = String::from_utf8_lossy(&name_bytes).into_owned();
        let name = original.to_ascii_uppercase();

        if name == "QUIT" {
            return (Reply::ok(), true);
        }

        let reply = self.dispatch(&name, &original, &args[1..]);
        (reply, false)
    }

    fn dispatch(&self, name: &str, original: &str, args: &[Bytes]) -> Reply {
        match name {
            // String family
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "MSET" => self.cmd_mset(args),
            "MGET" => self.cmd_mget(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "INCR" => self.cmd_incr_by(args, "incr", 1, false),
            "DECR" => self.cmd_incr_by(args, "decr", -1, false),
            "INCRBY" => self.cmd_incr_by(args, "incrby", 1, true),
            "DECRBY" => self.cmd_incr_by(args, "decrby", -1, true),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),

            // List family
            "LPUSH" => self.cmd_push(args, "lpush", true),
            "RPUSH" => self.cmd_push(args, "rpush", false),
            "LPOP" => self.cmd_pop(args, "lpop", true),
            "RPOP" => self.cmd_pop(args, "rpop", false),
            "LLEN" => self.cmd_llen(args),
            "LRANGE" => self.cmd_lrange(args),
            "LINDEX" => self.cmd_lindex(args),

            // Hash family
            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HDEL" => self.cmd_hdel(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HKEYS" => self.cmd_hkeys(args),
            "HVALS" => self.cmd_hvals(args),
            "HLEN" => self.cmd_hlen(args),

            // Set family
            "SADD" => self.cmd_sadd(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SREM" => self.cmd_srem(args),
            "SCARD" => self.cmd_scard(args),
            "SINTER" => self.cmd_setop(args, "sinter", true),
            "SUNION" => self.cmd_setop(args, "sunion", false),

            // Sorted-set family
            "ZADD" => self.cmd_zadd(args),
            "ZRANGE" => self.cmd_zrange(args),
            "ZRANK" => self.cmd_zrank(args),
            "ZREM" => self.cmd_zrem(args),
            "ZSCORE" => self.cmd_zscore(args),
            "ZCARD" => self.cmd_zcard(args),

            // Keyspace and server
            "KEYS" => self.cmd_keys(args),
            "TYPE" => self.cmd_type(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHDB" => self.cmd_flushdb(args),
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),

            _ => Reply::error(format!("unknown command '{}'", original)),
        }
    }

    // ========================================================================
    // String family
    // ========================================================================

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_args("set");
        }

        let mut ttl: Option<Duration> = None;
        let mut i = 2;
        while i < args.len() {
            let opt = args[i].to_ascii_uppercase();
            let millis = match opt.as_slice() {
                b"EX" => false,
                b"PX" => true,
                _ => return syntax_error(),
            };

            // Each expiry option may appear at most once, and EX and PX are
            // mutually exclusive.
            if ttl.is_some() {
                return syntax_error();
            }
            i += 1;
            let raw = match args.get(i) {
                Some(raw) => raw,
                None => return syntax_error(),
            };
            let amount = match parse_int(raw) {
                Some(amount) => amount,
                None => return not_integer(),
            };
            if amount <= 0 {
                return Reply::error("invalid expire time in set");
            }
            ttl = Some(if millis {
                Duration::from_millis(amount as u64)
            } else {
                Duration::from_secs(amount as u64)
            });
            i += 1;
        }

        self.storage.set(args[0].clone(), args[1].clone(), ttl);
        Reply::ok()
    }

    /// GET key. A present non-string is a type error, never null.
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("get");
        }
        match self.storage.get(&args[0]) {
            Ok(Some(value)) => Reply::Bulk(value),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    /// MSET key value [key value ...]
    fn cmd_mset(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() || args.len() % 2 != 0 {
            return wrong_args("mset");
        }
        for pair in args.chunks_exact(2) {
            self.storage.set(pair[0].clone(), pair[1].clone(), None);
        }
        Reply::ok()
    }

    /// MGET key [key ...]. Never fails.
    fn cmd_mget(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return wrong_args("mget");
        }
        Reply::Array(
            self.storage
                .mget(args)
                .into_iter()
                .map(|value| value.map(Reply::Bulk).unwrap_or(Reply::Null))
                .collect(),
        )
    }

    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return wrong_args("del");
        }
        Reply::Integer(self.storage.del(args) as i64)
    }

    fn cmd_exists(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return wrong_args("exists");
        }
        Reply::Integer(self.storage.exists(args) as i64)
    }

    /// Shared body of INCR / DECR / INCRBY / DECRBY.
    fn cmd_incr_by(&self, args: &[Bytes], name: &str, sign: i64, takes_amount: bool) -> Reply {
        let expected = if takes_amount { 2 } else { 1 };
        if args.len() != expected {
            return wrong_args(name);
        }

        let amount = if takes_amount {
            match parse_int(&args[1]) {
                Some(amount) => amount,
                None => return not_integer(),
            }
        } else {
            1
        };
        // DECRBY i64::MIN has no representable negation
        let delta = match amount.checked_mul(sign) {
            Some(delta) => delta,
            None => return not_integer(),
        };

        match self.storage.incr_by(&args[0], delta) {
            Ok(next) => Reply::Integer(next),
            Err(err) => store_err(err),
        }
    }

    fn cmd_expire(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("expire");
        }
        let seconds = match parse_int(&args[1]) {
            Some(seconds) => seconds,
            None => return not_integer(),
        };
        Reply::Integer(self.storage.expire(&args[0], seconds))
    }

    fn cmd_ttl(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("ttl");
        }
        Reply::Integer(self.storage.ttl(&args[0]))
    }

    // ========================================================================
    // List family
    // ========================================================================

    fn cmd_push(&self, args: &[Bytes], name: &str, front: bool) -> Reply {
        if args.len() < 2 {
            return wrong_args(name);
        }
        let values = args[1..].to_vec();
        let result = if front {
            self.storage.lpush(&args[0], values)
        } else {
            self.storage.rpush(&args[0], values)
        };
        match result {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_pop(&self, args: &[Bytes], name: &str, front: bool) -> Reply {
        if args.len() != 1 {
            return wrong_args(name);
        }
        let result = if front {
            self.storage.lpop(&args[0])
        } else {
            self.storage.rpop(&args[0])
        };
        match result {
            Ok(Some(value)) => Reply::Bulk(value),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    fn cmd_llen(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("llen");
        }
        match self.storage.llen(&args[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_lrange(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return wrong_args("lrange");
        }
        let (start, stop) = match (parse_int(&args[1]), parse_int(&args[2])) {
            (Some(start), Some(stop)) => (start, stop),
            _ => return not_integer(),
        };
        match self.storage.lrange(&args[0], start, stop) {
            Ok(values) => Reply::Array(values.into_iter().map(Reply::Bulk).collect()),
            Err(err) => store_err(err),
        }
    }

    fn cmd_lindex(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("lindex");
        }
        let index = match parse_int(&args[1]) {
            Some(index) => index,
            None => return not_integer(),
        };
        match self.storage.lindex(&args[0], index) {
            Ok(Some(value)) => Reply::Bulk(value),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    // ========================================================================
    // Hash family
    // ========================================================================

    fn cmd_hset(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return wrong_args("hset");
        }
        match self
            .storage
            .hset(&args[0], args[1].clone(), args[2].clone())
        {
            Ok(added) => Reply::Integer(added),
            Err(err) => store_err(err),
        }
    }

    fn cmd_hget(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("hget");
        }
        match self.storage.hget(&args[0], &args[1]) {
            Ok(Some(value)) => Reply::Bulk(value),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    fn cmd_hdel(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_args("hdel");
        }
        match self.storage.hdel(&args[0], &args[1..]) {
            Ok(removed) => Reply::Integer(removed as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_hexists(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("hexists");
        }
        match self.storage.hexists(&args[0], &args[1]) {
            Ok(present) => Reply::Integer(present as i64),
            Err(err) => store_err(err),
        }
    }

    /// HGETALL key. Fields and values interleaved, flat.
    fn cmd_hgetall(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("hgetall");
        }
        match self.storage.hgetall(&args[0]) {
            Ok(pairs) => {
                let mut items = Vec::with_capacity(pairs.len() * 2);
                for (field, value) in pairs {
                    items.push(Reply::Bulk(field));
                    items.push(Reply::Bulk(value));
                }
                Reply::Array(items)
            }
            Err(err) => store_err(err),
        }
    }

    fn cmd_hkeys(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("hkeys");
        }
        match self.storage.hkeys(&args[0]) {
            Ok(fields) => Reply::Array(fields.into_iter().map(Reply::Bulk).collect()),
            Err(err) => store_err(err),
        }
    }

    fn cmd_hvals(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("hvals");
        }
        match self.storage.hvals(&args[0]) {
            Ok(values) => Reply::Array(values.into_iter().map(Reply::Bulk).collect()),
            Err(err) => store_err(err),
        }
    }

    fn cmd_hlen(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("hlen");
        }
        match self.storage.hlen(&args[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => store_err(err),
        }
    }

    // ========================================================================
    // Set family
    // ========================================================================

    fn cmd_sadd(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_args("sadd");
        }
        match self.storage.sadd(&args[0], args[1..].to_vec()) {
            Ok(added) => Reply::Integer(added as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_smembers(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("smembers");
        }
        match self.storage.smembers(&args[0]) {
            Ok(members) => Reply::Array(members.into_iter().map(Reply::Bulk).collect()),
            Err(err) => store_err(err),
        }
    }

    fn cmd_sismember(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("sismember");
        }
        match self.storage.sismember(&args[0], &args[1]) {
            Ok(present) => Reply::Integer(present as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_srem(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_args("srem");
        }
        match self.storage.srem(&args[0], &args[1..]) {
            Ok(removed) => Reply::Integer(removed as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_scard(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("scard");
        }
        match self.storage.scard(&args[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => store_err(err),
        }
    }

    /// Shared body of SINTER / SUNION.
    fn cmd_setop(&self, args: &[Bytes], name: &str, intersect: bool) -> Reply {
        if args.is_empty() {
            return wrong_args(name);
        }
        let result = if intersect {
            self.storage.sinter(args)
        } else {
            self.storage.sunion(args)
        };
        match result {
            Ok(members) => Reply::Array(members.into_iter().map(Reply::Bulk).collect()),
            Err(err) => store_err(err),
        }
    }

    // ========================================================================
    // Sorted-set family
    // ========================================================================

    /// ZADD key score member [score member ...]
    fn cmd_zadd(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || (args.len() - 1) % 2 != 0 {
            return wrong_args("zadd");
        }

        let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
        for chunk in args[1..].chunks_exact(2) {
            let score = match parse_float(&chunk[0]) {
                Some(score) => score,
                None => return Reply::error("value is not a valid float"),
            };
            pairs.push((score, chunk[1].clone()));
        }

        match self.storage.zadd(&args[0], pairs) {
            Ok(added) => Reply::Integer(added as i64),
            Err(err) => store_err(err),
        }
    }

    /// ZRANGE key start stop [WITHSCORES]
    fn cmd_zrange(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 && args.len() != 4 {
            return wrong_args("zrange");
        }
        let with_scores = match args.get(3) {
            None => false,
            Some(opt) if opt.eq_ignore_ascii_case(b"WITHSCORES") => true,
            Some(_) => return syntax_error(),
        };
        let (start, stop) = match (parse_int(&args[1]), parse_int(&args[2])) {
            (Some(start), Some(stop)) => (start, stop),
            _ => return not_integer(),
        };

        match self.storage.zrange(&args[0], start, stop) {
            Ok(pairs) => {
                let mut items = Vec::with_capacity(pairs.len() * if with_scores { 2 } else { 1 });
                for (member, score) in pairs {
                    items.push(Reply::Bulk(member));
                    if with_scores {
                        items.push(Reply::bulk(format_score(score)));
                    }
                }
                Reply::Array(items)
            }
            Err(err) => store_err(err),
        }
    }

    fn cmd_zrank(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("zrank");
        }
        match self.storage.zrank(&args[0], &args[1]) {
            Ok(Some(rank)) => Reply::Integer(rank as i64),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    fn cmd_zrem(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_args("zrem");
        }
        match self.storage.zrem(&args[0], &args[1..]) {
            Ok(removed) => Reply::Integer(removed as i64),
            Err(err) => store_err(err),
        }
    }

    fn cmd_zscore(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_args("zscore");
        }
        match self.storage.zscore(&args[0], &args[1]) {
            Ok(Some(score)) => Reply::bulk(format_score(score)),
            Ok(None) => Reply::Null,
            Err(err) => store_err(err),
        }
    }

    fn cmd_zcard(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("zcard");
        }
        match self.storage.zcard(&args[0]) {
            Ok(len) => Reply::Integer(len as i64),
            Err(err) => store_err(err),
        }
    }

    // ========================================================================
    // Keyspace and server
    // ========================================================================

    fn cmd_keys(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("keys");
        }
        Reply::Array(
            self.storage
                .keys(&args[0])
                .into_iter()
                .map(Reply::Bulk)
                .collect(),
        )
    }

    fn cmd_type(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("type");
        }
        Reply::simple(self.storage.key_type(&args[0]))
    }

    fn cmd_dbsize(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return wrong_args("dbsize");
        }
        Reply::Integer(self.storage.len() as i64)
    }

    fn cmd_flushdb(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return wrong_args("flushdb");
        }
        self.storage.flush();
        Reply::ok()
    }

    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args.len() {
            0 => Reply::pong(),
            1 => Reply::Bulk(args[0].clone()),
            _ => wrong_args("ping"),
        }
    }

    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_args("echo");
        }
        Reply::Bulk(args[0].clone())
    }
}
