use bytes::Bytes;
use tracing::error;

use inmemdb_core::snapshot;
use inmemdb_core::Database;

use crate::resp::{lenient_i64, Frame, ReplyBuf};
use crate::server::ServerCtx;

const WRONGTYPE_MSG: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER_MSG: &str = "ERR value is not an integer or out of range";
const INVALID_FORMAT_MSG: &str = "ERR invalid command format";

/// Executes one request and writes exactly one reply.
///
/// Requests are arrays of bulk strings; the first element names the
/// command, case-insensitively. Handlers validate their own argument
/// counts.
pub fn execute(db: &mut Database, ctx: &ServerCtx, request: &Frame, reply: &mut ReplyBuf) {
    let items = match request {
        Frame::Array(items) if !items.is_empty() => items.as_slice(),
        _ => {
            reply.write_error(INVALID_FORMAT_MSG);
            return;
        }
    };

    let Some(name) = arg(items, 0) else {
        reply.write_error("ERR invalid command");
        return;
    };

    match name.to_ascii_uppercase().as_slice() {
        b"PING" => cmd_ping(items, reply),
        b"SET" => cmd_set(db, items, reply),
        b"GET" => cmd_get(db, items, reply),
        b"DEL" => cmd_del(db, items, reply),
        b"EXISTS" => cmd_exists(db, items, reply),
        b"INCR" => cmd_incr_by(db, items, reply, 1, "INCR"),
        b"DECR" => cmd_incr_by(db, items, reply, -1, "DECR"),
        b"MSET" => cmd_mset(db, items, reply),
        b"MGET" => cmd_mget(db, items, reply),
        b"LPUSH" => cmd_push(db, items, reply, true, "LPUSH"),
        b"RPUSH" => cmd_push(db, items, reply, false, "RPUSH"),
        b"LPOP" => cmd_pop(db, items, reply, true, "LPOP"),
        b"RPOP" => cmd_pop(db, items, reply, false, "RPOP"),
        b"LLEN" => cmd_llen(db, items, reply),
        b"LRANGE" => cmd_lrange(db, items, reply),
        b"EXPIRE" => cmd_expire(db, items, reply),
        b"TTL" => cmd_ttl(db, items, reply),
        b"PERSIST" => cmd_persist(db, items, reply),
        b"DBSIZE" => reply.write_integer(db.len() as i64),
        b"FLUSHDB" => {
            db.flush();
            reply.write_simple("OK");
        }
        b"INFO" => cmd_info(db, reply),
        b"SAVE" => cmd_save(db, ctx, reply),
        b"SHUTDOWN" => cmd_shutdown(db, ctx, reply),
        _ => reply.write_error(&format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(name)
        )),
    }
}

/// Textual argument at `index`, if present.
fn arg(items: &[Frame], index: usize) -> Option<&Bytes> {
    items.get(index)?.as_text()
}

fn wrong_args(reply: &mut ReplyBuf, name: &str) {
    reply.write_error(&format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ));
}

fn cmd_ping(items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() > 1 {
        match arg(items, 1) {
            Some(msg) => reply.write_bulk(msg),
            None => reply.write_error(INVALID_FORMAT_MSG),
        }
    } else {
        reply.write_simple("PONG");
    }
}

fn cmd_set(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 3 {
        return wrong_args(reply, "SET");
    }
    let (Some(key), Some(value)) = (arg(items, 1), arg(items, 2)) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    db.set(key.clone(), value.clone());

    // Optional `EX seconds` pairs at positions 3,5,...
    let mut i = 3;
    while i + 1 < items.len() {
        if let (Some(opt), Some(opt_value)) = (arg(items, i), arg(items, i + 1)) {
            if opt.eq_ignore_ascii_case(b"EX") {
                let seconds = lenient_i64(opt_value);
                if seconds > 0 {
                    db.expire(key, seconds);
                }
            }
        }
        i += 2;
    }

    reply.write_simple("OK");
}

fn cmd_get(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "GET");
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    match db.get(key) {
        None => reply.write_nil(),
        Some(value) => match value.as_output() {
            Some(data) => reply.write_bulk(&data),
            None => reply.write_error(WRONGTYPE_MSG),
        },
    }
}

fn cmd_del(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "DEL");
    }

    let mut deleted: i64 = 0;
    for i in 1..items.len() {
        if let Some(key) = arg(items, i) {
            if db.del(key) {
                deleted += 1;
            }
        }
    }
    reply.write_integer(deleted);
}

fn cmd_exists(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "EXISTS");
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    reply.write_integer(db.exists(key) as i64);
}

fn cmd_incr_by(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf, delta: i64, name: &str) {
    if items.len() < 2 {
        return wrong_args(reply, name);
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    match db.incr(key, delta) {
        Ok(value) => reply.write_integer(value),
        Err(_) => reply.write_error(NOT_INTEGER_MSG),
    }
}

fn cmd_mset(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 3 || (items.len() - 1) % 2 != 0 {
        return wrong_args(reply, "MSET");
    }

    let mut i = 1;
    while i + 1 < items.len() {
        let (Some(key), Some(value)) = (arg(items, i), arg(items, i + 1)) else {
            return reply.write_error(INVALID_FORMAT_MSG);
        };
        db.set(key.clone(), value.clone());
        i += 2;
    }
    reply.write_simple("OK");
}

fn cmd_mget(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "MGET");
    }

    reply.write_array_header(items.len() - 1);
    for i in 1..items.len() {
        let output = match arg(items, i) {
            Some(key) => db.get(key).and_then(|value| value.as_output()),
            None => None,
        };
        match output {
            Some(data) => reply.write_bulk(&data),
            // Missing keys and list values both read as nil here.
            None => reply.write_nil(),
        }
    }
}

fn cmd_push(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf, front: bool, name: &str) {
    if items.len() < 3 {
        return wrong_args(reply, name);
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    let mut length = 0;
    for i in 2..items.len() {
        let Some(value) = arg(items, i) else {
            return reply.write_error(INVALID_FORMAT_MSG);
        };
        let pushed = if front {
            db.lpush(key, value.clone())
        } else {
            db.rpush(key, value.clone())
        };
        match pushed {
            Ok(len) => length = len,
            Err(_) => return reply.write_error(WRONGTYPE_MSG),
        }
    }
    reply.write_integer(length as i64);
}

fn cmd_pop(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf, front: bool, name: &str) {
    if items.len() < 2 {
        return wrong_args(reply, name);
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    let popped = if front { db.lpop(key) } else { db.rpop(key) };
    match popped {
        Some(value) => reply.write_bulk(&value),
        None => reply.write_nil(),
    }
}

fn cmd_llen(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "LLEN");
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    match db.llen(key) {
        Ok(len) => reply.write_integer(len as i64),
        Err(_) => reply.write_error(WRONGTYPE_MSG),
    }
}

fn cmd_lrange(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 4 {
        return wrong_args(reply, "LRANGE");
    }
    let (Some(key), Some(start), Some(stop)) = (arg(items, 1), arg(items, 2), arg(items, 3))
    else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    let range = db.lrange(key, lenient_i64(start), lenient_i64(stop));
    reply.write_array_header(range.len());
    for item in &range {
        reply.write_bulk(item);
    }
}

fn cmd_expire(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 3 {
        return wrong_args(reply, "EXPIRE");
    }
    let (Some(key), Some(seconds)) = (arg(items, 1), arg(items, 2)) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    reply.write_integer(db.expire(key, lenient_i64(seconds)) as i64);
}

fn cmd_ttl(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "TTL");
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    reply.write_integer(db.ttl(key));
}

fn cmd_persist(db: &mut Database, items: &[Frame], reply: &mut ReplyBuf) {
    if items.len() < 2 {
        return wrong_args(reply, "PERSIST");
    }
    let Some(key) = arg(items, 1) else {
        return reply.write_error(INVALID_FORMAT_MSG);
    };

    reply.write_integer(db.persist(key) as i64);
}

fn cmd_info(db: &Database, reply: &mut ReplyBuf) {
    let info = format!(
        "# Server\r\ninmemdb_version:{}\r\n# Keyspace\r\ndb0:keys={}\r\n",
        env!("CARGO_PKG_VERSION"),
        db.len()
    );
    reply.write_bulk(info.as_bytes());
}

fn cmd_save(db: &Database, ctx: &ServerCtx, reply: &mut ReplyBuf) {
    match snapshot::save(db, ctx.snapshot_path()) {
        Ok(()) => reply.write_simple("OK"),
        Err(e) => {
            error!(error = %e, "Snapshot save failed");
            reply.write_error("ERR failed to save database");
        }
    }
}

fn cmd_shutdown(db: &Database, ctx: &ServerCtx, reply: &mut ReplyBuf) {
    if let Err(e) = snapshot::save(db, ctx.snapshot_path()) {
        error!(error = %e, "Snapshot save failed during shutdown");
    }
    reply.write_simple("OK");
    ctx.request_shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_ctx() -> (ServerCtx, TempDir) {
        let dir = TempDir::new().unwrap();
        let ctx = ServerCtx::new(dir.path().join("dump.rdb"));
        (ctx, dir)
    }

    fn run(db: &mut Database, ctx: &ServerCtx, parts: &[&str]) -> Vec<u8> {
        let frame = Frame::Array(
            parts
                .iter()
                .map(|p| Frame::Bulk(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        );
        let mut reply = ReplyBuf::new();
        execute(db, ctx, &frame, &mut reply);
        reply.as_bytes().to_vec()
    }

    #[test]
    fn test_ping() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["PING"]), b"+PONG\r\n");
        assert_eq!(run(&mut db, &ctx, &["PING", "hey"]), b"$3\r\nhey\r\n");
        // Lookup is case-insensitive.
        assert_eq!(run(&mut db, &ctx, &["ping"]), b"+PONG\r\n");
        assert_eq!(run(&mut db, &ctx, &["PiNg"]), b"+PONG\r\n");
    }

    #[test]
    fn test_set_and_get() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["SET", "hello", "world"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &ctx, &["GET", "hello"]), b"$5\r\nworld\r\n");
        assert_eq!(run(&mut db, &ctx, &["GET", "missing"]), b"$-1\r\n");
    }

    #[test]
    fn test_set_get_incr_roundtrip() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["SET", "n", "41"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &ctx, &["INCR", "n"]), b":42\r\n");
        assert_eq!(run(&mut db, &ctx, &["GET", "n"]), b"$2\r\n42\r\n");
        assert_eq!(run(&mut db, &ctx, &["DECR", "n"]), b":41\r\n");
    }

    #[test]
    fn test_incr_from_missing_counts_up() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        for expected in 1..=5 {
            assert_eq!(
                run(&mut db, &ctx, &["INCR", "counter"]),
                format!(":{}\r\n", expected).as_bytes()
            );
        }
    }

    #[test]
    fn test_incr_on_non_numeric_string() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "s", "abc"]);
        assert_eq!(
            run(&mut db, &ctx, &["INCR", "s"]),
            b"-ERR value is not an integer or out of range\r\n"
        );
    }

    #[test]
    fn test_del_counts_removed_keys() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "a", "1"]);
        run(&mut db, &ctx, &["SET", "b", "2"]);
        assert_eq!(run(&mut db, &ctx, &["DEL", "a", "b", "missing"]), b":2\r\n");
        assert_eq!(run(&mut db, &ctx, &["EXISTS", "a"]), b":0\r\n");
        assert_eq!(run(&mut db, &ctx, &["GET", "a"]), b"$-1\r\n");
    }

    #[test]
    fn test_exists() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "k", "v"]);
        assert_eq!(run(&mut db, &ctx, &["EXISTS", "k"]), b":1\r\n");
        assert_eq!(run(&mut db, &ctx, &["EXISTS", "nope"]), b":0\r\n");
    }

    #[test]
    fn test_mset_and_mget() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(
            run(&mut db, &ctx, &["MSET", "a", "1", "b", "two"]),
            b"+OK\r\n"
        );
        assert_eq!(
            run(&mut db, &ctx, &["MGET", "a", "b", "missing"]),
            b"*3\r\n$1\r\n1\r\n$3\r\ntwo\r\n$-1\r\n"
        );
    }

    #[test]
    fn test_mset_rejects_unpaired_args() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(
            run(&mut db, &ctx, &["MSET", "a", "1", "b"]),
            b"-ERR wrong number of arguments for 'MSET' command\r\n"
        );
    }

    #[test]
    fn test_list_scenario() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["LPUSH", "q", "a"]), b":1\r\n");
        assert_eq!(run(&mut db, &ctx, &["LPUSH", "q", "b"]), b":2\r\n");
        assert_eq!(run(&mut db, &ctx, &["RPUSH", "q", "c"]), b":3\r\n");
        assert_eq!(
            run(&mut db, &ctx, &["LRANGE", "q", "0", "-1"]),
            b"*3\r\n$1\r\nb\r\n$1\r\na\r\n$1\r\nc\r\n"
        );
        assert_eq!(run(&mut db, &ctx, &["LLEN", "q"]), b":3\r\n");
        assert_eq!(run(&mut db, &ctx, &["LPOP", "q"]), b"$1\r\nb\r\n");
        assert_eq!(run(&mut db, &ctx, &["RPOP", "q"]), b"$1\r\nc\r\n");
    }

    #[test]
    fn test_multi_value_push() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["RPUSH", "q", "a", "b", "c"]), b":3\r\n");
        assert_eq!(
            run(&mut db, &ctx, &["LRANGE", "q", "0", "-1"]),
            b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
        );
    }

    #[test]
    fn test_pop_empties_and_collapses() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["RPUSH", "q", "only"]);
        assert_eq!(run(&mut db, &ctx, &["LPOP", "q"]), b"$4\r\nonly\r\n");
        assert_eq!(run(&mut db, &ctx, &["EXISTS", "q"]), b":0\r\n");
        assert_eq!(run(&mut db, &ctx, &["LPOP", "q"]), b"$-1\r\n");
    }

    #[test]
    fn test_wrong_type_errors() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["RPUSH", "list", "x"]);
        assert_eq!(
            run(&mut db, &ctx, &["GET", "list"]),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );

        run(&mut db, &ctx, &["SET", "string", "v"]);
        assert_eq!(
            run(&mut db, &ctx, &["LPUSH", "string", "x"]),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
        assert_eq!(
            run(&mut db, &ctx, &["LLEN", "string"]),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
    }

    #[test]
    fn test_expire_ttl_persist() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "foo", "bar"]);
        assert_eq!(run(&mut db, &ctx, &["TTL", "foo"]), b":-1\r\n");
        assert_eq!(run(&mut db, &ctx, &["EXPIRE", "foo", "100"]), b":1\r\n");

        let ttl_reply = run(&mut db, &ctx, &["TTL", "foo"]);
        let text = String::from_utf8(ttl_reply).unwrap();
        let ttl: i64 = text
            .trim_start_matches(':')
            .trim_end()
            .parse()
            .unwrap();
        assert!((0..=100).contains(&ttl), "ttl was {ttl}");

        assert_eq!(run(&mut db, &ctx, &["PERSIST", "foo"]), b":1\r\n");
        assert_eq!(run(&mut db, &ctx, &["TTL", "foo"]), b":-1\r\n");
        assert_eq!(run(&mut db, &ctx, &["PERSIST", "foo"]), b":0\r\n");

        assert_eq!(run(&mut db, &ctx, &["TTL", "missing"]), b":-2\r\n");
        assert_eq!(run(&mut db, &ctx, &["EXPIRE", "missing", "5"]), b":0\r\n");
    }

    #[test]
    fn test_set_with_ex_option() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(
            run(&mut db, &ctx, &["SET", "k", "v", "EX", "50"]),
            b"+OK\r\n"
        );
        let text = String::from_utf8(run(&mut db, &ctx, &["TTL", "k"])).unwrap();
        let ttl: i64 = text.trim_start_matches(':').trim_end().parse().unwrap();
        assert!((0..=50).contains(&ttl), "ttl was {ttl}");

        // A fresh SET clears the deadline.
        run(&mut db, &ctx, &["SET", "k", "v2"]);
        assert_eq!(run(&mut db, &ctx, &["TTL", "k"]), b":-1\r\n");
    }

    #[test]
    fn test_dbsize_and_flushdb() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(run(&mut db, &ctx, &["DBSIZE"]), b":0\r\n");
        run(&mut db, &ctx, &["SET", "a", "1"]);
        run(&mut db, &ctx, &["SET", "b", "2"]);
        assert_eq!(run(&mut db, &ctx, &["DBSIZE"]), b":2\r\n");
        assert_eq!(run(&mut db, &ctx, &["FLUSHDB"]), b"+OK\r\n");
        assert_eq!(run(&mut db, &ctx, &["DBSIZE"]), b":0\r\n");
    }

    #[test]
    fn test_info_observable_fields() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "a", "1"]);
        let reply = run(&mut db, &ctx, &["INFO"]);
        let text = String::from_utf8(reply).unwrap();

        assert!(text.contains("# Server\r\n"));
        assert!(text.contains("inmemdb_version:"));
        assert!(text.contains("# Keyspace\r\n"));
        assert!(text.contains("db0:keys=1\r\n"));
    }

    #[test]
    fn test_unknown_command() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(
            run(&mut db, &ctx, &["NOSUCH", "arg"]),
            b"-ERR unknown command 'NOSUCH'\r\n"
        );
    }

    #[test]
    fn test_invalid_command_format() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        let mut reply = ReplyBuf::new();
        execute(&mut db, &ctx, &Frame::Bulk(Bytes::from("GET")), &mut reply);
        assert_eq!(reply.as_bytes(), b"-ERR invalid command format\r\n");

        let mut reply = ReplyBuf::new();
        execute(&mut db, &ctx, &Frame::Array(vec![]), &mut reply);
        assert_eq!(reply.as_bytes(), b"-ERR invalid command format\r\n");

        let mut reply = ReplyBuf::new();
        execute(
            &mut db,
            &ctx,
            &Frame::Array(vec![Frame::Integer(1)]),
            &mut reply,
        );
        assert_eq!(reply.as_bytes(), b"-ERR invalid command\r\n");
    }

    #[test]
    fn test_wrong_argument_counts() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        assert_eq!(
            run(&mut db, &ctx, &["SET", "k"]),
            b"-ERR wrong number of arguments for 'SET' command\r\n"
        );
        assert_eq!(
            run(&mut db, &ctx, &["GET"]),
            b"-ERR wrong number of arguments for 'GET' command\r\n"
        );
        assert_eq!(
            run(&mut db, &ctx, &["LRANGE", "q", "0"]),
            b"-ERR wrong number of arguments for 'LRANGE' command\r\n"
        );
        assert_eq!(
            run(&mut db, &ctx, &["EXPIRE", "k"]),
            b"-ERR wrong number of arguments for 'EXPIRE' command\r\n"
        );
    }

    #[test]
    fn test_save_writes_snapshot() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "k", "v"]);
        assert_eq!(run(&mut db, &ctx, &["SAVE"]), b"+OK\r\n");
        assert!(ctx.snapshot_path().exists());
    }

    #[test]
    fn test_save_and_reload_is_state_identical() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "name", "alice"]);
        run(&mut db, &ctx, &["SET", "count", "42"]);
        run(&mut db, &ctx, &["RPUSH", "q", "a", "b"]);
        run(&mut db, &ctx, &["SAVE"]);

        // Simulated restart: fresh keyspace, load the snapshot back.
        let mut restarted = Database::new();
        snapshot::load(&mut restarted, ctx.snapshot_path()).unwrap();

        assert_eq!(
            run(&mut restarted, &ctx, &["GET", "name"]),
            b"$5\r\nalice\r\n"
        );
        assert_eq!(run(&mut restarted, &ctx, &["GET", "count"]), b"$2\r\n42\r\n");
        assert_eq!(
            run(&mut restarted, &ctx, &["LRANGE", "q", "0", "-1"]),
            b"*2\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
        assert_eq!(run(&mut restarted, &ctx, &["DBSIZE"]), b":3\r\n");
    }

    #[test]
    fn test_shutdown_saves_and_sets_flag() {
        let mut db = Database::new();
        let (ctx, _dir) = test_ctx();

        run(&mut db, &ctx, &["SET", "k", "v"]);
        assert!(!ctx.shutdown_requested());
        assert_eq!(run(&mut db, &ctx, &["SHUTDOWN"]), b"+OK\r\n");
        assert!(ctx.shutdown_requested());
        assert!(ctx.snapshot_path().exists());
    }
}
