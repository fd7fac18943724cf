//! RESP Front-End
//!
//! Redis-compatible listener on the text port + 2. Connections borrow
//! scratch buffers from the shared pool and drain pipelined requests per
//! read. A malformed frame abandons the rest of the buffer and closes that
//! connection; the server keeps running.

use std::io;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info};

use super::buffer_pool::BufferPool;
use super::AppState;
use crate::protocol::{RespArgs, RespCodec, RespReply};

pub struct RespServer {
    state: AppState,
    pool: BufferPool,
}

impl RespServer {
    pub fn new(state: AppState, pool: BufferPool) -> Self {
        Self { state, pool }
    }

    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "resp front-end listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let state = self.state.clone();
                    let pool = self.pool.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, state, pool).await {
                            debug!(%peer, error = %e, "connection error");
                        }
                        debug!(%peer, "connection closed");
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    state: AppState,
    pool: BufferPool,
) -> io::Result<()> {
    socket.set_nodelay(true).ok();

    let mut read_buf = pool.acquire();
    let mut write_buf = pool.acquire();

    let result = drive(&mut socket, &mut read_buf, &mut write_buf, &state).await;

    // Buffers go back on every path, error or not.
    pool.release(read_buf);
    pool.release(write_buf);
    result
}

async fn drive(
    socket: &mut TcpStream,
    read_buf: &mut BytesMut,
    write_buf: &mut BytesMut,
    state: &AppState,
) -> io::Result<()> {
    let mut codec = RespCodec::new();
    let read_timeout = state.config.server.tcp.read_timeout;

    loop {
        loop {
            match codec.decode(read_buf) {
                Ok(Some(args)) => {
                    let start = Instant::now();
                    let (name, reply) = execute(state, &args);
                    state.metrics.record(&name, start.elapsed());
                    codec.encode(reply, write_buf)?;
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "resp parse failure");
                    if !write_buf.is_empty() {
                        socket.write_all(&write_buf[..]).await?;
                    }
                    return Ok(());
                }
            }
        }

        if !write_buf.is_empty() {
            socket.write_all(&write_buf[..]).await?;
            write_buf.clear();
        }

        let read = socket.read_buf(read_buf);
        let n = if read_timeout.is_zero() {
            read.await?
        } else {
            match timeout(read_timeout, read).await {
                Ok(r) => r?,
                Err(_) => return Ok(()),
            }
        };
        if n == 0 {
            return Ok(());
        }
    }
}

fn arity_error(cmd: &str) -> RespReply {
    RespReply::Error(format!("ERR wrong number of arguments for '{cmd}' command"))
}

fn arg_str(args: &RespArgs, i: usize) -> String {
    String::from_utf8_lossy(&args[i]).into_owned()
}

/// Execute one request, returning the command name (for metrics) and the
/// reply.
pub(crate) fn execute(state: &AppState, args: &RespArgs) -> (String, RespReply) {
    let Some(first) = args.first() else {
        return ("".to_string(), RespReply::Error("ERR empty command".to_string()));
    };
    let cmd = String::from_utf8_lossy(first).to_lowercase();
    let cache = &state.cache;

    let reply = match cmd.as_str() {
        "ping" => RespReply::Simple("PONG"),

        "set" => {
            if args.len() < 3 {
                arity_error(&cmd)
            } else {
                cache.set(&arg_str(args, 1), args[2].clone(), std::time::Duration::ZERO);
                RespReply::Simple("OK")
            }
        }

        "get" => {
            if args.len() < 2 {
                arity_error(&cmd)
            } else {
                match cache.get(&arg_str(args, 1)) {
                    Some(v) => RespReply::Bulk(v),
                    None => RespReply::NullBulk,
                }
            }
        }

        "del" => {
            if args.len() < 2 {
                arity_error(&cmd)
            } else {
                cache.delete(&arg_str(args, 1));
                RespReply::Integer(1)
            }
        }

        "exists" => {
            if args.len() < 2 {
                arity_error(&cmd)
            } else {
                RespReply::Integer(i64::from(cache.exists(&arg_str(args, 1))))
            }
        }

        "lpush" => {
            if args.len() < 3 {
                arity_error(&cmd)
            } else {
                let values: Vec<String> = args[2..]
                    .iter()
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .collect();
                RespReply::Integer(cache.lpush(&arg_str(args, 1), &values) as i64)
            }
        }

        "lpop" => {
            if args.len() < 2 {
                arity_error(&cmd)
            } else {
                match cache.lpop(&arg_str(args, 1)) {
                    Some(v) => RespReply::Bulk(Bytes::from(v)),
                    None => RespReply::NullBulk,
                }
            }
        }

        "sadd" => {
            if args.len() < 3 {
                arity_error(&cmd)
            } else {
                let members: Vec<String> = args[2..]
                    .iter()
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .collect();
                RespReply::Integer(cache.sadd(&arg_str(args, 1), &members) as i64)
            }
        }

        "smembers" => {
            if args.len() < 2 {
                arity_error(&cmd)
            } else {
                let members = cache
                    .smembers(&arg_str(args, 1))
                    .into_iter()
                    .map(Bytes::from)
                    .collect();
                RespReply::Array(members)
            }
        }

        "hset" => {
            if args.len() < 4 {
                arity_error(&cmd)
            } else {
                cache.hset(&arg_str(args, 1), &arg_str(args, 2), &arg_str(args, 3));
                RespReply::Integer(1)
            }
        }

        "hget" => {
            if args.len() < 3 {
                arity_error(&cmd)
            } else {
                match cache.hget(&arg_str(args, 1), &arg_str(args, 2)) {
                    Some(v) => RespReply::Bulk(Bytes::from(v)),
                    None => RespReply::NullBulk,
                }
            }
        }

        _ => RespReply::Error(format!("ERR unknown command '{cmd}'")),
    };

    (cmd.to_uppercase(), reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use crate::storage::Cache;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState {
            cache: Cache::new(),
            script: None,
            metrics: Arc::new(Metrics::new()),
            config: Arc::new(Config::default()),
        }
    }

    fn args(parts: &[&str]) -> RespArgs {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    fn run(state: &AppState, parts: &[&str]) -> RespReply {
        execute(state, &args(parts)).1
    }

    #[test]
    fn test_set_then_get() {
        let state = state();
        assert_eq!(run(&state, &["SET", "k", "v"]), RespReply::Simple("OK"));
        assert_eq!(
            run(&state, &["GET", "k"]),
            RespReply::Bulk(Bytes::from_static(b"v"))
        );
        assert_eq!(run(&state, &["GET", "missing"]), RespReply::NullBulk);
    }

    #[test]
    fn test_case_insensitive_commands() {
        let state = state();
        assert_eq!(run(&state, &["ping"]), RespReply::Simple("PONG"));
        assert_eq!(run(&state, &["set", "k", "v"]), RespReply::Simple("OK"));
    }

    #[test]
    fn test_del_and_exists() {
        let state = state();
        run(&state, &["SET", "k", "v"]);
        assert_eq!(run(&state, &["EXISTS", "k"]), RespReply::Integer(1));
        assert_eq!(run(&state, &["DEL", "k"]), RespReply::Integer(1));
        assert_eq!(run(&state, &["EXISTS", "k"]), RespReply::Integer(0));
    }

    #[test]
    fn test_list_and_set_and_hash() {
        let state = state();
        assert_eq!(
            run(&state, &["LPUSH", "l", "a", "b", "c"]),
            RespReply::Integer(3)
        );
        assert_eq!(
            run(&state, &["LPOP", "l"]),
            RespReply::Bulk(Bytes::from_static(b"c"))
        );

        assert_eq!(run(&state, &["SADD", "s", "x", "y", "x"]), RespReply::Integer(2));
        match run(&state, &["SMEMBERS", "s"]) {
            RespReply::Array(mut members) => {
                members.sort();
                assert_eq!(members, vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")]);
            }
            other => panic!("expected array, got {other:?}"),
        }

        assert_eq!(run(&state, &["HSET", "h", "f", "v"]), RespReply::Integer(1));
        assert_eq!(
            run(&state, &["HGET", "h", "f"]),
            RespReply::Bulk(Bytes::from_static(b"v"))
        );
        assert_eq!(run(&state, &["HGET", "h", "g"]), RespReply::NullBulk);
    }

    #[test]
    fn test_arity_and_unknown_errors() {
        let state = state();
        assert_eq!(
            run(&state, &["SET", "k"]),
            RespReply::Error("ERR wrong number of arguments for 'set' command".to_string())
        );
        assert_eq!(
            run(&state, &["WAT"]),
            RespReply::Error("ERR unknown command 'wat'".to_string())
        );
        assert_eq!(
            run(&state, &[]),
            RespReply::Error("ERR empty command".to_string())
        );
    }
}
