//! Text Line Front-End
//!
//! One task per connection. Replies and pub/sub frames funnel through a
//! single writer task per connection so they never interleave mid-line.

use std::io;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::AppState;
use crate::protocol::{TextCommand, TextReply};
use crate::pubsub::{Sink, SubscriberId};

pub struct TextServer {
    state: AppState,
}

impl TextServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "text front-end listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, state).await {
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

async fn handle_connection(socket: TcpStream, state: AppState) -> io::Result<()> {
    socket.set_nodelay(true).ok();
    let (read_half, mut write_half) = socket.into_split();

    // Single ordered write path for replies and published MESSAGE frames.
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let write_timeout = state.config.server.tcp.write_timeout;
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let write = write_half.write_all(&frame);
            let result = if write_timeout.is_zero() {
                write.await
            } else {
                match timeout(write_timeout, write).await {
                    Ok(r) => r,
                    Err(_) => break,
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let subscriber_id = state.cache.pubsub().next_id();
    let mut subscribed = false;

    let read_timeout = state.config.server.tcp.read_timeout;
    let mut lines = BufReader::new(read_half).lines();

    loop {
        // Subscribed connections are long-poll sinks; the read deadline
        // only applies to request/response traffic.
        let next = if read_timeout.is_zero() || subscribed {
            lines.next_line().await
        } else {
            match timeout(read_timeout, lines.next_line()).await {
                Ok(r) => r,
                Err(_) => break,
            }
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let start = Instant::now();
        let reply = match TextCommand::parse(&line) {
            Ok(cmd) => execute(&state, cmd, subscriber_id, &tx, &mut subscribed),
            Err(usage) => TextReply::Error(usage),
        };
        let name = command_name(&line);
        state.metrics.record(&name, start.elapsed());

        if tx.send(Bytes::from(format!("{reply}\n"))).is_err() {
            break;
        }
    }

    state.cache.pubsub().unsubscribe_all(subscriber_id);
    writer.abort();
    Ok(())
}

fn command_name(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// Dispatch one parsed command against the engine.
pub(crate) fn execute(
    state: &AppState,
    cmd: TextCommand,
    subscriber_id: SubscriberId,
    sink: &Sink,
    subscribed: &mut bool,
) -> TextReply {
    let cache = &state.cache;
    match cmd {
        TextCommand::Ping => TextReply::Pong,

        TextCommand::Set { key, value, ttl } => {
            cache.set(&key, Bytes::from(value), ttl);
            TextReply::Ok
        }

        TextCommand::Get { key } => match cache.get(&key) {
            Some(v) => TextReply::Value(String::from_utf8_lossy(&v).into_owned()),
            None => TextReply::Nil,
        },

        TextCommand::Del { key } => {
            cache.delete(&key);
            TextReply::Ok
        }

        TextCommand::Lpush { key, values } => {
            TextReply::Integer(cache.lpush(&key, &values) as i64)
        }

        TextCommand::Lpop { key } => match cache.lpop(&key) {
            Some(v) => TextReply::Value(v),
            None => TextReply::Nil,
        },

        TextCommand::Sadd { key, members } => {
            TextReply::Integer(cache.sadd(&key, &members) as i64)
        }

        TextCommand::Smembers { key } => TextReply::Array(cache.smembers(&key)),

        TextCommand::Hset { key, field, value } => {
            cache.hset(&key, &field, &value);
            TextReply::Ok
        }

        TextCommand::Hget { key, field } => match cache.hget(&key, &field) {
            Some(v) => TextReply::Value(v),
            None => TextReply::Nil,
        },

        TextCommand::Subscribe { channel } => {
            cache.subscribe(&channel, subscriber_id, sink.clone());
            *subscribed = true;
            TextReply::Subscribed(channel)
        }

        TextCommand::Publish { channel, message } => {
            TextReply::Published(cache.publish(&channel, &message))
        }

        TextCommand::Eval { script, keys, args } => match &state.script {
            Some(engine) => TextReply::Result(engine.eval(&script, &keys, &args)),
            None => TextReply::Error("Lua scripting disabled".to_string()),
        },

        TextCommand::Info => TextReply::Info(format!(
            "BoltCache keys={} lua={} pubsub={} mode=tcp",
            cache.len(),
            state.script.is_some(),
            state.config.features.pub_sub,
        )),
    }
}
