//! Text Line Protocol
//!
//! Newline-delimited, whitespace-tokenised commands. The first token is the
//! command name (case-insensitive); replies are single lines rendered by
//! [`TextReply`]. Parsing is pure; dispatch lives in the TCP front-end.

use std::fmt;
use std::time::Duration;

use crate::config::parse_duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TextCommand {
    Ping,
    Set {
        key: String,
        value: String,
        ttl: Duration,
    },
    Get {
        key: String,
    },
    Del {
        key: String,
    },
    Lpush {
        key: String,
        values: Vec<String>,
    },
    Lpop {
        key: String,
    },
    Sadd {
        key: String,
        members: Vec<String>,
    },
    Smembers {
        key: String,
    },
    Hset {
        key: String,
        field: String,
        value: String,
    },
    Hget {
        key: String,
        field: String,
    },
    Subscribe {
        channel: String,
    },
    Publish {
        channel: String,
        message: String,
    },
    Eval {
        script: String,
        keys: Vec<String>,
        args: Vec<String>,
    },
    Info,
}

impl TextCommand {
    /// Parse one request line. The error string is the message rendered
    /// after `ERROR: `, either a usage line or `Unknown command`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return Err("Unknown command".to_string());
        };

        match command.to_uppercase().as_str() {
            "PING" => Ok(Self::Ping),

            "SET" => {
                if parts.len() < 3 {
                    return Err("SET key value [ttl]".to_string());
                }
                // A malformed ttl literal is treated as no-ttl.
                let ttl = parts
                    .get(3)
                    .and_then(|t| parse_duration(t).ok())
                    .unwrap_or(Duration::ZERO);
                Ok(Self::Set {
                    key: parts[1].to_string(),
                    value: parts[2].to_string(),
                    ttl,
                })
            }

            "GET" => match parts.get(1) {
                Some(key) => Ok(Self::Get {
                    key: key.to_string(),
                }),
                None => Err("GET key".to_string()),
            },

            "DEL" => match parts.get(1) {
                Some(key) => Ok(Self::Del {
                    key: key.to_string(),
                }),
                None => Err("DEL key".to_string()),
            },

            "LPUSH" => {
                if parts.len() < 3 {
                    return Err("LPUSH key value [value ...]".to_string());
                }
                Ok(Self::Lpush {
                    key: parts[1].to_string(),
                    values: parts[2..].iter().map(|s| s.to_string()).collect(),
                })
            }

            "LPOP" => match parts.get(1) {
                Some(key) => Ok(Self::Lpop {
                    key: key.to_string(),
                }),
                None => Err("LPOP key".to_string()),
            },

            "SADD" => {
                if parts.len() < 3 {
                    return Err("SADD key member [member ...]".to_string());
                }
                Ok(Self::Sadd {
                    key: parts[1].to_string(),
                    members: parts[2..].iter().map(|s| s.to_string()).collect(),
                })
            }

            "SMEMBERS" => match parts.get(1) {
                Some(key) => Ok(Self::Smembers {
                    key: key.to_string(),
                }),
                None => Err("SMEMBERS key".to_string()),
            },

            "HSET" => {
                if parts.len() < 4 {
                    return Err("HSET key field value".to_string());
                }
                Ok(Self::Hset {
                    key: parts[1].to_string(),
                    field: parts[2].to_string(),
                    value: parts[3].to_string(),
                })
            }

            "HGET" => {
                if parts.len() < 3 {
                    return Err("HGET key field".to_string());
                }
                Ok(Self::Hget {
                    key: parts[1].to_string(),
                    field: parts[2].to_string(),
                })
            }

            "SUBSCRIBE" => match parts.get(1) {
                Some(channel) => Ok(Self::Subscribe {
                    channel: channel.to_string(),
                }),
                None => Err("SUBSCRIBE channel".to_string()),
            },

            "PUBLISH" => {
                if parts.len() < 3 {
                    return Err("PUBLISH channel message".to_string());
                }
                Ok(Self::Publish {
                    channel: parts[1].to_string(),
                    message: parts[2..].join(" "),
                })
            }

            "EVAL" => {
                let usage = || "EVAL script numkeys [key ...] [arg ...]".to_string();
                if parts.len() < 3 {
                    return Err(usage());
                }
                let numkeys: usize = parts[2].parse().map_err(|_| usage())?;
                if parts.len() < 3 + numkeys {
                    return Err(usage());
                }
                Ok(Self::Eval {
                    script: parts[1].to_string(),
                    keys: parts[3..3 + numkeys].iter().map(|s| s.to_string()).collect(),
                    args: parts[3 + numkeys..].iter().map(|s| s.to_string()).collect(),
                })
            }

            "INFO" => Ok(Self::Info),

            _ => Err("Unknown command".to_string()),
        }
    }
}

/// One reply line, without the trailing newline.
#[derive(Debug, Clone, PartialEq)]
pub enum TextReply {
    Pong,
    Ok,
    Value(String),
    Nil,
    Integer(i64),
    Array(Vec<String>),
    Subscribed(String),
    Published(usize),
    Result(String),
    Info(String),
    Error(String),
}

impl fmt::Display for TextReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pong => write!(f, "PONG"),
            Self::Ok => write!(f, "OK"),
            Self::Value(v) => write!(f, "VALUE {v}"),
            Self::Nil => write!(f, "NIL"),
            Self::Integer(n) => write!(f, "INTEGER {n}"),
            Self::Array(items) => write!(f, "ARRAY {}", items.join(" ")),
            Self::Subscribed(channel) => write!(f, "SUBSCRIBED {channel}"),
            Self::Published(n) => write!(f, "PUBLISHED {n}"),
            Self::Result(v) => write!(f, "RESULT {v}"),
            Self::Info(line) => write!(f, "{line}"),
            Self::Error(msg) => write!(f, "ERROR: {msg}"),
        }
    }
}
