//! Wire Protocols
//!
//! Parsing and reply encoding for the text line protocol and the RESP2
//! subset. Both are pure; the front-ends under `server` do the dispatching.

mod resp;
mod text;

pub use resp::{RespArgs, RespCodec, RespReply};
pub use text::{TextCommand, TextReply};
