/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Native transport for the meshmeet signaling channel.
//!
//! The signaling relay speaks JSON over WebSocket text frames. This crate
//! owns the socket plumbing only; envelope encoding and dispatch live in
//! `meshmeet-client`.

pub mod websocket;

pub use websocket::{WebSocketClient, WebSocketConnectError};
