//! Common test infrastructure
//!
//! Integration tests drive a real [`dgg_chat::Session`] over an in-memory
//! transport. The test plays the server: it pushes frames to the client
//! and inspects what the client wrote.
//!
//! ```no_run
//! mod common;
//! use common::{frames, FakeTransport};
//!
//! #[tokio::test]
//! async fn test_join() {
//!     let transport = FakeTransport::new();
//!     let session = transport.session(None);
//!     session.open().await.unwrap();
//!     let server = transport.accepted().await;
//!     server.push(&frames::join("Bob"));
//! }
//! ```

#![allow(dead_code)]

pub mod frames;
mod transport;

pub use transport::{DialScript, FakeTransport, ServerEnd};

use std::time::Duration;

/// Polls `condition` until it holds, failing the test after a while.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
