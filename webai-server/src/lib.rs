//! Library surface of the gateway binary, split out so integration tests
//! can build the router against mock upstream sessions.

pub mod handlers;
pub mod router;
pub mod state;
