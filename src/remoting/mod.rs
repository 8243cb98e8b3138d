//! Remoting Module
//!
//! Group RPC between members.
//!
//! ## Core Concepts
//! - **Transport**: `Transport::invoke_remotely` fans a command out to several
//!   members in parallel and gathers their `Response`s.
//! - **Response Modes**: wait for everyone, wait until a `ResponseFilter` is
//!   satisfied, or do not wait at all.
//! - **Validity Filter**: remote reads stop at the first owner that has the
//!   value, or once every live owner has said it does not.
//! - **Wire Format**: commands travel as `(command_id, parameters)` in JSON over HTTP.

pub mod filter;
pub mod http;
pub mod protocol;
pub mod response;
pub mod transport;

pub use filter::{ClusteredGetResponseValidityFilter, ResponseFilter};
pub use response::{Response, ResponseMode};
pub use transport::{BoxFuture, Invocation, Transport};
