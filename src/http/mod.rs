//! HTTP transport and response cache

mod cache;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use cache::{DEFAULT_LIFESPAN, LONG_LIFESPAN, ResponseCache};
pub use transport::{DEFAULT_TIMEOUT, HttpError, Response, Transport, UreqTransport};
