pub mod debounce;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use debounce::*;
pub use pipeline::*;
pub use protocol::*;
pub use session::*;
pub use state::*;
pub use transport::*;
