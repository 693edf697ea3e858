//! Network layer: listeners and per-connection sessions.

mod listener;
mod session;
mod tls;

pub use listener::Listener;
pub use session::Session;
pub use tls::load_acceptor;
