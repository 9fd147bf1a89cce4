//! HTTP(S) listeners and their supervision.
//!
//! One [`Listener`] serves one configured server. The
//! [`ListenerSupervisor`] runs a whole generation of them and swaps
//! generations on reload.

mod core;
mod handler;
mod supervisor;
mod tls;
mod types;

pub use self::core::Listener;
pub use handler::handle_request;
pub use supervisor::{build_generation, ListenerHandle, ListenerSupervisor};
pub use tls::create_tls_acceptor;
pub use types::{ListenerError, ListenerState};
