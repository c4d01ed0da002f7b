pub mod connection;
pub mod dispatcher;
pub mod sessions;

pub use dispatcher::Dispatcher;
pub use sessions::{ConnId, SessionRegistry};
