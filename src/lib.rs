pub mod account;
pub mod catalog;
pub mod client;
pub mod config;
pub mod errors;
pub mod media;
pub mod session;
pub mod transport;

pub use account::Credentials;
pub use catalog::{Event, Round};
pub use client::AihlSession;
pub use config::Config;
pub use errors::AihlError;
pub use media::StreamSource;
pub use session::{SessionCache, SessionManager, SessionState};
pub use transport::{HttpTransport, Method, RawRequest, RawResponse, Transport};
