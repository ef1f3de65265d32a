pub mod auth;
pub mod config;
pub mod decode;
pub mod detect;
pub mod session;
pub mod transport;

pub use auth::{AuthContext, AuthError, AuthFlow, FlowKind, FlowState, Navigator};
pub use config::ClientConfig;
pub use decode::{DecodeError, decode_reply};
pub use detect::{DetectError, DetectionSession, ResultTable};
pub use session::{FileStore, MemoryStore, SessionStore};
pub use transport::{HttpReply, ReqwestTransport, Transport, TransportError};
