pub mod errors;
pub mod flow;
pub mod messages;
pub mod state;

pub use errors::{AuthError, MIN_PASSWORD_LEN, ValidationError};
pub use flow::{AuthContext, AuthFlow, Navigator, routes};
pub use state::{FlowKind, FlowSlot, FlowState, RecoveryContext, RecoveryStage};
