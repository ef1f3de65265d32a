use super::errors::AuthError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum FlowKind {
    SignIn,
    SignUp,
    SendOtp,
    VerifyOtp,
    ReplacePassword,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed(String),
}

impl FlowState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, FlowState::Submitting)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            FlowState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// State of one flow instance. Owns the rule that only one submission may
/// be in flight at a time.
#[derive(Debug)]
pub struct FlowSlot {
    kind: FlowKind,
    state: Mutex<FlowState>,
}

impl FlowSlot {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            state: Mutex::new(FlowState::Idle),
        }
    }

    pub fn state(&self) -> FlowState {
        self.lock().clone()
    }

    pub(crate) fn begin(&self) -> Result<Submission<'_>, AuthError> {
        let mut state = self.lock();
        if state.is_submitting() {
            log::warn!("Rejected {} submission: one is already in flight", self.kind);
            return Err(AuthError::Busy(self.kind));
        }
        *state = FlowState::Submitting;
        Ok(Submission {
            slot: self,
            settled: false,
        })
    }

    fn settle(&self, next: FlowState) {
        *self.lock() = next;
    }

    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An accepted submission. Dropping it unfinished (the caller abandoned the
/// future) puts the slot back to `Idle`.
pub(crate) struct Submission<'a> {
    slot: &'a FlowSlot,
    settled: bool,
}

impl Submission<'_> {
    pub(crate) fn finish<T>(mut self, result: Result<T, AuthError>) -> Result<T, AuthError> {
        let next = match &result {
            Ok(_) => FlowState::Succeeded,
            Err(err) => {
                log::warn!("{} failed: {}", self.slot.kind, err);
                FlowState::Failed(err.to_string())
            }
        };
        self.slot.settle(next);
        self.settled = true;
        result
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.settle(FlowState::Idle);
        }
    }
}

/// The `(email, otp)` pair that authorizes one password replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryContext {
    email: String,
    otp: String,
}

impl RecoveryContext {
    pub fn new(email: &str, otp: &str) -> Option<Self> {
        let email = email.trim();
        let otp = otp.trim();
        if email.is_empty() || otp.is_empty() {
            return None;
        }
        Some(Self {
            email: email.to_string(),
            otp: otp.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn otp(&self) -> &str {
        &self.otp
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecoveryStage {
    #[default]
    RequestOtp,
    OtpPending {
        email: String,
        otp_input: String,
    },
    ResetAllowed(RecoveryContext),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::errors::ValidationError;

    #[test]
    fn flow_kinds_display_kebab_case() {
        assert_eq!(FlowKind::ReplacePassword.to_string(), "replace-password");
        assert_eq!(FlowKind::SignIn.as_ref(), "sign-in");
    }

    #[test]
    fn second_begin_is_rejected_while_submitting() {
        let slot = FlowSlot::new(FlowKind::SignIn);
        let first = slot.begin().unwrap();
        assert!(slot.state().is_submitting());
        assert!(matches!(
            slot.begin(),
            Err(AuthError::Busy(FlowKind::SignIn))
        ));

        let _ = first.finish::<()>(Ok(()));
        assert_eq!(slot.state(), FlowState::Succeeded);
        assert!(slot.begin().is_ok());
    }

    #[test]
    fn failure_records_message_and_allows_resubmission() {
        let slot = FlowSlot::new(FlowKind::SignUp);
        let submission = slot.begin().unwrap();
        let _ = submission.finish::<()>(Err(ValidationError::PasswordMismatch.into()));

        assert_eq!(
            slot.state().error_message(),
            Some("Passwords do not match.")
        );
        assert!(slot.begin().is_ok());
    }

    #[test]
    fn abandoned_submission_returns_to_idle() {
        let slot = FlowSlot::new(FlowKind::SendOtp);
        {
            let _submission = slot.begin().unwrap();
        }
        assert_eq!(slot.state(), FlowState::Idle);
    }

    #[test]
    fn recovery_context_needs_both_parts() {
        assert!(RecoveryContext::new("a@b.c", "").is_none());
        assert!(RecoveryContext::new("  ", "123456").is_none());
        let context = RecoveryContext::new(" a@b.c ", "123456").unwrap();
        assert_eq!(context.email(), "a@b.c");
        assert_eq!(context.otp(), "123456");
    }
}
