use super::errors::{AuthError, MIN_PASSWORD_LEN, ValidationError, require};
use super::messages::{AuthReply, failure_message};
use super::state::{FlowKind, FlowSlot, FlowState, RecoveryContext, RecoveryStage};
use crate::decode::decode_reply;
use crate::session::SessionStore;
use crate::transport::Transport;
use serde::Serialize;
use serde_json::Value;
use shared::{
    LoginRequest, ReplacePasswordRequest, SendOtpRequest, SignupRequest, UserProfile,
    VerifyOtpRequest,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod routes {
    pub const SIGN_IN: &str = "/";
    pub const DASHBOARD: &str = "/dashboard";
    pub const VERIFY_OTP: &str = "/send-otp";
    pub const RESET_PASSWORD: &str = "/reset-pass";
}

mod endpoints {
    pub const SIGN_UP: &str = "/auth/signup/";
    pub const LOGIN: &str = "/auth/login/";
    pub const SEND_OTP: &str = "/auth/send-otp/";
    pub const VERIFY_OTP: &str = "/auth/verify-otp/";
    pub const REPLACE_PASSWORD: &str = "/auth/replace-password/";
}

/// Moves the user to another screen. What a path means is up to the caller.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

pub struct AuthContext {
    pub session: SessionStore,
    pub navigator: Arc<dyn Navigator>,
}

struct Answer {
    status: u16,
    ok: bool,
    body: Value,
}

impl Answer {
    fn rejected(&self, fallback: &str) -> AuthError {
        AuthError::Application {
            status: self.status,
            message: failure_message(&self.body, fallback),
        }
    }
}

/// Sign-in, sign-up and password recovery against the auth service.
///
/// Every flow has its own [`FlowSlot`]; a submission made while the same flow
/// is still submitting fails with [`AuthError::Busy`] and sends nothing.
pub struct AuthFlow<T> {
    transport: T,
    context: AuthContext,
    sign_in: FlowSlot,
    sign_up: FlowSlot,
    send_otp: FlowSlot,
    verify_otp: FlowSlot,
    replace_password: FlowSlot,
    recovery: Mutex<RecoveryStage>,
}

impl<T: Transport> AuthFlow<T> {
    pub fn new(transport: T, context: AuthContext) -> Self {
        Self {
            transport,
            context,
            sign_in: FlowSlot::new(FlowKind::SignIn),
            sign_up: FlowSlot::new(FlowKind::SignUp),
            send_otp: FlowSlot::new(FlowKind::SendOtp),
            verify_otp: FlowSlot::new(FlowKind::VerifyOtp),
            replace_password: FlowSlot::new(FlowKind::ReplacePassword),
            recovery: Mutex::new(RecoveryStage::default()),
        }
    }

    pub fn state(&self, kind: FlowKind) -> FlowState {
        self.slot(kind).state()
    }

    pub fn session(&self) -> &SessionStore {
        &self.context.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn recovery_stage(&self) -> RecoveryStage {
        self.stage().clone()
    }

    pub fn recovery_context(&self) -> Option<RecoveryContext> {
        match &*self.stage() {
            RecoveryStage::ResetAllowed(context) => Some(context.clone()),
            _ => None,
        }
    }

    /// Records what the user typed into the OTP field. Ignored unless an OTP
    /// has been sent.
    pub fn set_otp_input(&self, otp: &str) -> bool {
        match &mut *self.stage() {
            RecoveryStage::OtpPending { otp_input, .. } => {
                *otp_input = otp.to_string();
                true
            }
            _ => false,
        }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<UserProfile, AuthError> {
        let submission = self.sign_in.begin()?;
        let result = self.submit_sign_in(email, password, remember).await;
        submission.finish(result)
    }

    pub async fn sign_up(
        &self,
        fullname: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<UserProfile, AuthError> {
        let submission = self.sign_up.begin()?;
        let result = self.submit_sign_up(fullname, email, password, confirm).await;
        submission.finish(result)
    }

    pub async fn send_otp(&self, email: &str) -> Result<(), AuthError> {
        let submission = self.send_otp.begin()?;
        let result = self.submit_send_otp(email).await;
        submission.finish(result)
    }

    /// Sends a fresh OTP to the pending address and clears the typed OTP.
    pub async fn resend_otp(&self) -> Result<(), AuthError> {
        let submission = self.send_otp.begin()?;
        let result = self.submit_resend_otp().await;
        submission.finish(result)
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<RecoveryContext, AuthError> {
        let submission = self.verify_otp.begin()?;
        let result = self.submit_verify_otp(email, otp).await;
        submission.finish(result)
    }

    /// Replaces the password with an explicitly supplied `(email, otp)`.
    ///
    /// The pair is not checked against the context held from
    /// [`Self::verify_otp`]; the server decides whether it is valid. Success
    /// still resets the recovery stage, but single use of a verified context is
    /// only enforced through [`Self::complete_recovery`].
    pub async fn replace_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        let submission = self.replace_password.begin()?;
        let result = match RecoveryContext::new(email, otp) {
            Some(context) => {
                self.submit_replace_password(&context, new_password, confirm)
                    .await
            }
            None => Err(ValidationError::MissingRecoveryContext.into()),
        };
        submission.finish(result)
    }

    /// Replaces the password using the context left by [`Self::verify_otp`].
    /// The context is used up on success, so this works once per verification.
    pub async fn complete_recovery(
        &self,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        let submission = self.replace_password.begin()?;
        let result = match self.recovery_context() {
            Some(context) => {
                self.submit_replace_password(&context, new_password, confirm)
                    .await
            }
            None => Err(ValidationError::MissingRecoveryContext.into()),
        };
        submission.finish(result)
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.context.session.clear()?;
        *self.stage() = RecoveryStage::RequestOtp;
        log::info!("Signed out");
        self.context.navigator.navigate(routes::SIGN_IN);
        Ok(())
    }

    async fn submit_sign_in(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<UserProfile, AuthError> {
        require(email, "Email")?;
        require(password, "Password")?;

        let email = email.trim().to_string();
        let request = LoginRequest {
            email: email.clone(),
            password: password.to_string(),
            remember_me: remember,
        };

        log::info!("Signing in {} (remember: {})", email, remember);
        let answer = self.call(endpoints::LOGIN, &request).await?;
        let reply = AuthReply::from_body(&answer.body);
        if !(answer.ok && reply.grants_tokens()) {
            return Err(answer.rejected("Login failed"));
        }

        let fullname = reply
            .fullname
            .clone()
            .or_else(|| {
                self.context
                    .session
                    .profile()
                    .filter(|known| known.email == email)
                    .map(|known| known.fullname)
            })
            .unwrap_or_default();
        let profile = UserProfile { email, fullname };

        self.establish_session(&reply, &profile, remember)?;
        log::info!("Signed in {}", profile.email);
        self.context.navigator.navigate(routes::DASHBOARD);
        Ok(profile)
    }

    async fn submit_sign_up(
        &self,
        fullname: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<UserProfile, AuthError> {
        require(fullname, "Full name")?;
        require(email, "Email")?;
        require(password, "Password")?;
        require(confirm, "Confirm password")?;
        if password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }

        let request = SignupRequest {
            fullname: fullname.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };

        log::info!("Creating account for {}", request.email);
        let answer = self.call(endpoints::SIGN_UP, &request).await?;
        let reply = AuthReply::from_body(&answer.body);
        if !(answer.ok && reply.grants_tokens()) {
            return Err(answer.rejected("Sign up failed"));
        }

        let profile = UserProfile {
            fullname: reply.fullname.clone().unwrap_or(request.fullname),
            email: request.email,
        };

        // a fresh account has not opted into being remembered
        self.establish_session(&reply, &profile, false)?;
        log::info!("Account created for {}", profile.email);
        self.context.navigator.navigate(routes::DASHBOARD);
        Ok(profile)
    }

    async fn submit_send_otp(&self, email: &str) -> Result<(), AuthError> {
        require(email, "Email")?;
        let email = email.trim().to_string();

        self.request_otp(&email).await?;
        *self.stage() = RecoveryStage::OtpPending {
            email: email.clone(),
            otp_input: String::new(),
        };
        self.context.navigator.navigate(&format!(
            "{}?email={}",
            routes::VERIFY_OTP,
            urlencoding::encode(&email)
        ));
        Ok(())
    }

    async fn submit_resend_otp(&self) -> Result<(), AuthError> {
        let email = {
            let mut stage = self.stage();
            match &mut *stage {
                RecoveryStage::OtpPending { email, otp_input } => {
                    otp_input.clear();
                    email.clone()
                }
                _ => return Err(ValidationError::MissingField("Email").into()),
            }
        };

        self.request_otp(&email).await
    }

    async fn request_otp(&self, email: &str) -> Result<(), AuthError> {
        let request = SendOtpRequest {
            email: email.to_string(),
        };

        log::info!("Requesting OTP for {}", email);
        let answer = self.call(endpoints::SEND_OTP, &request).await?;
        let reply = AuthReply::from_body(&answer.body);
        if !answer.ok || reply.success == Some(false) {
            return Err(answer.rejected("Failed to send OTP"));
        }
        Ok(())
    }

    async fn submit_verify_otp(&self, email: &str, otp: &str) -> Result<RecoveryContext, AuthError> {
        require(otp, "OTP code")?;
        let context =
            RecoveryContext::new(email, otp).ok_or(ValidationError::MissingField("Email"))?;

        let request = VerifyOtpRequest {
            email: context.email().to_string(),
            otp: context.otp().to_string(),
        };

        log::info!("Verifying OTP for {}", context.email());
        let answer = self.call(endpoints::VERIFY_OTP, &request).await?;
        let reply = AuthReply::from_body(&answer.body);
        if !(answer.ok && reply.confirmed()) {
            return Err(answer.rejected("OTP verification failed"));
        }

        *self.stage() = RecoveryStage::ResetAllowed(context.clone());
        self.context.navigator.navigate(&format!(
            "{}?email={}&otp={}",
            routes::RESET_PASSWORD,
            urlencoding::encode(context.email()),
            urlencoding::encode(context.otp())
        ));
        Ok(context)
    }

    async fn submit_replace_password(
        &self,
        context: &RecoveryContext,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        require(new_password, "New password")?;
        require(confirm, "Confirm password")?;
        if new_password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            }
            .into());
        }

        let request = ReplacePasswordRequest {
            email: context.email().to_string(),
            otp: context.otp().to_string(),
            new_password: new_password.to_string(),
            confirm_password: confirm.to_string(),
        };

        log::info!("Replacing password for {}", context.email());
        let answer = self.call(endpoints::REPLACE_PASSWORD, &request).await?;
        let reply = AuthReply::from_body(&answer.body);
        if !(answer.ok && (reply.confirmed() || reply.message.is_some())) {
            return Err(answer.rejected("Password reset failed"));
        }

        *self.stage() = RecoveryStage::RequestOtp;
        log::info!("Password replaced for {}", context.email());
        self.context.navigator.navigate(routes::SIGN_IN);
        Ok(())
    }

    async fn call<B>(&self, path: &str, body: &B) -> Result<Answer, AuthError>
    where
        B: Serialize + Sync,
    {
        let reply = self.transport.post_json(path, body).await?;
        let body = decode_reply(&reply)?;
        Ok(Answer {
            status: reply.status,
            ok: reply.is_success(),
            body,
        })
    }

    fn establish_session(
        &self,
        reply: &AuthReply,
        profile: &UserProfile,
        remember: bool,
    ) -> Result<(), AuthError> {
        let session = &self.context.session;
        session.store_tokens(reply.access.as_deref(), reply.refresh.as_deref(), remember)?;
        session.save_profile(profile)?;
        Ok(())
    }

    fn slot(&self, kind: FlowKind) -> &FlowSlot {
        match kind {
            FlowKind::SignIn => &self.sign_in,
            FlowKind::SignUp => &self.sign_up,
            FlowKind::SendOtp => &self.send_otp,
            FlowKind::VerifyOtp => &self.verify_otp,
            FlowKind::ReplacePassword => &self.replace_password,
        }
    }

    fn stage(&self) -> MutexGuard<'_, RecoveryStage> {
        self.recovery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
