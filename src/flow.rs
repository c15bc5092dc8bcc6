//! Client-side orchestration of the auth dialogs.
//!
//! A client drives `AuthFlow` exclusively with `ServerOutcome` values
//! decoded from responses; it holds no truth of its own about where the
//! user is in the flow. The tagged outcomes replace ad hoc checks like
//! "does the response have a `user` field": decoding picks a variant once,
//! and `advance` handles every variant with an exhaustive `match`.
//!
//! Resend buttons are debounced locally through the in-flight guard; the
//! server-side cooldown remains the real limit.

/// Which credentials dialog is showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialsMode {
    Login,
    Register,
    Forgot,
}

/// What the pending one-time code proves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpPurpose {
    Register,
    Reset,
}

/// Current dialog state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthFlow {
    /// Collecting email/password (login, register, or forgot form).
    Credentials { mode: CredentialsMode },
    /// Waiting for the user to type the emailed code.
    OtpEntry {
        user_id: String,
        purpose: OtpPurpose,
        resend_in_flight: bool,
    },
    /// Collecting the new password. `reset_token` holds the set-password
    /// token when the reset was pre-authorized by Google sign-in; `None`
    /// means the user types the emailed code instead.
    ResetEntry {
        user_id: String,
        reset_token: Option<String>,
    },
    /// Session established.
    SignedIn { user_id: String },
}

/// Decoded server response, one variant per tagged response shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerOutcome {
    /// Register initiate succeeded; a code is on its way.
    RegistrationStarted { user_id: String },
    /// Register verify succeeded; the account is active, log in next.
    Verified,
    /// Login or Google sign-in returned a session and a user object.
    SessionEstablished { user_id: String },
    /// `{userId, action: "complete-verification"}`.
    VerificationRequired { user_id: String },
    /// `{userId, action: "set-password", resetToken}`. The token is
    /// submitted with the new password in place of an emailed code.
    SetPasswordRequired {
        user_id: String,
        reset_token: String,
    },
    /// Forgot initiate succeeded.
    ResetStarted { user_id: String },
    /// Forgot verify succeeded; the reset is authorized.
    ResetAuthorized,
    /// Forgot reset succeeded; log in with the new password.
    ResetCompleted,
    /// Any `{error}` response. The flow stays put so the user can retry.
    Failed { message: String },
}

/// Result of asking to start a resend request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResendGuard {
    /// Go ahead; the guard is now set.
    Started,
    /// A resend is already outstanding; do not fire another.
    AlreadyInFlight,
    /// The current state has nothing to resend.
    NotAvailable,
}

impl AuthFlow {
    #[must_use]
    pub fn start_login() -> Self {
        Self::Credentials {
            mode: CredentialsMode::Login,
        }
    }

    #[must_use]
    pub fn start_register() -> Self {
        Self::Credentials {
            mode: CredentialsMode::Register,
        }
    }

    #[must_use]
    pub fn start_forgot() -> Self {
        Self::Credentials {
            mode: CredentialsMode::Forgot,
        }
    }

    /// Apply a server outcome. Outcomes that make no sense in the current
    /// state leave it unchanged.
    #[must_use]
    pub fn advance(self, outcome: ServerOutcome) -> Self {
        match outcome {
            ServerOutcome::RegistrationStarted { user_id } => match self {
                Self::Credentials {
                    mode: CredentialsMode::Register,
                } => Self::OtpEntry {
                    user_id,
                    purpose: OtpPurpose::Register,
                    resend_in_flight: false,
                },
                other => other,
            },
            ServerOutcome::Verified => match self {
                Self::OtpEntry {
                    purpose: OtpPurpose::Register,
                    ..
                } => Self::start_login(),
                other => other,
            },
            ServerOutcome::SessionEstablished { user_id } => match self {
                Self::Credentials { .. } => Self::SignedIn { user_id },
                other => other,
            },
            ServerOutcome::VerificationRequired { user_id } => match self {
                Self::Credentials { .. } => Self::OtpEntry {
                    user_id,
                    purpose: OtpPurpose::Register,
                    resend_in_flight: false,
                },
                other => other,
            },
            ServerOutcome::SetPasswordRequired {
                user_id,
                reset_token,
            } => match self {
                Self::Credentials { .. } => Self::ResetEntry {
                    user_id,
                    reset_token: Some(reset_token),
                },
                other => other,
            },
            ServerOutcome::ResetStarted { user_id } => match self {
                Self::Credentials {
                    mode: CredentialsMode::Forgot,
                } => Self::OtpEntry {
                    user_id,
                    purpose: OtpPurpose::Reset,
                    resend_in_flight: false,
                },
                other => other,
            },
            ServerOutcome::ResetAuthorized => match self {
                Self::OtpEntry {
                    user_id,
                    purpose: OtpPurpose::Reset,
                    ..
                } => Self::ResetEntry {
                    user_id,
                    reset_token: None,
                },
                other => other,
            },
            ServerOutcome::ResetCompleted => match self {
                Self::ResetEntry { .. } => Self::start_login(),
                other => other,
            },
            ServerOutcome::Failed { .. } => self,
        }
    }

    /// Request permission to fire a resend.
    pub fn begin_resend(&mut self) -> ResendGuard {
        match self {
            Self::OtpEntry {
                resend_in_flight, ..
            } => {
                if *resend_in_flight {
                    ResendGuard::AlreadyInFlight
                } else {
                    *resend_in_flight = true;
                    ResendGuard::Started
                }
            }
            _ => ResendGuard::NotAvailable,
        }
    }

    /// Clear the guard once the resend request settles, success or not.
    pub fn resend_settled(&mut self) {
        if let Self::OtpEntry {
            resend_in_flight, ..
        } = self
        {
            *resend_in_flight = false;
        }
    }
}
