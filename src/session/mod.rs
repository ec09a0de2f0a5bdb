//! End-to-end sign-on: wait for the identity provider to hand over an
//! assertion, then decode it, pick a role, exchange it and store the
//! resulting credentials.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::aws::{self, AwsError, CredentialStore, TokenService};
use crate::config::Config;
use crate::saml::{self, Role, SamlError};

mod interception;
mod select;

pub use self::interception::{Disposition, Interception, OutboundRequest};
pub use self::select::TerminalRoleSelector;

/// Where the operator logs in. Every outbound request must be offered to
/// `interception` before it is sent, and the surface must close as soon as a
/// request is cancelled.
pub trait LoginSurface {
    type Error: Error + 'static;

    fn run(&mut self, url: &str, interception: &mut Interception) -> Result<(), Self::Error>;
}

pub trait RoleSelector {
    /// `None` when the operator does not pick anything.
    fn select(&mut self, roles: &[Role]) -> Option<Role>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingLogin,
    AssertionCaptured,
    RoleSelectionPending,
    Exchanging,
    Persisting,
    Done,
    Abandoned,
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done { profile: String },
    /// The login surface closed before an assertion was captured.
    Abandoned,
}

#[derive(Debug)]
pub enum SessionError {
    NotConfigured,
    Login(Box<dyn Error>),
    Saml(SamlError),
    NoRoleSelected,
    RoleNotAvailable(String),
    Aws(AwsError),
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Login(e) => Some(e.as_ref()),
            SessionError::Saml(e) => Some(e),
            SessionError::Aws(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SessionError::NotConfigured => f.write_str("no SSO URL is configured"),
            SessionError::Login(e) => write!(f, "login failed: {}", e),
            SessionError::Saml(e) => write!(f, "could not read the SAML assertion: {}", e),
            SessionError::NoRoleSelected => f.write_str("no role was selected"),
            SessionError::RoleNotAvailable(arn) => {
                write!(f, "the role {} is not offered by the identity provider", arn)
            }
            SessionError::Aws(e) => write!(f, "{}", e),
        }
    }
}

impl From<SamlError> for SessionError {
    fn from(e: SamlError) -> Self {
        SessionError::Saml(e)
    }
}

impl From<AwsError> for SessionError {
    fn from(e: AwsError) -> Self {
        SessionError::Aws(e)
    }
}

/// One sign-on attempt. Holds the configuration it was started with and
/// the profile the credentials will be written to.
pub struct Session<'a> {
    config: &'a Config,
    profile: String,
    role_arn: Option<String>,
    state: SessionState,
}

impl<'a> Session<'a> {
    /// `profile_override` is usually the value of `AWS_PROFILE`.
    pub fn new(config: &'a Config, profile_override: Option<&str>, role_arn: Option<&str>) -> Self {
        Session {
            config,
            profile: aws::resolve_profile(profile_override, &config.profile),
            role_arn: role_arn.map(|arn| arn.into()),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub fn run<S, R>(
        &mut self,
        surface: &mut S,
        selector: &mut R,
        tokens: &dyn TokenService,
        store: &mut dyn CredentialStore,
    ) -> Result<Outcome, SessionError>
    where
        S: LoginSurface,
        R: RoleSelector,
    {
        let result = self.drive(surface, selector, tokens, store);

        if result.is_err() {
            self.transition(SessionState::Failed);
        }

        result
    }

    fn drive<S, R>(
        &mut self,
        surface: &mut S,
        selector: &mut R,
        tokens: &dyn TokenService,
        store: &mut dyn CredentialStore,
    ) -> Result<Outcome, SessionError>
    where
        S: LoginSurface,
        R: RoleSelector,
    {
        let config = self.config;
        let url = config.sso_url().ok_or(SessionError::NotConfigured)?;

        self.transition(SessionState::AwaitingLogin);
        let mut interception = Interception::new(&config.submission_url);
        surface
            .run(url, &mut interception)
            .map_err(|e| SessionError::Login(Box::new(e)))?;

        let payload = match interception.take_payload() {
            Some(payload) => payload,
            None => {
                self.transition(SessionState::Abandoned);
                return Ok(Outcome::Abandoned);
            }
        };

        self.transition(SessionState::AssertionCaptured);
        let assertion = saml::decode(payload)?;
        if let Some(name) = assertion.role_session_name() {
            info!("signed in as {}", name);
        }
        let roles = saml::extract_roles(&assertion)?;

        self.transition(SessionState::RoleSelectionPending);
        let role = self.choose_role(&roles, selector)?;

        self.transition(SessionState::Exchanging);
        let credentials = aws::exchange(
            tokens,
            assertion.encoded(),
            &role,
            config.credential_duration_seconds,
        )?;
        drop(assertion);

        self.transition(SessionState::Persisting);
        if config.atomic_writes {
            aws::write_atomic(store, &credentials, &self.profile)?;
        } else {
            aws::write(store, &credentials, &self.profile)?;
        }

        self.transition(SessionState::Done);
        Ok(Outcome::Done {
            profile: self.profile.clone(),
        })
    }

    fn choose_role<R: RoleSelector>(
        &self,
        roles: &[Role],
        selector: &mut R,
    ) -> Result<Role, SessionError> {
        if let Some(ref arn) = self.role_arn {
            return roles
                .iter()
                .find(|role| &role.arn == arn)
                .cloned()
                .ok_or_else(|| SessionError::RoleNotAvailable(arn.clone()));
        }

        if let [only] = roles {
            debug!("only one role offered, using {}", only.arn);
            return Ok(only.clone());
        }

        selector.select(roles).ok_or(SessionError::NoRoleSelected)
    }
}
