use std::error::Error;
use std::fmt::{Display, Formatter, Result};

mod form;
pub mod login;
mod mfa;
mod prompt;

pub use self::login::KeycloakSurface;
pub use self::prompt::TerminalLoginPrompt;

#[derive(Debug)]
pub struct KeycloakError {
    description: String,

    pub kind: KeycloakErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum KeycloakErrorKind {
    Io,
    Http,
    InvalidCredentials,
    InvalidToken,
    InvalidMFADevice,
    PasswordUpdateRequired,
    TermsAndConditionsNotAccepted,
    TooManySteps,
}

impl KeycloakError {
    pub fn new(kind: KeycloakErrorKind, message: &str) -> Self {
        KeycloakError {
            description: message.into(),
            kind,
        }
    }
}

impl Error for KeycloakError {}

impl Display for KeycloakError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(&self.description)
    }
}

/// Supplies what the operator types into the identity provider's forms.
/// Returning `None` means the operator gave up, which closes the login.
pub trait LoginPrompt {
    fn username(&mut self) -> Option<String>;
    fn password(&mut self, username: &str) -> Option<String>;
    fn token(&mut self) -> Option<String>;
}
