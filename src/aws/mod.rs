use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};

pub mod assume_role;
pub mod credentials;
pub mod xml;

pub use self::assume_role::{exchange, StsClient, TokenService};
pub use self::credentials::{
    resolve_profile, write, write_atomic, AwsCliStore, CredentialStore, IniFileStore,
};

#[derive(Debug)]
pub struct AwsError {
    description: String,

    pub kind: AwsErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum AwsErrorKind {
    /// The token service refused the exchange. Retrying will not help.
    ExchangeRejected,
    TransientNetworkError,
    PersistFailed,
}

impl AwsError {
    pub fn new(kind: AwsErrorKind, message: &str) -> Self {
        AwsError {
            description: message.into(),
            kind,
        }
    }
}

impl Error for AwsError {}

impl Display for AwsError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Short-lived keys returned by the token exchange. The lifetime is whatever
/// was requested; it is not tracked here.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}
