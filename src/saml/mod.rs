use std::error::Error;
use std::fmt::{Display, Formatter, Result};

mod decode;
mod roles;

pub use self::decode::decode;
pub use self::roles::extract_roles;

#[cfg(test)]
pub(crate) use self::decode::test as fixtures;

/// Attribute name AWS uses for the list of assumable `role,provider` pairs.
pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";
pub const ROLE_SESSION_NAME_ATTRIBUTE: &str =
    "https://aws.amazon.com/SAML/Attributes/RoleSessionName";

#[derive(Debug)]
pub struct SamlError {
    description: String,

    pub kind: SamlErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum SamlErrorKind {
    MalformedAssertion,
    RoleAttributeNotFound,
    MalformedRoleValue,
}

impl SamlError {
    pub fn new(kind: SamlErrorKind, message: &str) -> Self {
        SamlError {
            description: message.into(),
            kind,
        }
    }
}

impl Error for SamlError {}

impl Display for SamlError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(&self.description)
    }
}

/// Body of the request that carried the assertion towards the sign-in
/// endpoint, exactly as it was captured.
#[derive(Debug)]
pub struct RawAssertionPayload {
    body: Vec<u8>,
}

impl RawAssertionPayload {
    pub fn new(body: Vec<u8>) -> Self {
        RawAssertionPayload { body }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// A decoded SAML response together with the base64 body it was decoded
/// from. The body is what the token exchange expects, so it is kept as-is.
#[derive(Debug)]
pub struct DecodedAssertion {
    encoded: String,
    response: SamlResponse,
}

impl DecodedAssertion {
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// First attribute with the given name, in document order.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.response.attributes().find(|a| a.name == name)
    }

    pub fn role_session_name(&self) -> Option<&str> {
        self.attribute(ROLE_SESSION_NAME_ATTRIBUTE)
            .and_then(|a| a.values.first())
            .map(|v| v.as_str())
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SamlResponse {
    pub assertions: Vec<Assertion>,
}

impl SamlResponse {
    /// All attributes of all assertions, flattened in document order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.assertions
            .iter()
            .flat_map(|a| a.attribute_statements.iter())
            .flat_map(|s| s.attributes.iter())
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Assertion {
    pub attribute_statements: Vec<AttributeStatement>,
}

#[derive(Debug, Default, PartialEq)]
pub struct AttributeStatement {
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

/// An assumable role and the SAML provider that vouches for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub arn: String,
    pub principal_arn: String,
}
