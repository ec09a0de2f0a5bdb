use reqwest::blocking::Client;

use super::xml::{AssumeRoleWithSamlResponse, ErrorResponse};
use super::{AwsError, AwsErrorKind, TemporaryCredentials};
use crate::saml::Role;

pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com";

const STS_API_VERSION: &str = "2011-06-15";

#[derive(Debug)]
pub struct AssumeRoleRequest<'a> {
    pub role_arn: &'a str,
    pub principal_arn: &'a str,
    pub saml_assertion: &'a str,
    pub duration_seconds: u32,
}

pub trait TokenService {
    fn assume_role_with_saml(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<TemporaryCredentials, AwsError>;
}

/// Trades the assertion for credentials of the selected role. Single call,
/// no retries.
pub fn exchange(
    service: &dyn TokenService,
    saml_assertion: &str,
    role: &Role,
    duration_seconds: u32,
) -> Result<TemporaryCredentials, AwsError> {
    trace!("exchange.start role={}", role.arn);
    let request = AssumeRoleRequest {
        role_arn: &role.arn,
        principal_arn: &role.principal_arn,
        saml_assertion,
        duration_seconds,
    };

    let credentials = service.assume_role_with_saml(&request)?;

    trace!("exchange.ok access_key_id={}", credentials.access_key_id);
    Ok(credentials)
}

/// Unsigned client for the STS query API. `AssumeRoleWithSAML` is
/// authenticated by the assertion itself.
pub struct StsClient {
    client: Client,
    endpoint: String,
}

impl StsClient {
    pub fn new(client: Client, endpoint: &str) -> Self {
        StsClient {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl TokenService for StsClient {
    fn assume_role_with_saml(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<TemporaryCredentials, AwsError> {
        let duration = request.duration_seconds.to_string();
        let params = [
            ("Action", "AssumeRoleWithSAML"),
            ("Version", STS_API_VERSION),
            ("RoleArn", request.role_arn),
            ("PrincipalArn", request.principal_arn),
            ("SAMLAssertion", request.saml_assertion),
            ("DurationSeconds", duration.as_str()),
        ];

        trace!("assume_role_with_saml.send endpoint={}", self.endpoint);
        let res = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .map_err(|e| {
                error!("assume_role_with_saml: {:?}", e);
                network_error(&e)
            })?;

        let status = res.status();
        let body = res.text().map_err(|e| network_error(&e))?;
        trace!("assume_role_with_saml.status={}", status);

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }

        parse_credentials(&body)
    }
}

fn network_error(e: &reqwest::Error) -> AwsError {
    let message = if e.is_timeout() {
        format!("the token service did not answer in time: {}", e)
    } else {
        format!("could not reach the token service: {}", e)
    };

    AwsError::new(AwsErrorKind::TransientNetworkError, &message)
}

fn rejection(status: u16, body: &str) -> AwsError {
    let message = match serde_xml_rs::from_str::<ErrorResponse>(body) {
        Ok(res) => {
            if let Some(ref id) = res.request_id {
                debug!("sts request id {}", id);
            }
            format!("{}: {}", res.error.code, res.error.message)
        }
        Err(e) => {
            trace!("rejection.unparsed {:?}", e);
            format!("the token service answered with HTTP {}: {}", status, body.trim())
        }
    };

    AwsError::new(AwsErrorKind::ExchangeRejected, &message)
}

pub fn parse_credentials(body: &str) -> Result<TemporaryCredentials, AwsError> {
    let res: AssumeRoleWithSamlResponse = serde_xml_rs::from_str(body).map_err(|e| {
        AwsError::new(
            AwsErrorKind::ExchangeRejected,
            &format!("unexpected answer from the token service: {}", e),
        )
    })?;

    if let Some(ref user) = res.result.assumed_role_user {
        debug!("assumed {}", user.arn);
    }
    if let Some(ref expiration) = res.result.credentials.expiration {
        debug!("credentials expire at {}", expiration);
    }

    let credentials = res.result.credentials;
    Ok(TemporaryCredentials {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.secret_access_key,
        session_token: credentials.session_token,
    })
}
