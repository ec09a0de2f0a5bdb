//! Shapes of the STS query API responses.

#[derive(Debug, Deserialize)]
pub struct AssumeRoleWithSamlResponse {
    #[serde(rename = "AssumeRoleWithSAMLResult")]
    pub result: AssumeRoleWithSamlResult,
}

#[derive(Debug, Deserialize)]
pub struct AssumeRoleWithSamlResult {
    #[serde(rename = "Credentials")]
    pub credentials: Credentials,
    #[serde(rename = "AssumedRoleUser", default)]
    pub assumed_role_user: Option<AssumedRoleUser>,
}

#[derive(Debug, Deserialize)]
pub struct AssumedRoleUser {
    #[serde(rename = "Arn")]
    pub arn: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Credentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "Expiration", default)]
    pub expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Error")]
    pub error: ErrorDetail,
    #[serde(rename = "RequestId", default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}
