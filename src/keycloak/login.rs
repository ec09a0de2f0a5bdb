use cookie::{Cookie, CookieJar};
use reqwest::blocking::{Client, Response};
use scraper::Html;
use url::{form_urlencoded, Url};

use super::form::{FormInfo, FormMethod};
use super::mfa::{fill_otp_form, is_otp_form};
use super::{KeycloakError, KeycloakErrorKind, LoginPrompt};
use crate::session::{Disposition, Interception, LoginSurface, OutboundRequest};

/// Upper bound on form submissions in one login.
const MAX_STEPS: usize = 10;

/// Walks the identity provider's HTML forms the way a browser would,
/// asking the operator for whatever the current form wants. Every form
/// submission is offered to the interception before it is sent.
pub struct KeycloakSurface<P: LoginPrompt> {
    client: Client,
    cookie_jar: CookieJar,
    prompt: P,
    mfa_device: Option<String>,
}

struct Page {
    url: Url,
    body: String,
}

impl<P: LoginPrompt> KeycloakSurface<P> {
    pub fn new(client: Client, prompt: P, mfa_device: Option<&str>) -> Self {
        KeycloakSurface {
            client,
            cookie_jar: CookieJar::new(),
            prompt,
            mfa_device: mfa_device.map(|d| d.into()),
        }
    }

    fn cookie_header(&self) -> String {
        self.cookie_jar
            .iter()
            .map(|cookie_from_jar| {
                format!("{}={}", cookie_from_jar.name(), cookie_from_jar.value())
            })
            .collect::<Vec<String>>()
            .join("; ")
    }

    fn send(&mut self, request: reqwest::blocking::RequestBuilder) -> Result<Page, KeycloakError> {
        let cookie = self.cookie_header();
        trace!("send.cookie={}", &cookie);

        let request = match cookie.is_empty() {
            true => request,
            false => request.header("Cookie", cookie),
        };

        let res = request.send().map_err(|e| {
            error!("send: {:?}", e);
            KeycloakError::new(KeycloakErrorKind::Http, &e.to_string())
        })?;

        self.collect_cookies(&res);

        let status = res.status();
        let url = res.url().clone();
        let body = res
            .text()
            .map_err(|e| KeycloakError::new(KeycloakErrorKind::Io, &e.to_string()))?;

        check_page(&body)?;

        if !status.is_success() {
            return Err(KeycloakError::new(
                KeycloakErrorKind::Http,
                &format!("the identity provider answered {} for {}", status, url),
            ));
        }

        Ok(Page { url, body })
    }

    fn collect_cookies(&mut self, res: &Response) {
        for raw_cookie in res.headers().get_all("set-cookie") {
            let raw_cookie = match raw_cookie.to_str() {
                Ok(c) => c.to_owned(),
                Err(_) => continue,
            };

            trace!("collect_cookies.raw_cookie={}", &raw_cookie);
            match Cookie::parse(raw_cookie) {
                Ok(cookie) => self.cookie_jar.add(cookie),
                Err(e) => debug!("ignoring unparsable cookie: {}", e),
            }
        }
    }

    /// Fills the form from the prompt. `false` when the operator gave up.
    fn fill(&mut self, form: &mut FormInfo) -> bool {
        if let Some(password_field) = form.password_field.clone() {
            trace!("fill.credentials");
            let username = match self.prompt.username() {
                Some(u) if !u.trim().is_empty() => u.trim().to_owned(),
                _ => return false,
            };
            let password = match self.prompt.password(&username) {
                Some(p) => p,
                None => return false,
            };

            let username_field = form
                .username_field
                .clone()
                .unwrap_or_else(|| "username".into());
            form.set(&username_field, &username);
            form.set(&password_field, &password);
        } else if is_otp_form(form) {
            trace!("fill.otp");
            let token = match self.prompt.token() {
                Some(t) if !t.trim().is_empty() => t.trim().to_owned(),
                _ => return false,
            };

            fill_otp_form(form, &token, self.mfa_device.as_deref());
        } else {
            trace!("fill.passthrough");
        }

        true
    }
}

impl<P: LoginPrompt> LoginSurface for KeycloakSurface<P> {
    type Error = KeycloakError;

    fn run(&mut self, url: &str, interception: &mut Interception) -> Result<(), KeycloakError> {
        trace!("run.start");
        let request = self.client.get(url);
        let mut page = self.send(request)?;

        for step in 0..MAX_STEPS {
            trace!("run.step={} url={}", step, page.url);
            let doc = Html::parse_document(&page.body);

            let mut form = match FormInfo::from_html(&doc, "form") {
                Some(f) => f,
                None => {
                    warn!("{} has no form to continue with, closing the login", page.url);
                    debug!("{}", page.body);
                    return Ok(());
                }
            };

            if !self.fill(&mut form) {
                debug!("no input given, closing the login");
                return Ok(());
            }

            let mut action = page.url.join(&form.action).map_err(|e| {
                KeycloakError::new(
                    KeycloakErrorKind::Http,
                    &format!("the form action {:?} is not a valid URL: {}", form.action, e),
                )
            })?;
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form.fields.iter())
                .finish();

            let body = match form.method {
                FormMethod::POST => encoded.into_bytes(),
                FormMethod::GET => {
                    action.set_query(Some(&encoded));
                    vec![]
                }
            };

            let outbound = OutboundRequest {
                url: action.to_string(),
                body,
            };

            if interception.offer(&outbound) == Disposition::Cancel {
                trace!("run.cancelled");
                return Ok(());
            }

            let request = match form.method {
                FormMethod::POST => self
                    .client
                    .post(action)
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(outbound.body),
                FormMethod::GET => self.client.get(action),
            };
            page = self.send(request)?;
        }

        Err(KeycloakError::new(
            KeycloakErrorKind::TooManySteps,
            &format!(
                "gave up after {} form submissions without reaching the sign-in endpoint",
                MAX_STEPS
            ),
        ))
    }
}

/// Turns the identity provider's known error pages into errors.
fn check_page(document: &str) -> Result<(), KeycloakError> {
    if document.contains("Invalid username or password") {
        return Err(KeycloakError::new(
            KeycloakErrorKind::InvalidCredentials,
            "Invalid username or password. If you changed your password recently, please run aws-saml-signon configure",
        ));
    } else if document.contains("Invalid authenticator code") {
        return Err(KeycloakError::new(
            KeycloakErrorKind::InvalidToken,
            "Invalid MFA token. If you have multiple MFA devices set up, check the mfaDevice entry of your config",
        ));
    } else if document.contains("kc-terms-text") {
        return Err(KeycloakError::new(
            KeycloakErrorKind::TermsAndConditionsNotAccepted,
            "Terms and Conditions not accepted. Please log in via your web browser to accept them",
        ));
    } else if document.contains("Update password") {
        return Err(KeycloakError::new(
            KeycloakErrorKind::PasswordUpdateRequired,
            "You need to update your password before you can login. Please visit the website to change your password.",
        ));
    } else if document
        .contains("Unexpected error when handling authentication request to identity provider.")
    {
        return Err(KeycloakError::new(
            KeycloakErrorKind::InvalidMFADevice,
            "A MFA device is configured, but the name could not be found. Double check your config with `aws-saml-signon configure`",
        ));
    }

    Ok(())
}
