use scraper::{node::Element, ElementRef, Html, Selector};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum FormMethod {
    GET,
    POST,
}

#[derive(Debug)]
pub struct MFADevice {
    pub name: String,
    pub id: String,
}

#[derive(Debug)]
pub struct FormInfo {
    pub id: Option<String>,
    pub method: FormMethod,
    pub action: String,
    /// Named inputs in document order, with their initial values.
    pub fields: Vec<(String, String)>,
    pub password_field: Option<String>,
    pub username_field: Option<String>,
    pub mfa_devices: Vec<MFADevice>,
}

impl FormInfo {
    pub fn from_html(doc: &Html, selector: &str) -> Option<Self> {
        let form_ref: ElementRef = doc.select(&Selector::parse(selector).ok()?).next()?;
        let form: &Element = form_ref.value();

        let method = match form.attr("method").unwrap_or("GET") {
            "GET" | "get" => FormMethod::GET,
            "POST" | "post" => FormMethod::POST,
            _ => return None,
        };
        let action = form.attr("action").unwrap_or_default().into();

        let mut fields = vec![];
        let mut password_field = None;
        let mut username_field = None;

        for input in form_ref.select(&Selector::parse("input[name]").ok()?) {
            let input: &Element = input.value();
            let name = match input.attr("name") {
                Some(name) => name.to_owned(),
                None => continue,
            };

            match input.attr("type").unwrap_or("text") {
                "submit" | "button" | "image" | "reset" | "file" => continue,
                "checkbox" | "radio" if input.attr("checked").is_none() => continue,
                "password" => password_field = Some(name.clone()),
                "text" | "email" if username_field.is_none() && name == "username" => {
                    username_field = Some(name.clone())
                }
                _ => {}
            }

            let value = input.attr("value").unwrap_or_default().to_owned();
            fields.push((name, value));
        }

        let mut mfa_devices: Vec<MFADevice> = vec![];

        let option_selector = Selector::parse("select[name=selectedCredentialId] option").ok()?;
        for option in form_ref.select(&option_selector) {
            let value: &Element = option.value();

            if value.attr("disabled").is_some() {
                continue;
            }

            if let Some(id) = value.attr("value") {
                mfa_devices.push(MFADevice {
                    name: option.text().collect::<String>().trim().to_owned(),
                    id: id.to_owned(),
                });
            }
        }

        trace!("mfa devices: {:?}", mfa_devices);

        Some(FormInfo {
            id: form.attr("id").map(|id| id.to_owned()),
            method,
            action,
            fields,
            password_field,
            username_field,
            mfa_devices,
        })
    }

    /// Sets a field, adding it when the form does not have it yet.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value.into(),
            None => self.fields.push((name.into(), value.into())),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_login_form() {
        let doc = Html::parse_document(
            r#"<html><body>
            <form id="kc-form-login" action="/realms/corp/login-actions/authenticate?session_code=abc" method="post">
              <input id="username" name="username" type="text" value="">
              <input id="password" name="password" type="password">
              <input type="hidden" name="credentialId" value="">
              <input type="checkbox" name="rememberMe">
              <input type="submit" name="login" value="Sign In">
            </form></body></html>"#,
        );

        let form = FormInfo::from_html(&doc, "form").unwrap();

        assert_eq!(form.id.as_deref(), Some("kc-form-login"));
        assert_eq!(form.method, FormMethod::POST);
        assert_eq!(
            form.action,
            "/realms/corp/login-actions/authenticate?session_code=abc"
        );
        assert_eq!(form.username_field.as_deref(), Some("username"));
        assert_eq!(form.password_field.as_deref(), Some("password"));
        let names: Vec<&str> = form.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["username", "password", "credentialId"]);
    }

    #[test]
    fn test_saml_post_form() {
        let doc = Html::parse_document(
            r#"<html><body onload="document.forms[0].submit()">
            <form method="POST" action="https://signin.aws.amazon.com/saml">
              <input type="hidden" name="SAMLResponse" value="PHNhbWxwOlJlc3BvbnNlPg=="/>
              <input type="hidden" name="RelayState" value=""/>
              <noscript><input type="submit" value="CONTINUE"/></noscript>
            </form></body></html>"#,
        );

        let form = FormInfo::from_html(&doc, "form").unwrap();

        assert_eq!(form.action, "https://signin.aws.amazon.com/saml");
        assert_eq!(
            form.fields,
            vec![
                ("SAMLResponse".to_owned(), "PHNhbWxwOlJlc3BvbnNlPg==".to_owned()),
                ("RelayState".to_owned(), "".to_owned()),
            ]
        );
        assert!(form.password_field.is_none());
    }

    #[test]
    fn test_mfa_devices_skip_disabled() {
        let doc = Html::parse_document(
            r#"<form id="kc-otp-login-form" action="/otp" method="post">
              <select name="selectedCredentialId">
                <option value="c1">Phone</option>
                <option value="c2" disabled>Old phone</option>
                <option value="c3">YubiKey</option>
              </select>
              <input id="otp" name="otp" type="text">
            </form>"#,
        );

        let form = FormInfo::from_html(&doc, "form").unwrap();

        assert_eq!(form.mfa_devices.len(), 2);
        assert_eq!(form.mfa_devices[1].name, "YubiKey");
        assert_eq!(form.mfa_devices[1].id, "c3");
    }

    #[test]
    fn test_no_form() {
        let doc = Html::parse_document("<html><body><p>You are signed in.</p></body></html>");

        assert!(FormInfo::from_html(&doc, "form").is_none());
    }

    #[test]
    fn test_set_replaces_or_appends() {
        let doc = Html::parse_document(
            r#"<form action="/x" method="post"><input name="otp" value=""></form>"#,
        );
        let mut form = FormInfo::from_html(&doc, "form").unwrap();

        form.set("otp", "123456");
        form.set("selectedCredentialId", "c3");

        assert_eq!(
            form.fields,
            vec![
                ("otp".to_owned(), "123456".to_owned()),
                ("selectedCredentialId".to_owned(), "c3".to_owned()),
            ]
        );
        assert!(form.has_field("otp"));
    }
}
