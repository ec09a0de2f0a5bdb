use super::form::FormInfo;

const OTP_FORM_IDS: [&str; 2] = ["kc-otp-login-form", "kc-totp-login-form"];

pub fn is_otp_form(form: &FormInfo) -> bool {
    form.has_field("otp")
        || form.has_field("totp")
        || form
            .id
            .as_deref()
            .map_or(false, |id| OTP_FORM_IDS.contains(&id))
}

/// Puts the token into the one-time code field and selects the configured
/// device. An unknown device name leaves the identity provider's default
/// selection in place.
pub fn fill_otp_form(form: &mut FormInfo, token: &str, mfa_device: Option<&str>) {
    let mut filled = false;
    for field in &["otp", "totp"] {
        if form.has_field(field) {
            form.set(field, token);
            filled = true;
        }
    }
    if !filled {
        form.set("otp", token);
    }

    if let Some(mfa_device) = mfa_device {
        trace!("mfa configured, trying to find device in form");

        let found = form
            .mfa_devices
            .iter()
            .find(|d| d.name == mfa_device)
            .map(|d| d.id.clone());

        match found {
            Some(id) => {
                trace!("mfa device found with id {}", &id);
                form.set("selectedCredentialId", &id);
            }
            None => debug!("mfa device {} not offered, using the default", mfa_device),
        }
    }
}
