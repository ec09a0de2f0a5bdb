use crossterm::style::Stylize;

use super::LoginPrompt;
use crate::config;

/// Asks on the terminal, remembering the password in the platform's
/// credential storage unless that is switched off.
pub struct TerminalLoginPrompt {
    default_username: Option<String>,
    use_keyring: bool,
}

impl TerminalLoginPrompt {
    pub fn new(default_username: Option<&str>, use_keyring: bool) -> Self {
        TerminalLoginPrompt {
            default_username: default_username.map(|u| u.into()),
            use_keyring,
        }
    }
}

impl LoginPrompt for TerminalLoginPrompt {
    fn username(&mut self) -> Option<String> {
        config::prompt("IDP Username", self.default_username.as_deref())
    }

    fn password(&mut self, username: &str) -> Option<String> {
        if self.use_keyring {
            match config::get_password(username) {
                Ok(password) => {
                    trace!("password.from_keyring");
                    return Some(password);
                }
                Err(e) => debug!("no stored password for {}: {}", username, e),
            }
        }

        let password = match rpassword::prompt_password(format!("{} IDP Password: ", "?".green())) {
            Ok(p) if !p.is_empty() => p,
            Ok(_) => return None,
            Err(e) => {
                warn!("could not read password: {}", e);
                return None;
            }
        };

        if self.use_keyring {
            if let Err(e) = config::set_password(username, &password) {
                warn!("could not save password in credentials storage: {}", e);
            }
        }

        Some(password)
    }

    fn token(&mut self) -> Option<String> {
        config::prompt("MFA Token", None)
    }
}
