use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;

use crate::aws::assume_role::DEFAULT_STS_ENDPOINT;

pub const KEYRING_SERVICE: &str = "aws-saml-signon";
pub const DEFAULT_PROFILE: &str = "saml-signon";
pub const DEFAULT_DURATION_SECONDS: u32 = 3600;
pub const DEFAULT_SUBMISSION_URL: &str = "https://signin.aws.amazon.com/saml";

const LOCAL_FILENAME: &str = "./aws-saml-signon.yml";
const HOME_FILENAME: &str = ".aws-saml-signon.yml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(skip)]
    filename: PathBuf,

    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_url: Option<String>,
    #[serde(default = "default_duration")]
    pub credential_duration_seconds: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_device: Option<String>,

    #[serde(default = "default_submission_url")]
    pub submission_url: String,
    #[serde(default = "default_sts_endpoint")]
    pub sts_endpoint: String,
    #[serde(default)]
    pub credential_store: StoreKind,
    #[serde(default)]
    pub atomic_writes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    AwsCli,
    File,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.into()
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECONDS
}

fn default_submission_url() -> String {
    DEFAULT_SUBMISSION_URL.into()
}

fn default_sts_endpoint() -> String {
    DEFAULT_STS_ENDPOINT.into()
}

fn default_filename() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HOME_FILENAME),
        None => PathBuf::from(HOME_FILENAME),
    }
}

fn get_filename(paths: &[PathBuf]) -> Option<&Path> {
    paths.iter().map(|p| p.as_path()).find(|p| p.exists())
}

fn yaml_error(e: serde_yaml::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Loads the configuration from `explicit`, `./aws-saml-signon.yml` or
/// `~/.aws-saml-signon.yml`, in that order. When none exists the defaults
/// are written to the first candidate.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config, io::Error> {
    let candidates = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => vec![PathBuf::from(LOCAL_FILENAME), default_filename()],
    };

    match get_filename(&candidates) {
        Some(path) => load(path),
        None => {
            let path = match explicit {
                Some(path) => path.to_path_buf(),
                None => default_filename(),
            };
            let cfg = Config::default().with_filename(&path);

            debug!("no configuration found, creating {}", path.display());
            if let Err(e) = cfg.save() {
                warn!("could not create {}: {}", path.display(), e);
            }

            Ok(cfg)
        }
    }
}

pub fn load(path: &Path) -> Result<Config, io::Error> {
    let mut f = File::open(path)?;

    let mut buf = String::new();
    f.read_to_string(&mut buf)?;

    let cfg = serde_yaml::from_str::<Config>(&buf).map_err(yaml_error)?;
    trace!("load.ok filename={}", path.display());

    Ok(cfg.with_filename(path))
}

pub fn get_password(username: &str) -> Result<String, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, username)?.get_password()
}

pub fn set_password(username: &str, password: &str) -> Result<(), keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, username)?.set_password(password)
}

/// Asks a question on the terminal. An empty answer yields the default;
/// `None` means no answer was given at all.
pub fn prompt(question: &str, default: Option<&str>) -> Option<String> {
    let mut buf = String::new();
    match default {
        Some(default) if !default.is_empty() => {
            print!("{} {} [{}]: ", "?".green(), question, default.dark_grey())
        }
        _ => print!("{} {}: ", "?".green(), question),
    }
    let _ = io::stdout().flush();

    match io::stdin().read_line(&mut buf) {
        Ok(0) => {
            println!();
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            println!("Could not read line: {}", e);
            return default.map(|d| d.into());
        }
    }

    let answer = buf.trim();
    if answer.is_empty() {
        return default.filter(|d| !d.is_empty()).map(|d| d.into());
    }

    Some(answer.into())
}

fn prompt_duration(default: u32) -> u32 {
    loop {
        let answer = match prompt(
            "Duration for generated credentials to remain valid (seconds)",
            Some(default.to_string().as_str()),
        ) {
            Some(answer) => answer,
            None => return default,
        };

        match answer.parse::<u32>() {
            Ok(seconds) if seconds > 0 => return seconds,
            _ => println!("{}", "Please enter a positive number of seconds".red()),
        }
    }
}

/// Walks the operator through every setting and saves the result.
pub fn interactive_configure(default: Config, use_keyring: bool) -> Result<Config, io::Error> {
    println!("\nConfiguring aws-saml-signon. Press enter to keep the value in brackets.");
    println!(
        "The SSO URL is {} of your identity provider.\n",
        "the login page that starts the AWS sign-in".yellow()
    );

    let mut cfg = default;

    if let Some(profile) = prompt(
        "Default AWS Profile (when AWS_PROFILE is not set)",
        Some(cfg.profile.as_str()),
    ) {
        cfg.profile = profile;
    }

    cfg.sso_url = prompt("SSO URL", cfg.sso_url.as_deref()).or(cfg.sso_url);
    cfg.credential_duration_seconds = prompt_duration(cfg.credential_duration_seconds);
    cfg.username = prompt("IDP Username", cfg.username.as_deref()).or(cfg.username);
    cfg.mfa_device = prompt("MFA device name (optional)", cfg.mfa_device.as_deref())
        .or(cfg.mfa_device);

    if let (Some(username), true) = (cfg.username.as_deref(), use_keyring) {
        match rpassword::prompt_password(format!("{} IDP Password: ", "?".green())) {
            Ok(password) if !password.is_empty() => {
                if let Err(e) = set_password(username, &password) {
                    println!(
                        "{} {}",
                        "Could not save password in credentials storage:".red(),
                        e
                    );
                }
            }
            Ok(_) => trace!("interactive_configure.password_unchanged"),
            Err(e) => warn!("could not read password: {}", e),
        }
    }

    cfg.save()?;
    println!("\nAll set!\n");

    Ok(cfg)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filename: default_filename(),
            profile: default_profile(),
            sso_url: None,
            credential_duration_seconds: DEFAULT_DURATION_SECONDS,
            username: None,
            mfa_device: None,
            submission_url: default_submission_url(),
            sts_endpoint: default_sts_endpoint(),
            credential_store: StoreKind::default(),
            atomic_writes: false,
        }
    }
}

impl Config {
    pub fn with_filename(mut self, path: &Path) -> Self {
        self.filename = path.to_path_buf();
        self
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The configured login URL, if it is set to something.
    pub fn sso_url(&self) -> Option<&str> {
        self.sso_url
            .as_deref()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }

    pub fn save(&self) -> Result<(), io::Error> {
        let f = File::create(&self.filename)?;

        serde_yaml::to_writer(f, self).map_err(yaml_error)
    }
}
