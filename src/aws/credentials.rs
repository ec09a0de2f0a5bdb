use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ini::Ini;
use tempfile::NamedTempFile;

use super::{AwsError, AwsErrorKind, TemporaryCredentials};

/// Overrides the configured destination profile when set and non-empty.
pub const PROFILE_ENV: &str = "AWS_PROFILE";
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";

/// External place credentials are written to, one key at a time.
pub trait CredentialStore {
    fn set(&mut self, key: &str, value: &str, profile: &str) -> io::Result<()>;

    /// Writes all entries as one unit where the store supports it. The
    /// default falls back to sequential `set` calls.
    fn set_all(&mut self, entries: &[(&str, &str)], profile: &str) -> io::Result<()> {
        for (key, value) in entries {
            self.set(key, value, profile)?;
        }
        Ok(())
    }
}

pub fn resolve_profile(env_override: Option<&str>, configured: &str) -> String {
    match env_override {
        Some(profile) if !profile.is_empty() => profile.into(),
        _ => configured.into(),
    }
}

fn entries(creds: &TemporaryCredentials) -> [(&'static str, &str); 3] {
    [
        (ACCESS_KEY_ID, creds.access_key_id.as_str()),
        (SECRET_ACCESS_KEY, creds.secret_access_key.as_str()),
        (SESSION_TOKEN, creds.session_token.as_str()),
    ]
}

/// Writes the three credential keys into `profile`, one store call each.
///
/// This is not transactional. If a write fails, the keys written before it
/// stay in place and the profile is left half updated; the error names what
/// was already written.
pub fn write(
    store: &mut dyn CredentialStore,
    creds: &TemporaryCredentials,
    profile: &str,
) -> Result<(), AwsError> {
    let mut written: Vec<&str> = vec![];

    for &(key, value) in entries(creds).iter() {
        trace!("write.set key={} profile={}", key, profile);
        if let Err(e) = store.set(key, value, profile) {
            error!("write: {:?}", e);
            let already = if written.is_empty() {
                "nothing was written".to_owned()
            } else {
                format!("{} already written", written.join(", "))
            };

            return Err(AwsError::new(
                AwsErrorKind::PersistFailed,
                &format!(
                    "could not write {} to profile {}: {} ({})",
                    key, profile, e, already
                ),
            ));
        }
        written.push(key);
    }

    Ok(())
}

/// Writes all three keys through the store's staged write.
pub fn write_atomic(
    store: &mut dyn CredentialStore,
    creds: &TemporaryCredentials,
    profile: &str,
) -> Result<(), AwsError> {
    trace!("write_atomic.set_all profile={}", profile);
    store.set_all(&entries(creds), profile).map_err(|e| {
        AwsError::new(
            AwsErrorKind::PersistFailed,
            &format!("could not write credentials to profile {}: {}", profile, e),
        )
    })
}

/// Delegates to `aws configure set <key> <value> --profile <profile>`.
pub struct AwsCliStore {
    program: String,
}

impl AwsCliStore {
    pub fn new(program: &str) -> Self {
        AwsCliStore {
            program: program.into(),
        }
    }
}

impl Default for AwsCliStore {
    fn default() -> Self {
        AwsCliStore::new("aws")
    }
}

impl CredentialStore for AwsCliStore {
    fn set(&mut self, key: &str, value: &str, profile: &str) -> io::Result<()> {
        let output = Command::new(&self.program)
            .arg("configure")
            .arg("set")
            .arg(key)
            .arg(value)
            .arg("--profile")
            .arg(profile)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("could not run {}: {}. Is the AWS CLI installed?", self.program, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} configure set exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        Ok(())
    }
}

/// Edits the shared credentials file directly.
pub struct IniFileStore {
    path: PathBuf,
}

impl IniFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        IniFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `$AWS_SHARED_CREDENTIALS_FILE`, else `~/.aws/credentials`.
    pub fn default_path() -> Option<PathBuf> {
        match env::var_os(CREDENTIALS_FILE_ENV) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => dirs::home_dir().map(|home| home.join(".aws").join("credentials")),
        }
    }

    fn load(&self) -> io::Result<Ini> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            return Ok(Ini::new());
        }

        Ini::load_from_file(&self.path).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("could not read {}: {}", self.path.display(), e),
            )
        })
    }
}

/// Opens the credentials file for rewriting. A file that does not exist yet
/// is created readable by the owner only; an existing one keeps its mode.
fn open_owner_only(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

impl CredentialStore for IniFileStore {
    fn set(&mut self, key: &str, value: &str, profile: &str) -> io::Result<()> {
        let mut ini = self.load()?;
        ini.with_section(Some(profile)).set(key, value);

        let mut file = open_owner_only(&self.path)?;
        ini.write_to(&mut file)
    }

    /// Stages every entry in memory, writes an owner-only temporary file next
    /// to the credentials file and renames it over the original.
    fn set_all(&mut self, entries: &[(&str, &str)], profile: &str) -> io::Result<()> {
        let mut ini = self.load()?;
        for (key, value) in entries {
            ini.with_section(Some(profile)).set(*key, *value);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staging = NamedTempFile::new_in(dir)?;
        trace!("set_all.staging={}", staging.path().display());
        ini.write_to(&mut staging)?;
        staging.as_file().sync_all()?;
        staging.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn creds() -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "AKIAEXAMPLE".into(),
            secret_access_key: "secretEXAMPLE".into(),
            session_token: "tokenEXAMPLE".into(),
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        writes: Vec<(String, String, String)>,
        fail_on: Option<&'static str>,
    }

    impl CredentialStore for RecordingStore {
        fn set(&mut self, key: &str, value: &str, profile: &str) -> io::Result<()> {
            if self.fail_on == Some(key) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.writes.push((key.into(), value.into(), profile.into()));
            Ok(())
        }
    }

    #[test]
    fn test_resolve_profile() {
        assert_eq!(resolve_profile(Some("prod"), "saml-signon"), "prod");
        assert_eq!(resolve_profile(None, "saml-signon"), "saml-signon");
        assert_eq!(resolve_profile(Some(""), "saml-signon"), "saml-signon");
    }

    #[test]
    fn test_write_is_sequential() {
        let mut store = RecordingStore::default();

        write(&mut store, &creds(), "work").unwrap();

        assert_eq!(
            store.writes,
            vec![
                ("aws_access_key_id".into(), "AKIAEXAMPLE".into(), "work".into()),
                ("aws_secret_access_key".into(), "secretEXAMPLE".into(), "work".into()),
                ("aws_session_token".into(), "tokenEXAMPLE".into(), "work".into()),
            ]
        );
    }

    #[test]
    fn test_write_failure_leaves_earlier_keys() {
        let mut store = RecordingStore {
            fail_on: Some(SECRET_ACCESS_KEY),
            ..Default::default()
        };

        let err = write(&mut store, &creds(), "work").unwrap_err();

        assert_eq!(err.kind, AwsErrorKind::PersistFailed);
        assert!(err.to_string().contains("aws_access_key_id already written"));
        assert_eq!(store.writes.len(), 1);
        assert_eq!(store.writes[0].0, ACCESS_KEY_ID);
    }

    #[test]
    fn test_ini_store_writes_profile_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".aws").join("credentials");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = keep\n",
        )
        .unwrap();

        let mut store = IniFileStore::new(&path);
        write(&mut store, &creds(), "work").unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        let work = ini.section(Some("work")).unwrap();
        assert_eq!(work.get(ACCESS_KEY_ID), Some("AKIAEXAMPLE"));
        assert_eq!(work.get(SECRET_ACCESS_KEY), Some("secretEXAMPLE"));
        assert_eq!(work.get(SESSION_TOKEN), Some("tokenEXAMPLE"));
        assert_eq!(
            ini.section(Some("default")).unwrap().get(ACCESS_KEY_ID),
            Some("AKIADEFAULT")
        );
    }

    #[test]
    fn test_ini_store_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials");

        let mut store = IniFileStore::new(&path);
        write_atomic(&mut store, &creds(), "work").unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        assert_eq!(
            ini.section(Some("work")).unwrap().get(SESSION_TOKEN),
            Some("tokenEXAMPLE")
        );
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("credentials")]);
    }

    #[test]
    fn test_write_atomic_replaces_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[work]\naws_access_key_id = OLD\naws_session_token = OLD\n").unwrap();

        let mut store = IniFileStore::new(&path);
        write_atomic(&mut store, &creds(), "work").unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        let work = ini.section(Some("work")).unwrap();
        assert_eq!(work.get(ACCESS_KEY_ID), Some("AKIAEXAMPLE"));
        assert_eq!(work.get(SESSION_TOKEN), Some("tokenEXAMPLE"));
    }

    #[test]
    fn test_aws_cli_store_missing_binary() {
        let mut store = AwsCliStore::new("aws-saml-signon-test-no-such-binary");

        let err = write(&mut store, &creds(), "work").unwrap_err();

        assert_eq!(err.kind, AwsErrorKind::PersistFailed);
    }

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;

        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn test_ini_store_new_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");

        let mut store = IniFileStore::new(&path);
        write(&mut store, &creds(), "work").unwrap();

        assert_eq!(mode(&path), 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[default]\naws_access_key_id = AKIADEFAULT\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let mut store = IniFileStore::new(&path);
        write_atomic(&mut store, &creds(), "work").unwrap();

        assert_eq!(mode(&path), 0o600);
        let ini = Ini::load_from_file(&path).unwrap();
        assert_eq!(
            ini.section(Some("default")).unwrap().get(ACCESS_KEY_ID),
            Some("AKIADEFAULT")
        );
    }
}
