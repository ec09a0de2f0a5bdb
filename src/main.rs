#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod aws;
mod cli;
mod client;
mod config;
mod keycloak;
mod saml;
mod session;

use std::env;
use std::error::Error;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use crossterm::style::Stylize;

use aws::credentials::PROFILE_ENV;
use aws::{AwsCliStore, AwsErrorKind, CredentialStore, IniFileStore, StsClient};
use cli::{Cli, Commands};
use config::{Config, StoreKind};
use keycloak::{KeycloakSurface, TerminalLoginPrompt};
use session::{Outcome, Session, SessionError, TerminalRoleSelector};

fn setup_logger(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = match verbose {
        true => log::LevelFilter::Trace,
        false => log::LevelFilter::Warn,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        .level_for(module_path!(), level)
        .chain(io::stderr())
        .apply()
}

/// Points OpenSSL at the system certificates when the environment does not.
fn probe_certificates() {
    let probe = openssl_probe::probe();

    if env::var_os("SSL_CERT_FILE").is_none() {
        if let Some(file) = probe.cert_file {
            trace!("probe_certificates.cert_file={}", file.display());
            env::set_var("SSL_CERT_FILE", file);
        }
    }
    if env::var_os("SSL_CERT_DIR").is_none() {
        if let Some(dir) = probe.cert_dir {
            trace!("probe_certificates.cert_dir={}", dir.display());
            env::set_var("SSL_CERT_DIR", dir);
        }
    }
}

#[derive(Debug, PartialEq)]
enum Plan {
    Configure,
    MissingSsoUrl,
    SignOn,
}

fn plan(command: Option<&Commands>, cfg: &Config) -> Plan {
    match command {
        Some(Commands::Configure) => Plan::Configure,
        Some(Commands::Login) | None => match cfg.sso_url() {
            Some(_) => Plan::SignOn,
            None => Plan::MissingSsoUrl,
        },
    }
}

fn credential_store(kind: StoreKind) -> Result<Box<dyn CredentialStore>, Box<dyn Error>> {
    match kind {
        StoreKind::AwsCli => Ok(Box::new(AwsCliStore::default())),
        StoreKind::File => {
            let path = IniFileStore::default_path()
                .ok_or("could not determine the location of the AWS credentials file")?;
            debug!("writing credentials to {}", path.display());

            Ok(Box::new(IniFileStore::new(path)))
        }
    }
}

/// Advice for failures that may go away by running again.
fn retry_hint(e: &(dyn Error + 'static)) -> Option<&'static str> {
    match e.downcast_ref::<SessionError>() {
        Some(SessionError::Aws(aws)) if aws.kind == AwsErrorKind::TransientNetworkError => {
            Some("The token service could not be reached. Re-run aws-saml-signon to retry.")
        }
        _ => None,
    }
}

fn sign_on(cli: &Cli, cfg: &Config) -> Result<Outcome, Box<dyn Error>> {
    trace!("sign_on.start");
    let client = client::build_client()?;
    let tokens = StsClient::new(client.clone(), &cfg.sts_endpoint);
    let mut store = credential_store(cfg.credential_store)?;

    let prompt = TerminalLoginPrompt::new(cfg.username.as_deref(), !cli.skip_password_manager);
    let mut surface = KeycloakSurface::new(client, prompt, cfg.mfa_device.as_deref());
    let mut selector = TerminalRoleSelector;

    let profile_override = env::var(PROFILE_ENV).ok();
    let mut session = Session::new(cfg, profile_override.as_deref(), cli.role.as_deref());

    Ok(session.run(&mut surface, &mut selector, &tokens, store.as_mut())?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logger(cli.verbose) {
        eprintln!("could not set up logging: {}", e);
    }
    probe_certificates();

    let cfg = match config::load_or_default(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {}", "Could not load the configuration:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    trace!("main.config filename={}", cfg.filename().display());

    match plan(cli.command.as_ref(), &cfg) {
        Plan::Configure => match config::interactive_configure(cfg, !cli.skip_password_manager) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {}", "Could not save the configuration:".red(), e);
                ExitCode::FAILURE
            }
        },
        Plan::MissingSsoUrl => {
            eprintln!(
                "No SSO URL is configured in {}.\nRun {} to set one up.",
                cfg.filename().display(),
                "aws-saml-signon configure".yellow()
            );
            ExitCode::FAILURE
        }
        Plan::SignOn => match sign_on(&cli, &cfg) {
            Ok(Outcome::Done { profile }) => {
                println!(
                    "Success! Your profile \"{}\" should be ready to use.",
                    profile
                );
                ExitCode::SUCCESS
            }
            Ok(Outcome::Abandoned) => {
                debug!("login closed before an assertion was captured");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {}", "Error:".red(), e);
                if let Some(hint) = retry_hint(e.as_ref()) {
                    eprintln!("{}", hint.yellow());
                }
                ExitCode::FAILURE
            }
        },
    }
}
