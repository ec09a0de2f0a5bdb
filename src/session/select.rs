use crossterm::style::Stylize;
use regex::Regex;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::RoleSelector;
use crate::config::prompt;
use crate::saml::Role;

const ROLE_ARN_PATTERN: &str = r"^arn:[^:]+:iam::([0-9]+):role/(.+)$";

#[derive(Tabled)]
struct RoleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Role")]
    name: String,
    #[tabled(rename = "ARN")]
    arn: String,
}

/// Splits a role ARN into account id and role name for display.
fn describe_role(pattern: &Regex, arn: &str) -> (String, String) {
    match pattern.captures(arn) {
        Some(c) => (c[1].to_owned(), c[2].to_owned()),
        None => ("-".into(), arn.into()),
    }
}

pub fn render_roles(roles: &[Role]) -> Result<String, regex::Error> {
    let pattern = Regex::new(ROLE_ARN_PATTERN)?;

    let rows = roles.iter().enumerate().map(|(i, role)| {
        let (account, name) = describe_role(&pattern, &role.arn);
        RoleRow {
            index: i + 1,
            account,
            name,
            arn: role.arn.clone(),
        }
    });

    Ok(Table::new(rows).with(Style::rounded()).to_string())
}

/// Asks for a role number on the terminal.
pub struct TerminalRoleSelector;

impl RoleSelector for TerminalRoleSelector {
    fn select(&mut self, roles: &[Role]) -> Option<Role> {
        match render_roles(roles) {
            Ok(table) => println!("\n{}", table),
            Err(e) => {
                error!("could not list roles: {}", e);
                return None;
            }
        }

        loop {
            let answer = prompt(
                &format!("Choose a role to assume [1-{}]", roles.len()),
                None,
            )?;

            match answer.parse::<usize>() {
                Ok(n) if n >= 1 && n <= roles.len() => return Some(roles[n - 1].clone()),
                _ => println!(
                    "{}",
                    format!("Please enter a number between 1 and {}", roles.len()).red()
                ),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_describe_role() {
        let pattern = Regex::new(ROLE_ARN_PATTERN).unwrap();

        assert_eq!(
            describe_role(&pattern, "arn:aws:iam::123456789012:role/Administrator"),
            ("123456789012".into(), "Administrator".into())
        );
        assert_eq!(
            describe_role(&pattern, "arn:aws-us-gov:iam::123456789012:role/path/ReadOnly"),
            ("123456789012".into(), "path/ReadOnly".into())
        );
        assert_eq!(describe_role(&pattern, "arn:a"), ("-".into(), "arn:a".into()));
    }

    #[test]
    fn test_render_roles_lists_every_role() {
        let roles = vec![
            Role {
                arn: "arn:aws:iam::111:role/Admin".into(),
                principal_arn: "arn:aws:iam::111:saml-provider/IDP".into(),
            },
            Role {
                arn: "arn:aws:iam::222:role/ReadOnly".into(),
                principal_arn: "arn:aws:iam::222:saml-provider/IDP".into(),
            },
        ];

        let table = render_roles(&roles).unwrap();

        assert!(table.contains("Admin"));
        assert!(table.contains("ReadOnly"));
        assert!(table.contains("222"));
    }
}
