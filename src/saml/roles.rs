use super::{DecodedAssertion, Role, SamlError, SamlErrorKind, ROLE_ATTRIBUTE};

/// Lists the roles offered by the assertion, in the order the identity
/// provider put them. Duplicates are kept; the operator picks one.
pub fn extract_roles(doc: &DecodedAssertion) -> Result<Vec<Role>, SamlError> {
    trace!("extract_roles.start");
    let attribute = doc.attribute(ROLE_ATTRIBUTE).ok_or_else(|| {
        SamlError::new(
            SamlErrorKind::RoleAttributeNotFound,
            &format!("the SAML assertion has no {} attribute", ROLE_ATTRIBUTE),
        )
    })?;

    let roles = attribute
        .values
        .iter()
        .map(|value| parse_role_value(value))
        .collect::<Result<Vec<Role>, SamlError>>()?;

    trace!("extract_roles.ok count={}", roles.len());
    Ok(roles)
}

/// Parses one `role-arn,provider-arn` value, taken as written. Fields after
/// the second comma are ignored.
pub fn parse_role_value(value: &str) -> Result<Role, SamlError> {
    let mut fields = value.split(',').map(|f| f.trim());

    let (first, second) = match (fields.next(), fields.next()) {
        (Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => (first, second),
        _ => {
            return Err(SamlError::new(
                SamlErrorKind::MalformedRoleValue,
                &format!(
                    "role value {:?} is not a comma separated role/provider pair",
                    value
                ),
            ))
        }
    };

    if fields.next().is_some() {
        debug!("ignoring extra fields in role value {:?}", value);
    }

    Ok(Role {
        arn: first.into(),
        principal_arn: second.into(),
    })
}
