use anyhow::{Result, anyhow};

/// Cheap shape check on a stored contact address before handing it to the
/// mail relay. Not RFC-complete, just enough to reject obviously bad data.
pub fn validate_email(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(anyhow!("Email address cannot be empty"));
    }

    if address.len() > 254 {
        return Err(anyhow!("Email address too long (maximum 254 characters)"));
    }

    let Some((local, domain)) = address.split_once('@') else {
        return Err(anyhow!("Email address is missing '@'"));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(anyhow!("Email address has an empty local or domain part"));
    }

    if !domain.contains('.') || address.chars().any(char::is_whitespace) {
        return Err(anyhow!("Email address is malformed"));
    }

    Ok(())
}
