//! Guest display-name rules.

pub const MIN_LEN: usize = 2;
pub const MAX_LEN: usize = 20;

const RESERVED: &[&str] = &[
    "admin",
    "moderator",
    "system",
    "courseconnect",
    "support",
    "staff",
    "official",
    "root",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("Username must be at least 2 characters")]
    TooShort,

    #[error("Username must be at most 20 characters")]
    TooLong,

    #[error("Username can only contain letters, numbers, spaces, and _ - .")]
    InvalidCharacters,

    #[error("Username contains a reserved word (\"{0}\")")]
    Reserved(&'static str),

    #[error("Username is already taken")]
    Taken,
}

fn allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.')
}

/// Validate `name` against the rules and the set of names already in use.
///
/// Returns the trimmed name on success.
pub fn validate_username<'a, I>(name: &str, taken: I) -> Result<String, UsernameError>
where
    I: IntoIterator<Item = &'a str>,
{
    let name = name.trim();
    let len = name.chars().count();
    if len < MIN_LEN {
        return Err(UsernameError::TooShort);
    }
    if len > MAX_LEN {
        return Err(UsernameError::TooLong);
    }
    if !name.chars().all(allowed) {
        return Err(UsernameError::InvalidCharacters);
    }

    let lower = name.to_lowercase();
    if let Some(word) = RESERVED.iter().find(|w| lower.contains(*w)) {
        return Err(UsernameError::Reserved(*word));
    }
    if taken.into_iter().any(|t| t.trim().to_lowercase() == lower) {
        return Err(UsernameError::Taken);
    }
    Ok(name.to_string())
}
