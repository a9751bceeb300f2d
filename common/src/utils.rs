use std::borrow::Cow;
use validator::ValidationError;

/// Checks if a string might be a valid ISBN-10 or ISBN-13: digits and dashes
/// only, surrounding whitespace aside. Only the last ISBN-10 character may be
/// an `X`.
pub fn is_valid_isbn(isbn: &str) -> bool {
    let chars: Vec<char> = isbn.trim().chars().filter(|c| *c != '-').collect();
    match chars.split_last() {
        Some((last, rest)) if chars.len() == 10 => {
            rest.iter().all(char::is_ascii_digit) && (last.is_ascii_digit() || *last == 'X')
        }
        Some(_) if chars.len() == 13 => chars.iter().all(char::is_ascii_digit),
        _ => false,
    }
}

pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    if is_valid_isbn(isbn) {
        Ok(())
    } else {
        Err(ValidationError::new("isbn").with_message(Cow::Borrowed("ISBN must have 10 or 13 digits")))
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank").with_message(Cow::Borrowed("must not be blank")))
    } else {
        Ok(())
    }
}
