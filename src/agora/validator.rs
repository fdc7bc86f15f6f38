//! Request payload validation.
//!
//! Built once at startup and shared read-only through the application state.

use regex::Regex;

pub const USERNAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 255;
pub const PASSWORD_MIN: usize = 3;
pub const PASSWORD_MAX: usize = 72;
pub const TITLE_MAX: usize = 100;
pub const CONTENT_MAX: usize = 5000;

#[derive(Debug, Clone)]
pub struct Validator {
    email: Regex,
}

impl Validator {
    /// # Errors
    /// Returns an error if the email pattern does not compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?,
        })
    }

    /// # Errors
    /// A message naming the first offending field.
    pub fn registration(&self, username: &str, email: &str, password: &str) -> Result<(), String> {
        required("username", username)?;
        max_len("username", username, USERNAME_MAX)?;
        required("email", email)?;
        max_len("email", email, EMAIL_MAX)?;
        if !self.email.is_match(email) {
            return Err("email is not a valid address".to_string());
        }
        let length = password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&length) {
            return Err(format!(
                "password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"
            ));
        }
        Ok(())
    }

    /// # Errors
    /// A message naming the first offending field.
    pub fn login(&self, email: &str, password: &str) -> Result<(), String> {
        required("email", email)?;
        max_len("email", email, EMAIL_MAX)?;
        if !self.email.is_match(email) {
            return Err("email is not a valid address".to_string());
        }
        required("password", password)?;
        max_len("password", password, PASSWORD_MAX)
    }

    /// # Errors
    /// A message naming the first offending field.
    pub fn new_post(&self, title: &str, content: &str) -> Result<(), String> {
        required("title", title)?;
        max_len("title", title, TITLE_MAX)?;
        required("content", content)?;
        max_len("content", content, CONTENT_MAX)
    }

    /// # Errors
    /// A message naming the first offending field.
    pub fn post_patch(&self, title: Option<&str>, content: Option<&str>) -> Result<(), String> {
        if let Some(title) = title {
            max_len("title", title, TITLE_MAX)?;
        }
        if let Some(content) = content {
            max_len("content", content, CONTENT_MAX)?;
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

fn max_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        Err(format!("{field} must be at most {max} characters"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new().expect("validator")
    }

    #[test]
    fn registration_accepts_valid_payload() {
        assert!(validator()
            .registration("alice", "alice@example.com", "secret")
            .is_ok());
    }

    #[test]
    fn registration_rejects_bad_fields() {
        let v = validator();
        assert!(v.registration("", "alice@example.com", "secret").is_err());
        assert!(v.registration(&"a".repeat(101), "alice@example.com", "secret").is_err());
        assert!(v.registration("alice", "not-an-email", "secret").is_err());
        assert!(v.registration("alice", "alice@example.com", "ab").is_err());
        assert!(v.registration("alice", "alice@example.com", &"p".repeat(73)).is_err());
    }

    #[test]
    fn post_limits() {
        let v = validator();
        assert!(v.new_post("title", "body").is_ok());
        assert!(v.new_post("", "body").is_err());
        assert!(v.new_post(&"t".repeat(101), "body").is_err());
        assert!(v.new_post("title", &"c".repeat(5001)).is_err());
        assert!(v.post_patch(None, None).is_ok());
        assert!(v.post_patch(Some(&"t".repeat(101)), None).is_err());
    }
}
