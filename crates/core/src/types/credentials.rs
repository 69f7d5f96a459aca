//! Email/password pair submitted by the sign-in and sign-up forms.

use secrecy::{ExposeSecret, SecretString};

use super::email::Email;
use super::form::ValidationErrors;

/// Credentials for password authentication.
///
/// The password is only checked for presence; strength rules belong to the
/// auth backend, which rejects weak passwords itself.
#[derive(Clone)]
pub struct Credentials {
    email: Email,
    password: SecretString,
}

impl Credentials {
    pub const EMAIL: &'static str = "email";
    pub const PASSWORD: &'static str = "password";

    /// Build credentials from raw form input.
    ///
    /// # Errors
    ///
    /// Returns per-field errors when the email is malformed or the password
    /// is empty.
    pub fn new(email: &str, password: &str) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let email = Email::parse(email)
            .map_err(|err| errors.add(Self::EMAIL, err.to_string()))
            .ok();
        if password.is_empty() {
            errors.add(Self::PASSWORD, "password is required");
        }

        match email {
            Some(email) => errors.into_result(|| Self {
                email,
                password: SecretString::from(password.to_owned()),
            }),
            None => Err(errors),
        }
    }

    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
