use crate::errors::AihlError;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    /// Checked before any network traffic is attempted.
    pub fn validate(&self) -> Result<(), AihlError> {
        if self.email.is_empty() {
            return Err(AihlError::Credential { field: "email" });
        }
        if self.password.is_empty() {
            return Err(AihlError::Credential { field: "password" });
        }
        Ok(())
    }
}
