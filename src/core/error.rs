use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// A numeric argument outside the domain of the operation.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// A simulation config or driver flag that fails validation.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to serialize result: {message}")]
    Serialization { message: String },
}

impl SimError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
