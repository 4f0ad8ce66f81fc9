use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlipError {
    #[error("Stake has to be a positive amount of credits, got \"{0}\"")]
    InvalidStake(String),
}

/// Why a submission did not settle. Every variant leaves the slip untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Couldn't reach the settlement service: {0}")]
    Transport(String),
    #[error("Coupon was rejected: {0}")]
    Validation(String),
    #[error("Unexpected settlement failure: {0}")]
    Unknown(String),
}
impl SubmitError {
    /// Message shown to the user. Validation failures carry the endpoint's own
    /// wording, the other two get a generic one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => {
                "Couldn't reach the server. Check your connection and try again.".into()
            }
            Self::Validation(message) => message.clone(),
            Self::Unknown(_) => "Something went wrong while placing your coupon.".into(),
        }
    }
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}
