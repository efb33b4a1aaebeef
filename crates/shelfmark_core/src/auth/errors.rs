/// Error type for everything the identity provider can reject or break.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider rejected the email/password pair.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The provider refused to create the account, e.g. duplicate email or a
    /// password that violates its policy. Carries the provider's reason.
    #[error("sign-up rejected: {0}")]
    SignupRejected(String),

    /// The HTTP round-trip to the provider failed, originating from
    /// `reqwest`.
    #[error("identity provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    /// The provider answered with a status this client does not expect.
    #[error("unexpected identity provider response (status {status}): {message}")]
    Unexpected { status: u16, message: String },

    /// The provider's response body could not be decoded, originating from
    /// `serde_json`.
    #[error("failed to decode identity provider response: {0}")]
    Decode(#[from] serde_json::Error),
}
