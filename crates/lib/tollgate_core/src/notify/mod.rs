//! Outbound notifications.
//!
//! The token service only sends one kind of message: a warning that a
//! refresh token was presented from a different address than it was issued
//! to. Delivery failures never abort the refresh.

pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

/// Subject line for the address-mismatch warning.
pub const SUBJECT_ANOTHER_IP: &str = "Refresh from another IP address";

/// Notification errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message error: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Delivery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Mail delivery seam.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_mail(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError>;
}

/// Body of the address-mismatch warning.
pub fn ip_mismatch_body(user_id: &str, issued_ip: &str, current_ip: &str) -> String {
    format!(
        "A refresh token for user {user_id} issued to {issued_ip} was used from {current_ip}.\n\
         If this was not you, sign in again and review your account."
    )
}
