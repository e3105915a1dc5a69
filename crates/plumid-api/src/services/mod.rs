//! 서비스 계층.

pub mod email;

pub use email::{
    password_reset_email, verification_email, EmailError, EmailMessage, EmailSender,
    LogEmailSender,
};
