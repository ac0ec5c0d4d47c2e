// Gmail module
// OAuth installed-app flow plus the REST client for listing and fetching mail

pub mod auth;
pub mod client;

pub use auth::GmailAuthenticator;
pub use client::{FetchedEmail, GmailClient, build_query};

/// The only scope this tool ever asks for.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
