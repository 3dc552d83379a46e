//! # courier-mime
//!
//! MIME generation for outgoing notification email.
//!
//! ## Features
//!
//! - **Message descriptor**: [`EmailMessage`] with fail-fast validation
//! - **Message building**: `multipart/mixed` with an HTML part and an optional
//!   file attachment
//! - **Line wrapping**: streaming 76-octet CRLF wrapping for base64 bodies
//! - **Content types**: attachment types guessed from file extensions
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_mime::{Attachment, EmailMessage, MessageBuilder};
//!
//! let message = EmailMessage::new("Invoice", "<p>See attached.</p>", "billing@example.com", "customer@example.org")?
//!     .with_cc("accounts@example.org")
//!     .with_attachment(Attachment::new("/var/invoices/42.pdf", "invoice-42.pdf"));
//!
//! let bytes = MessageBuilder::new(&message).build()?;
//! // hand `bytes` to the SMTP DATA phase
//! ```
//!
//! ## Message Layout
//!
//! ```text
//! MIME-Version / Content-Type / Content-Transfer-Encoding / Date
//! Subject / From / To / Cc / Reply-To / extra headers
//!
//! --boundary
//! Content-Type: text/html; charset=UTF-8
//!
//! <html body>
//! --boundary
//! Content-Type: <guessed>; Content-Transfer-Encoding: base64
//! Content-Disposition: attachment; filename="..."
//!
//! <base64, 76 columns>
//! --boundary--
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;
mod message;
mod wrap;

pub mod encoding;

pub use builder::MessageBuilder;
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Attachment, EmailMessage};
pub use wrap::{LineWrapper, MAX_LINE_LENGTH};
