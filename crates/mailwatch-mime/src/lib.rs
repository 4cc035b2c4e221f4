//! # mailwatch-mime
//!
//! MIME message parsing library for mailbox monitoring.
//!
//! ## Features
//!
//! - **Message parsing**: Parse raw RFC 822 messages with multipart support
//! - **Leaf flattening**: Nested multiparts are walked into a flat part list
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Charsets**: Text decoded per the declared charset, lossy on bad bytes
//! - **HTML fallback**: Tag stripping for messages without a plain body
//!
//! ## Quick Start
//!
//! ### Parsing fetched messages
//!
//! ```ignore
//! use mailwatch_mime::Message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: =?utf-8?Q?Invoice_=2345?=\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = Message::parse(raw)?;
//! println!("Subject: {}", message.headers.decoded("subject").unwrap_or_default());
//! println!("Body: {}", message.plain_text()?.unwrap_or_default());
//! ```
//!
//! ### Picking a body
//!
//! ```ignore
//! use mailwatch_mime::{html, Message};
//!
//! let message = Message::parse(raw)?;
//! let body = match message.plain_text()? {
//!     Some(text) => text,
//!     None => message
//!         .html_text()?
//!         .map(|h| html::strip_tags(&h))
//!         .unwrap_or_default(),
//! };
//! ```
//!
//! ### Decoding helpers
//!
//! ```ignore
//! use mailwatch_mime::encoding::{decode_base64, decode_encoded_words, decode_text};
//!
//! let bytes = decode_base64("SGVsbG8sIFdvcmxkIQ==")?;
//! let subject = decode_encoded_words("=?utf-8?B?SMOpbGxv?=");
//! let text = decode_text(&bytes, Some("iso-8859-1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;
pub mod html;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
