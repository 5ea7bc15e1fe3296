// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::wrong_self_convention)]
#![allow(clippy::explicit_counter_loop)]
#![allow(clippy::doc_overindented_list_items)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::redundant_guards)]
#![allow(clippy::regex_creation_in_loops)]
#![allow(clippy::manual_find)]
#![allow(clippy::match_like_matches_macro)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]
#![warn(missing_docs)]

//! # pdf_graph
//!
//! The PDF object graph engine: locating and parsing cross-reference
//! sections in a possibly-damaged file, materializing the graph of
//! indirect objects on demand, transparently decrypting strings and
//! streams under the Standard Security Handler, and presenting a uniform
//! in-memory model of typed PDF values for higher layers to build on.
//!
//! ## What's here
//!
//! - [`object`] — the tagged-variant `Object` model (integers, reals,
//!   names, strings, arrays, dictionaries, streams, indirect references)
//!   and the order-preserving `Dict`.
//! - [`lexer`] and [`parser`] — tokenize and parse one PDF object from a
//!   byte cursor.
//! - [`reader`] — frame one indirect object (`n g obj … endobj`,
//!   including a `stream … endstream` payload) from a byte source.
//! - [`xref`] and [`xref_reconstruction`] — locate and parse every
//!   cross-reference section (classic and stream forms), chain
//!   incremental updates through `Prev`, and fall back to a whole-file
//!   bypass scan for corrupt files.
//! - [`objstm`] — expand compressed objects out of object streams.
//! - [`encryption`] — the Standard Security Handler: password
//!   validation, file- and per-object key derivation, RC4 and AES-128-CBC.
//! - [`filters`] — the injected stream-filter contract and a default
//!   implementation (Flate, LZW, ASCIIHex, ASCII85).
//! - [`context`] — the owning aggregate: cross-reference table, trailer
//!   fields, encryption state, and the `resolve` entry point that turns
//!   an object number into a fully materialized, decrypted,
//!   filter-decoded [`object::Object`].
//! - [`config`] — runtime configuration (passwords, validation mode,
//!   reader conformance).
//!
//! What this crate does *not* do: page trees, content-stream rendering,
//! text extraction, form/annotation widgets, font subsetting, filter
//! *implementations* beyond the default service, or writing PDFs. Those
//! are external collaborators that consume the object graph this crate
//! exposes.
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_graph::config::Configuration;
//! use pdf_graph::context::Context;
//!
//! # fn main() -> pdf_graph::error::Result<()> {
//! let mut ctx = Context::open("document.pdf", Configuration::relaxed())?;
//! let root = ctx.root_ref().expect("trailer has no /Root");
//! let catalog = ctx.resolve_ref(root)?;
//! println!("{catalog:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or
//!   <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or
//!   <http://opensource.org/licenses/MIT>)
//!
//! at your option.

/// Runtime configuration: passwords, validation mode, reader conformance.
pub mod config;
/// The owning aggregate and indirect-object dereferencer.
pub mod context;
/// Encryption: the Standard Security Handler.
pub mod encryption;
/// Error taxonomy shared by every component.
pub mod error;
/// Injected stream-filter contract and a default implementation.
pub mod filters;
/// Tokenizer consumed by the parser.
pub mod lexer;
/// The uniform PDF value model.
pub mod object;
/// Object stream (`/Type /ObjStm`) expansion.
pub mod objstm;
/// Recursive-descent parser building on the lexer.
pub mod parser;
/// Frames one indirect object from a byte source.
pub mod reader;
/// Cross-reference table construction: classic and stream forms.
pub mod xref;
/// Whole-file bypass scan for files whose xref cannot be trusted.
pub mod xref_reconstruction;

pub use config::{Configuration, ReaderConformance, ValidationMode};
pub use context::Context;
pub use error::{Error, Result};
pub use object::{Dict, Object, ObjectRef};

/// Library version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
