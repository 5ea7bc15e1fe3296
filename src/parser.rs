//! PDF object parser.
//!
//! This module combines tokens from the lexer into complete objects (arrays,
//! dictionaries, indirect references, etc.). It does NOT consume stream
//! bodies: a dictionary parse stops at `>>`, even when followed by the
//! `stream` keyword. Locating and extracting a stream's payload bytes needs
//! file-offset bookkeeping (`/Length` may be wrong, `endstream` may be
//! misplaced) that belongs to the buffered object reader, which calls back
//! into `parse_object` only for the dictionary itself.
//!
//! # Architecture
//!
//! Recursive descent: read a token, dispatch on its type, recurse into
//! `parse_array`/`parse_dictionary` for composites.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// PDF literal strings (enclosed in parentheses) support escape sequences
/// per ISO 32000-1:2008, Section 7.3.4.2:
///
/// - `\n` → Line Feed (0x0A)
/// - `\r` → Carriage Return (0x0D)
/// - `\t` → Horizontal Tab (0x09)
/// - `\b` → Backspace (0x08)
/// - `\f` → Form Feed (0x0C)
/// - `\(` → Left Parenthesis
/// - `\)` → Right Parenthesis
/// - `\\` → Backslash
/// - `\ddd` → Character with octal code (1-3 digits)
/// - `\<newline>` → Line continuation (ignored)
///
/// # Examples
///
/// ```
/// # use pdf_graph::parser::decode_literal_string_escapes;
/// let input = b"Section \\247 71.01";
/// let decoded = decode_literal_string_escapes(input);
/// assert_eq!(decoded, b"Section \xa7 71.01"); // \247 = § (section sign)
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            match raw[i + 1] {
                b'n' => {
                    result.push(b'\n');
                    i += 2;
                },
                b'r' => {
                    result.push(b'\r');
                    i += 2;
                },
                b't' => {
                    result.push(b'\t');
                    i += 2;
                },
                b'b' => {
                    result.push(8);
                    i += 2;
                },
                b'f' => {
                    result.push(12);
                    i += 2;
                },
                b'(' => {
                    result.push(b'(');
                    i += 2;
                },
                b')' => {
                    result.push(b')');
                    i += 2;
                },
                b'\\' => {
                    result.push(b'\\');
                    i += 2;
                },
                b'\n' => {
                    i += 2;
                },
                b'\r' => {
                    i += 2;
                    if i < raw.len() && raw[i] == b'\n' {
                        i += 1;
                    }
                },
                c if c.is_ascii_digit() && c < b'8' => {
                    let start = i + 1;
                    let mut octal_value = 0u32;
                    let mut octal_len = 0;

                    for j in 0..3 {
                        if start + j < raw.len() {
                            let digit = raw[start + j];
                            if (b'0'..b'8').contains(&digit) {
                                octal_value = octal_value * 8 + (digit - b'0') as u32;
                                octal_len += 1;
                            } else {
                                break;
                            }
                        } else {
                            break;
                        }
                    }

                    if octal_len > 0 {
                        result.push((octal_value & 0xFF) as u8);
                        i += 1 + octal_len;
                    } else {
                        result.push(b'\\');
                        i += 1;
                    }
                },
                _ => {
                    result.push(b'\\');
                    i += 1;
                },
            }
        } else {
            result.push(raw[i]);
            i += 1;
        }
    }

    result
}

/// Parse a PDF object from input bytes.
///
/// Handles primitives (null, boolean, integer, real, string, name),
/// composites (array, dictionary), and indirect references (`10 0 R`).
/// Stops at the closing `>>` of a dictionary — it never looks for a
/// trailing `stream` keyword, so this function alone cannot fully consume
/// a stream object. See `crate::reader` for that.
///
/// # Errors
///
/// Returns `Err` if the input is not a valid PDF object, a nested structure
/// is malformed beyond what lenient recovery tolerates, or a hex string
/// contains invalid hex digits.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),

        Token::Integer(i) => {
            // Could be a plain integer or the start of "obj_num gen R".
            // Both numbers must be non-negative - "-5 0 R" is the integer
            // -5 followed by a separate "0 R", not a reference.
            if let Ok((input2, Token::Integer(gen))) = token(input) {
                if let Ok((input3, Token::R)) = token(input2) {
                    if (0..=i64::from(u32::MAX)).contains(&i) && (0..=i64::from(u16::MAX)).contains(&gen) {
                        return Ok((input3, Object::IndirectRef(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },

        Token::Real(r) => Ok((input, Object::Real(r))),

        Token::LiteralString(bytes) => {
            let decoded = decode_literal_string_escapes(bytes);
            Ok((input, Object::StringLiteral(decoded)))
        },

        Token::HexString(hex_bytes) => match decode_hex(hex_bytes) {
            Ok(decoded) => Ok((input, Object::HexLiteral(decoded))),
            Err(_) => {
                Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail)))
            },
        },

        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::ArrayStart => parse_array(input),

        Token::DictStart => parse_dictionary(input),

        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Parse a PDF array: `[ obj1 obj2 ... objN ]`.
///
/// Empty arrays (`[]`) are valid. An unclosed array at EOF returns what was
/// parsed so far rather than failing, matching the reader's general
/// tolerance for truncated input.
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        let token_result = token(remaining);

        match token_result {
            Ok((inp, tok)) => {
                if tok == Token::ArrayEnd {
                    return Ok((inp, Object::Array(objects)));
                }

                match parse_object(remaining) {
                    Ok((inp, obj)) => {
                        objects.push(obj);
                        remaining = inp;
                    },
                    Err(e) => {
                        if remaining.is_empty() {
                            return Ok((remaining, Object::Array(objects)));
                        }
                        return Err(e);
                    },
                }
            },
            Err(nom::Err::Incomplete(_)) | Err(nom::Err::Error(_)) if remaining.is_empty() => {
                return Ok((remaining, Object::Array(objects)));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Parse a PDF dictionary: `<< /Key1 value1 /Key2 value2 ... >>`.
///
/// Stops at `>>`; does not look ahead for a following `stream` keyword.
/// Keys must be names. An unclosed dictionary at EOF returns what was
/// parsed so far.
fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Object> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let token_result = token(remaining);

        match token_result {
            Ok((inp, tok)) => {
                if tok == Token::DictEnd {
                    return Ok((inp, Object::Dict(dict)));
                }

                match tok {
                    Token::Name(key) => match parse_object(inp) {
                        Ok((inp, value)) => {
                            dict.update(key, value);
                            remaining = inp;
                        },
                        Err(e) => {
                            if inp.is_empty() {
                                return Ok((inp, Object::Dict(dict)));
                            }
                            return Err(e);
                        },
                    },
                    _ => {
                        if remaining.is_empty() {
                            return Ok((remaining, Object::Dict(dict)));
                        }
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            nom::error::ErrorKind::Tag,
                        )));
                    },
                }
            },
            Err(nom::Err::Incomplete(_)) | Err(nom::Err::Error(_)) if remaining.is_empty() => {
                return Ok((remaining, Object::Dict(dict)));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Decode a hex string to bytes.
///
/// Whitespace is ignored; an odd number of hex digits pads the last digit
/// with `0` per ISO 32000-1:2008, Section 7.3.4.3.
///
/// # Errors
///
/// Returns `Err` if a character outside hex digits/whitespace is found.
///
/// ```
/// use pdf_graph::parser::decode_hex;
///
/// let decoded = decode_hex(b"48656C6C6F").unwrap();
/// assert_eq!(decoded, b"Hello");
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let hex_str: Vec<u8> =
        hex_bytes.iter().filter(|&&c| !c.is_ascii_whitespace()).copied().collect();

    if hex_str.is_empty() {
        return Ok(Vec::new());
    }

    let mut result = Vec::with_capacity(hex_str.len() / 2 + 1);

    for chunk in hex_str.chunks(2) {
        match chunk.len() {
            2 => {
                let hex = std::str::from_utf8(chunk).map_err(|e| Error::ParseError {
                    offset: 0,
                    reason: format!("Invalid UTF-8 in hex string: {}", e),
                })?;
                let byte = u8::from_str_radix(hex, 16).map_err(|e| Error::ParseError {
                    offset: 0,
                    reason: format!("Invalid hex digit: {}", e),
                })?;
                result.push(byte);
            },
            1 => {
                let hex = std::str::from_utf8(chunk).map_err(|e| Error::ParseError {
                    offset: 0,
                    reason: format!("Invalid UTF-8 in hex string: {}", e),
                })?;
                let byte =
                    u8::from_str_radix(&format!("{}0", hex), 16).map_err(|e| Error::ParseError {
                        offset: 0,
                        reason: format!("Invalid hex digit: {}", e),
                    })?;
                result.push(byte);
            },
            _ => unreachable!("chunks(2) never yields more than 2 elements"),
        }
    }

    Ok(result)
}
