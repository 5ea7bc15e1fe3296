//! End-to-end AES-128 (R=4, V=4) load: owner password set, user password
//! empty. Authenticates with the empty password, then checks that both an
//! encrypted string and an encrypted stream resolve to their plaintext.
//!
//! The `/O`, `/U`, and ciphertext fields below were derived outside this
//! crate from known passwords and plaintexts using the same algorithms this
//! crate implements (Algorithm 2/3/5 key derivation, AES-128-CBC/PKCS#7),
//! so this is a self-consistent fixture rather than a third-party sample
//! file.

use pdf_graph::config::Configuration;
use pdf_graph::context::Context;
use std::io::Cursor;

const FILE_ID_HEX: &str = "66696c65696431323334353637383930";
const O_HEX: &str = "5a0c0b55deda723d6a1a77ca020e0bf91273d02733c4748c700d9eb9a6d68a09";
const U_HEX: &str = "40c04357a684465452a82522c492aa0100000000000000000000000000000000";
// IV (16 bytes) followed by AES-128-CBC/PKCS#7 ciphertext of "Secret Title",
// under the per-object key for (obj 4, gen 0).
const TITLE_FIELD_HEX: &str = "000102030405060708090a0b0c0d0e0fae73967a841e89f6c8c176e82982738e";
// Same, for "stream contents for scenario five" under (obj 5, gen 0).
const STREAM_FIELD_HEX: &str =
    "101112131415161718191a1b1c1d1e1f7494acb662d813146faeb335bd331ca64c7367bd8b9e28838fcc9014bb7449b30b108e74a384f9746606fed822f38aac";

fn build_fixture() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.6\n");

    let obj1_offset = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    let obj2_offset = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Count 1 /Kids [3 0 R] >>\nendobj\n");

    let obj3_offset = out.len();
    out.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n");

    let obj4_offset = out.len();
    out.extend_from_slice(format!("4 0 obj\n<< /Title <{TITLE_FIELD_HEX}> >>\nendobj\n").as_bytes());

    let obj5_offset = out.len();
    let stream_bytes = hex_decode(STREAM_FIELD_HEX);
    out.extend_from_slice(format!("5 0 obj\n<< /Length {} >>\nstream\n", stream_bytes.len()).as_bytes());
    out.extend_from_slice(&stream_bytes);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let obj6_offset = out.len();
    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Filter /Standard /V 4 /R 4 /Length 128 /P -4 /EncryptMetadata true\n\
             /O <{O_HEX}> /U <{U_HEX}>\n\
             /CF << /StdCF << /CFM /AESV2 /AuthEvent /DocOpen /Length 16 >> >>\n\
             /StmF /StdCF /StrF /StdCF >>\nendobj\n"
        )
        .as_bytes(),
    );

    let xref_offset = out.len();
    out.extend_from_slice(b"xref\n0 7\n");
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in [obj1_offset, obj2_offset, obj3_offset, obj4_offset, obj5_offset, obj6_offset] {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size 7 /Root 1 0 R /Info 4 0 R /Encrypt 6 0 R /ID [<{FILE_ID_HEX}> <{FILE_ID_HEX}>] >>\n"
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());

    out
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
}

#[test]
fn scenario5_aes128_r4_v4_empty_user_password() {
    let pdf = build_fixture();
    let mut ctx = Context::load(Cursor::new(pdf.clone()), pdf.len() as u64, Configuration::relaxed())
        .expect("empty user password should authenticate against this fixture's /U");

    assert!(ctx.is_encrypted());

    let info = ctx.resolve(4).unwrap();
    let title = info.as_dict().unwrap().find("Title").unwrap();
    assert_eq!(title.as_string_bytes(), Some(&b"Secret Title"[..]));

    let plaintext_stream = b"stream contents for scenario five";
    let decoded = ctx.resolve_stream_content(5).unwrap().expect("no filters, so this can't soft-fail");
    assert_eq!(decoded.len(), plaintext_stream.len());
    assert_eq!(&decoded[..], &plaintext_stream[..]);
}

#[test]
fn scenario5_wrong_password_is_irrelevant_when_user_password_is_empty() {
    // The fixture's user password is empty, so it authenticates regardless
    // of what owner password the caller supplies (the owner password below
    // doesn't even match the fixture's real owner password "ownerpw").
    let pdf = build_fixture();
    let config = Configuration::relaxed().with_owner_password(b"not-the-real-owner-password".to_vec());
    let ctx = Context::load(Cursor::new(pdf.clone()), pdf.len() as u64, config).unwrap();
    assert!(ctx.is_encrypted());
}
