//! Shared Access Signature building blocks.
//!
//! The SDK never touches key material: it produces the document to sign,
//! the caller runs HMAC-SHA256 with its (possibly hardware-held) key and
//! base64-encodes the result, and the password builder assembles the final
//! `SharedAccessSignature` string from the pieces.

use azlite_core::error::Result;
use azlite_core::span::SpanWriter;

/// Writes the signing document `<url-enc(scope)>\n<expiry>` into `dst` and
/// returns its length. `scope` is the resource URI being granted (for an
/// IoT hub device: `<hub>/devices/<device>`); `expiry_epoch_secs` is in
/// Unix seconds.
pub fn signature_document(
    dst: &mut [u8],
    scope: &[u8],
    expiry_epoch_secs: u64,
) -> Result<usize> {
    let mut writer = SpanWriter::new(dst);
    writer.url_encode(scope)?;
    writer.push_byte(b'\n')?;
    append_u64(&mut writer, expiry_epoch_secs)?;
    Ok(writer.len())
}

/// Writes the MQTT password
/// `SharedAccessSignature sr=<url-enc(scope)>&sig=<url-enc(signature)>&se=<expiry>[&skn=<keyName>]`
/// into `dst` and returns its length. `signature_base64` is the
/// base64-encoded HMAC-SHA256 of the signing document.
pub fn password(
    dst: &mut [u8],
    scope: &[u8],
    signature_base64: &[u8],
    expiry_epoch_secs: u64,
    key_name: Option<&[u8]>,
) -> Result<usize> {
    let mut writer = SpanWriter::new(dst);
    writer.copy_from(b"SharedAccessSignature sr=")?;
    writer.url_encode(scope)?;
    writer.copy_from(b"&sig=")?;
    writer.url_encode(signature_base64)?;
    writer.copy_from(b"&se=")?;
    append_u64(&mut writer, expiry_epoch_secs)?;
    if let Some(key_name) = key_name {
        writer.copy_from(b"&skn=")?;
        writer.copy_from(key_name)?;
    }
    Ok(writer.len())
}

fn append_u64(writer: &mut SpanWriter<'_>, value: u64) -> Result<()> {
    let mut scratch = [0u8; 20];
    let mut cursor = scratch.len();
    let mut v = value;
    loop {
        cursor -= 1;
        scratch[cursor] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    writer.copy_from(&scratch[cursor..])
}
