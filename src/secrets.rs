//! # Secret Resolution
//!
//! Turns a configured key value into the effective value passed to key
//! creation, decrypting KMS-encrypted literals on the way.
//!
//! A decryption failure propagates; the ciphertext is never silently used as
//! the key value.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::info;

use crate::constants::ADD_LOG_PREFIX;
use crate::provider::Decryptor;
use crate::KeyValue;

/// Resolve the effective key value for one declared key.
///
/// `Generated` resolves to `None` (the remote service picks a value),
/// `Literal` passes through, and `Encrypted` is base64-decoded and decrypted
/// with keys in its own region (falling back to the deploy region).
pub async fn resolve_key_value(
    value: &KeyValue,
    default_region: &str,
    decryptor: &dyn Decryptor,
) -> Result<Option<String>> {
    match value {
        KeyValue::Generated => Ok(None),
        KeyValue::Literal(text) => Ok(Some(text.clone())),
        KeyValue::Encrypted {
            encrypted,
            kms_key_region,
        } => {
            let region = kms_key_region.as_deref().unwrap_or(default_region);
            let plaintext = decrypt_value(encrypted, region, decryptor).await?;
            Ok(Some(plaintext))
        }
    }
}

async fn decrypt_value(
    ciphertext_b64: &str,
    region: &str,
    decryptor: &dyn Decryptor,
) -> Result<String> {
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .context("Configured encrypted value is not valid base64")?;

    let plaintext = decryptor
        .decrypt(&ciphertext, region)
        .await
        .with_context(|| {
            format!(
                "{ADD_LOG_PREFIX}: Value \"{}...\" can not be decrypted with keys in {region}",
                truncated(ciphertext_b64)
            )
        })?;

    let plaintext = String::from_utf8(plaintext)
        .context("Decrypted key value is not valid UTF-8")?;

    info!(
        "{ADD_LOG_PREFIX}: Successfully decrypted value of \"{}...\" using KMS key in {region}",
        truncated(ciphertext_b64)
    );
    Ok(plaintext)
}

/// First few characters of the ciphertext, for log messages.
fn truncated(ciphertext_b64: &str) -> &str {
    let end = ciphertext_b64
        .char_indices()
        .nth(10)
        .map_or(ciphertext_b64.len(), |(idx, _)| idx);
    &ciphertext_b64[..end]
}
