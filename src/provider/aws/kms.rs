//! # AWS KMS Client
//!
//! [`Decryptor`] implementation over AWS KMS.
//!
//! The decryption region may differ per key from the deploy region, so a
//! region-scoped client is built per call rather than held for the run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;

use crate::provider::Decryptor;

/// AWS KMS implementation of [`Decryptor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsKms;

impl AwsKms {
    pub fn new() -> Self {
        Self
    }

    async fn client_for(region: &str) -> KmsClient {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        KmsClient::new(&sdk_config)
    }
}

#[async_trait]
impl Decryptor for AwsKms {
    async fn decrypt(&self, ciphertext: &[u8], region: &str) -> Result<Vec<u8>> {
        let client = Self::client_for(region).await;

        let response = client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .with_context(|| format!("KMS decryption failed in region {region}"))?;

        let plaintext = response
            .plaintext()
            .context("KMS decryption response carried no plaintext")?;
        Ok(plaintext.as_ref().to_vec())
    }
}
