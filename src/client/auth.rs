//! CLOB authentication: typed-data L1 signature to derive L2 credentials,
//! then HMAC-SHA256 request signing.
//!
//! The whole exchange-auth state lives in one [`AuthSession`] value owned by
//! the live executor and established on first use. There is no process-wide
//! credential singleton.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::error::{BotError, Result};

/// L2 API credentials derived from the wallet signature.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    /// Base64-encoded HMAC secret.
    pub secret: String,
    pub passphrase: String,
}

/// An authenticated session against the CLOB.
#[derive(Debug, Clone)]
pub struct AuthSession {
    address: String,
    credentials: ApiCredentials,
}

/// One signed header set for an authenticated request.
pub struct SignedHeaders {
    pub address: String,
    pub api_key: String,
    pub signature: String,
    pub timestamp: String,
    pub passphrase: String,
}

#[derive(Debug, Deserialize)]
struct DeriveKeyResponse {
    #[serde(rename = "apiKey")]
    api_key: String,
    secret: String,
    passphrase: String,
}

impl AuthSession {
    /// Derive L2 API credentials by signing the ClobAuth typed-data message
    /// and presenting it to the derive endpoint.
    pub async fn establish(
        http: &Client,
        clob_url: &str,
        private_key: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| BotError::Auth(format!("invalid private key: {}", e)))?;
        let wallet = wallet.with_chain_id(chain_id);
        let address = format!("{:#x}", wallet.address());

        let timestamp = Utc::now().timestamp();
        let nonce = 0u64;
        let signature = l1_auth_signature(&wallet, &address, timestamp, nonce, chain_id).await?;

        let url = format!("{}/auth/derive-api-key", clob_url.trim_end_matches('/'));
        let resp = http
            .get(&url)
            .header("POLY_ADDRESS", &address)
            .header("POLY_SIGNATURE", &signature)
            .header("POLY_TIMESTAMP", timestamp.to_string())
            .header("POLY_NONCE", nonce.to_string())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BotError::Auth(format!(
                "derive-api-key returned {}: {}",
                status, body
            )));
        }

        let creds: DeriveKeyResponse = serde_json::from_str(&body)
            .map_err(|e| BotError::Auth(format!("bad derive-api-key response: {}", e)))?;

        Ok(Self {
            address,
            credentials: ApiCredentials {
                api_key: creds.api_key,
                secret: creds.secret,
                passphrase: creds.passphrase,
            },
        })
    }

    /// Session constructed from known credentials. Used by tests and by
    /// operators who provision keys out of band.
    pub fn from_credentials(address: String, credentials: ApiCredentials) -> Self {
        Self { address, credentials }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign one request. The HMAC message is `timestamp + METHOD + path +
    /// body` keyed with the base64-decoded secret.
    pub fn sign_request(&self, method: &str, path: &str, body: &str) -> Result<SignedHeaders> {
        let timestamp = Utc::now().timestamp();
        let signature = l2_signature(&self.credentials.secret, timestamp, method, path, body)?;
        Ok(SignedHeaders {
            address: self.address.clone(),
            api_key: self.credentials.api_key.clone(),
            signature,
            timestamp: timestamp.to_string(),
            passphrase: self.credentials.passphrase.clone(),
        })
    }
}

/// EIP-712 ClobAuth attestation signature.
async fn l1_auth_signature(
    wallet: &LocalWallet,
    address: &str,
    timestamp: i64,
    nonce: u64,
    chain_id: u64,
) -> Result<String> {
    let typed_data: TypedData = serde_json::from_value(json!({
        "primaryType": "ClobAuth",
        "domain": {
            "name": "ClobAuthDomain",
            "version": "1",
            "chainId": chain_id
        },
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"}
            ],
            "ClobAuth": [
                {"name": "address", "type": "address"},
                {"name": "timestamp", "type": "string"},
                {"name": "nonce", "type": "uint256"},
                {"name": "message", "type": "string"}
            ]
        },
        "message": {
            "address": address,
            "timestamp": timestamp.to_string(),
            "nonce": nonce,
            "message": "This message attests that I control the given wallet"
        }
    }))
    .map_err(|e| BotError::Auth(format!("build ClobAuth typed data: {}", e)))?;

    let signature = wallet
        .sign_typed_data(&typed_data)
        .await
        .map_err(|e| BotError::Auth(format!("typed-data signing failed: {}", e)))?;

    Ok(format!("0x{}", hex::encode(signature.to_vec())))
}

/// HMAC-SHA256 over `timestamp + METHOD + path + body`, base64 in and out.
fn l2_signature(secret: &str, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
    let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);
    let key = BASE64
        .decode(secret)
        .map_err(|e| BotError::Auth(format!("secret is not valid base64: {}", e)))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| BotError::Auth(format!("hmac key error: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
