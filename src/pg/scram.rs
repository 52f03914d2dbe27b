//! SCRAM-SHA-256 client exchange (RFC 5802, RFC 7677) used during startup.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const MECHANISM: &str = "SCRAM-SHA-256";

/// SCRAM exchange failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScramError {
    #[error("server message is not valid UTF-8")]
    InvalidServerMessage,
    #[error("invalid salt encoding")]
    InvalidSalt,
    #[error("invalid iteration count")]
    InvalidIterations,
    #[error("server message lacks attribute {0:?}")]
    MissingAttribute(char),
    #[error("server nonce does not extend the client nonce")]
    NonceMismatch,
    #[error("invalid server signature")]
    InvalidServerSignature,
    #[error("server signature verification failed")]
    SignatureMismatch,
    #[error("server final message received before server first message")]
    OutOfOrder,
    #[error("key derivation failed")]
    KeyDerivation,
}

/// Client side of one SCRAM-SHA-256 exchange.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    /// Set once the server's first message has been processed.
    verifier: Option<Verifier>,
}

struct Verifier {
    salted_password: [u8; 32],
    auth_message: String,
}

impl ScramClient {
    pub fn new(username: &str, password: &str) -> Self {
        let nonce_bytes: [u8; 18] = rand::thread_rng().gen();
        Self::with_nonce(username, password, BASE64.encode(nonce_bytes))
    }

    fn with_nonce(username: &str, password: &str, client_nonce: String) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            verifier: None,
        }
    }

    fn client_first_bare(&self) -> String {
        // The server takes the user name from the startup packet.
        format!("n={},r={}", self.username, self.client_nonce)
    }

    /// `n,,n=<user>,r=<nonce>`
    pub fn client_first_message(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare()).into_bytes()
    }

    /// Consume `r=..,s=..,i=..` and produce the client-final-message.
    pub fn process_server_first(&mut self, server_msg: &[u8]) -> Result<Vec<u8>, ScramError> {
        let server_first =
            std::str::from_utf8(server_msg).map_err(|_| ScramError::InvalidServerMessage)?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(BASE64.decode(value).map_err(|_| ScramError::InvalidSalt)?);
            } else if let Some(value) = part.strip_prefix("i=") {
                let n = value
                    .parse::<u32>()
                    .map_err(|_| ScramError::InvalidIterations)?;
                iterations = Some(n);
            }
        }

        let nonce = nonce.ok_or(ScramError::MissingAttribute('r'))?;
        let salt = salt.ok_or(ScramError::MissingAttribute('s'))?;
        let iterations = iterations.ok_or(ScramError::MissingAttribute('i'))?;
        if iterations == 0 {
            return Err(ScramError::InvalidIterations);
        }
        if !nonce.starts_with(&self.client_nonce) {
            return Err(ScramError::NonceMismatch);
        }

        let salted_password = hi(&self.password, &salt, iterations)?;
        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = sha256(&client_key);

        // "biws" is base64("n,,"): no channel binding.
        let client_final_bare = format!("c=biws,r={}", nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_bare
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let proof = xor_bytes(&client_key, &client_signature);

        self.verifier = Some(Verifier {
            salted_password,
            auth_message,
        });

        Ok(format!("{},p={}", client_final_bare, BASE64.encode(proof)).into_bytes())
    }

    /// Check the server's `v=<signature>` message.
    pub fn verify_server_final(&self, server_msg: &[u8]) -> Result<(), ScramError> {
        let verifier = self.verifier.as_ref().ok_or(ScramError::OutOfOrder)?;
        let server_final =
            std::str::from_utf8(server_msg).map_err(|_| ScramError::InvalidServerMessage)?;

        let signature = server_final
            .strip_prefix("v=")
            .and_then(|v| BASE64.decode(v.trim_end_matches('\0')).ok())
            .ok_or(ScramError::InvalidServerSignature)?;

        let server_key = hmac_sha256(&verifier.salted_password, b"Server Key")?;
        let expected = hmac_sha256(&server_key, verifier.auth_message.as_bytes())?;
        if signature != expected {
            return Err(ScramError::SignatureMismatch);
        }
        Ok(())
    }
}

/// Hi(): PBKDF2 with HMAC-SHA-256.
fn hi(password: &str, salt: &[u8], iterations: u32) -> Result<[u8; 32], ScramError> {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut output)
        .map_err(|_| ScramError::KeyDerivation)?;
    Ok(output)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], ScramError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| ScramError::KeyDerivation)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn xor_bytes(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3 test vector.
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

    #[test]
    fn test_rfc7677_exchange() {
        let mut client = ScramClient::with_nonce("user", "pencil", CLIENT_NONCE.to_string());
        assert_eq!(
            client.client_first_message(),
            b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO".to_vec()
        );

        let client_final = client.process_server_first(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(client_final).unwrap(),
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        client
            .verify_server_final(b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
            .unwrap();
        assert_eq!(
            client.verify_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
            Err(ScramError::SignatureMismatch)
        );
    }

    #[test]
    fn test_rejects_foreign_nonce() {
        let mut client = ScramClient::with_nonce("user", "pencil", "abc".to_string());
        let err = client
            .process_server_first(b"r=xyz123,s=c2FsdA==,i=4096")
            .unwrap_err();
        assert_eq!(err, ScramError::NonceMismatch);
    }

    #[test]
    fn test_missing_attributes() {
        let mut client = ScramClient::with_nonce("user", "pencil", "abc".to_string());
        assert_eq!(
            client.process_server_first(b"r=abcdef,i=4096"),
            Err(ScramError::MissingAttribute('s'))
        );
        assert_eq!(client.verify_server_final(b"v=AA=="), Err(ScramError::OutOfOrder));
    }
}
