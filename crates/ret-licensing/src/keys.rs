//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Issuer key pair management and the product's embedded public key.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{LicenseError, LicenseResult};

/// File name of the base64 private seed inside the key directory.
pub const PRIVATE_KEY_FILE: &str = "license_signing.key";
/// File name of the base64 public key inside the key directory.
pub const PUBLIC_KEY_FILE: &str = "license_signing.pub";

/// Production verifying key shipped with the product.
const DEFAULT_PUBLIC_KEY: [u8; 32] = [
    241, 216, 55, 211, 240, 91, 137, 102, 117, 181, 162, 231, 218, 81, 94, 2, 199, 42, 135, 51,
    93, 180, 22, 31, 98, 166, 128, 158, 117, 103, 161, 168,
];

/// Verifying key compiled into the product.
///
/// Vendor builds can replace it by exporting `RET_LICENSE_PUBLIC_KEY`
/// (base64) at compile time. Rotating it invalidates every issued license.
#[must_use]
pub fn embedded_public_key() -> [u8; 32] {
    option_env!("RET_LICENSE_PUBLIC_KEY")
        .and_then(|encoded| decode_public_key(encoded).ok())
        .unwrap_or(DEFAULT_PUBLIC_KEY)
}

/// Decode a base64 Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> LicenseResult<[u8; 32]> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| LicenseError::Key(format!("public key must be base64 encoded: {err}")))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| LicenseError::Key(format!("public key must be 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&key)
        .map_err(|err| LicenseError::Key(format!("invalid public key material: {err}")))?;
    Ok(key)
}

/// Issuer signing key together with where it lives on disk.
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    private_path: PathBuf,
    public_path: PathBuf,
}

impl KeyPair {
    /// Private signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Raw public key bytes, as embedded into the product.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Base64 public key, as stored in the `.pub` file.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.public_key_bytes())
    }

    /// SHA-256 fingerprint of the public key for logs and audits.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.public_key_bytes());
        hex::encode(hasher.finalize())
    }

    /// Location of the private key file.
    #[must_use]
    pub fn private_path(&self) -> &Path {
        &self.private_path
    }

    /// Location of the public key file.
    #[must_use]
    pub fn public_path(&self) -> &Path {
        &self.public_path
    }
}

/// Make sure a key pair exists in `dir`, generating one on first use.
///
/// An existing private key is never replaced. A missing public half is
/// rederived from the private key; a public key without its private key is
/// an error because generating a new pair would silently rotate the key.
pub fn ensure_key_pair(dir: impl AsRef<Path>) -> LicenseResult<KeyPair> {
    let dir = dir.as_ref();
    let private_path = dir.join(PRIVATE_KEY_FILE);
    let public_path = dir.join(PUBLIC_KEY_FILE);

    let signing_key = if private_path.exists() {
        debug!(path = %private_path.display(), "loading existing signing key");
        read_signing_key(&private_path)?
    } else {
        if public_path.exists() {
            return Err(LicenseError::Key(format!(
                "public key {} exists without its private key; refusing to generate a new pair",
                public_path.display()
            )));
        }
        fs::create_dir_all(dir).map_err(|err| LicenseError::io(dir, err))?;
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        write_private_key(&private_path, &general_purpose::STANDARD.encode(seed))?;
        info!(path = %private_path.display(), "generated new license signing key");
        signing_key
    };

    let pair = KeyPair {
        signing_key,
        private_path,
        public_path,
    };

    if !pair.public_path.exists() {
        fs::write(&pair.public_path, format!("{}\n", pair.public_key_base64()))
            .map_err(|err| LicenseError::io(&pair.public_path, err))?;
        info!(path = %pair.public_path.display(), fingerprint = %pair.fingerprint(), "wrote license public key");
    }

    Ok(pair)
}

/// Load the signing key from `dir` without generating anything.
pub fn load_signing_key(dir: impl AsRef<Path>) -> LicenseResult<SigningKey> {
    read_signing_key(&dir.as_ref().join(PRIVATE_KEY_FILE))
}

/// Read a base64 public key file, such as the `.pub` half written by
/// [`ensure_key_pair`].
pub fn read_public_key(path: impl AsRef<Path>) -> LicenseResult<[u8; 32]> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| LicenseError::io(path, err))?;
    decode_public_key(&raw)
}

fn read_signing_key(path: &Path) -> LicenseResult<SigningKey> {
    let raw = fs::read_to_string(path).map_err(|err| LicenseError::io(path, err))?;
    let bytes = general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|err| LicenseError::Key(format!("signing key must be base64 encoded: {err}")))?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| LicenseError::Key(format!("signing key must be 32 bytes, got {}", bytes.len())))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn write_private_key(path: &Path, contents: &str) -> LicenseResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|err| LicenseError::io(path, err))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .map_err(|err| LicenseError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_key_is_valid_material() {
        assert!(VerifyingKey::from_bytes(&embedded_public_key()).is_ok());
    }

    #[test]
    fn ensure_key_pair_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_key_pair(dir.path()).unwrap();
        let second = ensure_key_pair(dir.path()).unwrap();
        assert_eq!(first.public_key_bytes(), second.public_key_bytes());
        assert_eq!(
            read_public_key(first.public_path()).unwrap(),
            first.public_key_bytes()
        );
        assert_eq!(
            load_signing_key(dir.path()).unwrap().to_bytes(),
            first.signing_key().to_bytes()
        );
    }

    #[cfg(unix)]
    #[test]
    fn private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pair = ensure_key_pair(dir.path()).unwrap();
        let mode = fs::metadata(pair.private_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_public_half_is_rederived() {
        let dir = tempfile::tempdir().unwrap();
        let pair = ensure_key_pair(dir.path()).unwrap();
        fs::remove_file(pair.public_path()).unwrap();
        let again = ensure_key_pair(dir.path()).unwrap();
        assert_eq!(
            read_public_key(again.public_path()).unwrap(),
            pair.public_key_bytes()
        );
    }

    #[test]
    fn orphaned_public_key_refuses_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let pair = ensure_key_pair(dir.path()).unwrap();
        fs::remove_file(pair.private_path()).unwrap();
        assert!(matches!(
            ensure_key_pair(dir.path()),
            Err(LicenseError::Key(_))
        ));
    }

    #[test]
    fn decode_public_key_rejects_wrong_length() {
        let short = general_purpose::STANDARD.encode([1u8; 16]);
        assert!(decode_public_key(&short).is_err());
        assert!(decode_public_key("%%%").is_err());
    }
}
