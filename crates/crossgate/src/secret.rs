//! Signing-secret resolution.
//!
//! Precedence: (1) configured override when at least 32 bytes long;
//! (2) a stable local key file, generated on first use; then the base secret
//! is never used directly - the signing key is derived by HMAC of the
//! session cookie name under the base, binding tokens to this deployment's
//! cookie identity. Resolved once at startup; rotating the secret requires a
//! process restart.

use anyhow::{Context, Result, bail};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use crossgate_common::constants::MIN_SECRET_LEN;

/// Resolve the HMAC signing key for token signing.
///
/// The returned key is never logged; callers must not expose it either.
pub fn resolve(
    secret_override: Option<&str>,
    secret_file: &Path,
    cookie_name: &str,
) -> Result<Vec<u8>> {
    let base = match secret_override {
        Some(s) if s.len() >= MIN_SECRET_LEN => s.as_bytes().to_vec(),
        _ => load_or_create(secret_file)?,
    };
    derive_key(&base, cookie_name)
}

/// HKDF-like derivation: HMAC-SHA256 of the cookie name under the base
/// secret. Makes cross-install reuse of a leaked base secret useless.
fn derive_key(base: &[u8], cookie_name: &str) -> Result<Vec<u8>> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(base).context("Base secret rejected by HMAC")?;
    mac.update(cookie_name.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Read the base secret from `path`, generating and persisting a fresh
/// random one if the file does not exist yet.
///
/// Creation uses exclusive-create; if two processes race on first use, the
/// loser re-reads the winner's file. Two racing *first logins* may still
/// settle on different secrets for a moment - last-writer-wins, and the
/// affected login is simply retried.
fn load_or_create(path: &Path) -> Result<Vec<u8>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create secret directory {}", dir.display()))?;
    }

    if let Some(existing) = read_existing(path)? {
        return Ok(existing);
    }

    let mut raw = [0u8; 32];
    rand::Rng::fill(&mut rand::rng(), &mut raw[..]);
    let generated = hex::encode(raw);

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(generated.as_bytes())
                .with_context(|| format!("Failed to write secret file {}", path.display()))?;
            Ok(generated.into_bytes())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Another process won the create race; use its secret.
            match read_existing(path)? {
                Some(existing) => Ok(existing),
                None => bail!("Secret file {} exists but is empty", path.display()),
            }
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to create secret file {}", path.display()))
        }
    }
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.as_bytes().to_vec()))
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read secret file {}", path.display()))
        }
    }
}
