//! Private key loading.

use std::path::Path;
use std::sync::Arc;

use russh_keys::key::KeyPair;

use crate::error::TunnelError;
use crate::hop::HopSpec;

/// Read and decode an unencrypted private key file.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<Arc<KeyPair>, TunnelError> {
    let path = path.as_ref();
    let credential_error = |reason: String| TunnelError::Credential {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read_to_string(path).map_err(|e| credential_error(e.to_string()))?;
    let key = russh_keys::decode_secret_key(&pem, None).map_err(|e| credential_error(e.to_string()))?;
    Ok(Arc::new(key))
}

/// One credential per hop: the same key authenticates on every hop.
pub fn credentials_for(spec: &HopSpec, key: Arc<KeyPair>) -> Vec<Arc<KeyPair>> {
    vec![key; spec.len()]
}
