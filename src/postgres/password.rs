//! Password and verifier generation for PostgreSQL users

use rand::Rng;

/// Length of generated passwords
pub const GENERATED_PASSWORD_LENGTH: usize = 24;

/// Generate a secure random password.
///
/// The character set is alphanumeric only so the password is safe to embed
/// in connection URIs and configuration files without escaping.
pub fn generate_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LENGTH)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Derive a SCRAM-SHA-256 verifier for a password.
///
/// The verifier is what PostgreSQL stores in `pg_authid`; assigning it with
/// `ALTER ROLE ... PASSWORD` never exposes the plaintext to the server log.
/// A verifier cannot be compared against a plaintext password later, so
/// callers must compute it once and store it alongside the password.
pub fn scram_verifier(password: &str) -> std::io::Result<String> {
    Ok(postgres_protocol::password::scram_sha_256(password.as_bytes()))
}
