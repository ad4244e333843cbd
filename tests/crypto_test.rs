use pgbackrest_core::crypto::{decrypt, decrypt_raw, derive_key_iv, encrypt, SALT_LEN};

#[test]
fn encrypt_then_decrypt_round_trips() {
    let plaintext = b"block-incremental delta engine test payload";
    let ciphertext = encrypt("correct horse battery staple", plaintext).unwrap();
    assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

    let recovered = decrypt("correct horse battery staple", &ciphertext).unwrap();
    assert_eq!(recovered.as_slice(), plaintext.as_slice());
}

#[test]
fn wrong_password_fails_to_decrypt() {
    let ciphertext = encrypt("correct-password", b"secret bytes").unwrap();
    assert!(decrypt("wrong-password", &ciphertext).is_err());
}

#[test]
fn same_password_different_salt_gives_different_ciphertext() {
    let a = encrypt("same-password", b"payload").unwrap();
    let b = encrypt("same-password", b"payload").unwrap();
    assert_ne!(a, b, "a random salt must be mixed in per call");
}

#[test]
fn derive_key_iv_is_deterministic_for_a_fixed_salt() {
    let salt = [7u8; SALT_LEN];
    let (key_a, iv_a) = derive_key_iv("password", &salt);
    let (key_b, iv_b) = derive_key_iv("password", &salt);
    assert_eq!(key_a, key_b);
    assert_eq!(iv_a, iv_b);
}

#[test]
fn raw_decrypt_of_garbage_does_not_panic() {
    let salt = [1u8; SALT_LEN];
    let (key, iv) = derive_key_iv("password", &salt);
    assert!(decrypt_raw(&key, &iv, b"too short").is_err());
}
