use bp7sec::crypto::{self, CipherSuite, Direction};
use bp7sec::error::SecError;
use bp7sec::sci::util::CipherParms;
use bp7sec::stream::{self, StreamObject, StreamPolicy};
use std::time::Instant;

fn parms_with_iv() -> CipherParms {
    CipherParms {
        iv: Some(vec![0x5e; 12]),
        aad: Some(vec![0x01, 0x02]),
        ..Default::default()
    }
}

#[test]
fn memory_path_roundtrip() {
    let key = vec![0x42; 32];
    let plaintext: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
    let parms = parms_with_iv();
    let policy = StreamPolicy::default();

    let input = StreamObject::from_vec(plaintext.clone());
    let (ciphertext_obj, tag) = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Encrypt,
        &key,
        &parms,
        input,
        &policy,
    )
    .expect("encryption failed");
    assert!(!ciphertext_obj.is_file_backed());
    let tag = tag.expect("no tag produced");
    let ciphertext = ciphertext_obj.into_vec().unwrap();
    assert_eq!(ciphertext.len(), plaintext.len());
    assert_ne!(ciphertext, plaintext);

    let mut dec_parms = parms_with_iv();
    dec_parms.icv = Some(tag);
    let input = StreamObject::from_vec(ciphertext);
    let (plain_obj, _) = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Decrypt,
        &key,
        &dec_parms,
        input,
        &policy,
    )
    .expect("decryption failed");
    assert_eq!(plain_obj.into_vec().unwrap(), plaintext);
}

#[test]
fn zero_length_stream_is_an_error() {
    let key = vec![0x42; 32];
    let parms = parms_with_iv();
    let policy = StreamPolicy::default();
    let err = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Encrypt,
        &key,
        &parms,
        StreamObject::from_vec(Vec::new()),
        &policy,
    )
    .unwrap_err();
    assert!(matches!(err, SecError::EmptyStream));
}

#[test]
fn large_predictions_go_straight_to_the_file_path() {
    let key = vec![0x42; 16];
    let plaintext = vec![0xabu8; 4096];
    let parms = parms_with_iv();
    // threshold of one byte: every prediction is "large"
    let policy = StreamPolicy {
        xmit_rate: 10,
        max_temp_files_per_sec: 10,
        ..Default::default()
    };

    let (obj, tag) = stream::convert(
        CipherSuite::Aes128Gcm,
        Direction::Encrypt,
        &key,
        &parms,
        StreamObject::from_vec(plaintext.clone()),
        &policy,
    )
    .expect("encryption failed");
    assert!(obj.is_file_backed());

    // the file-backed output matches a direct whole-buffer transform
    let (reference, ref_tag) = crypto::crypt_full(
        CipherSuite::Aes128Gcm,
        Direction::Encrypt,
        &key,
        parms.iv.as_deref().unwrap(),
        parms.aad.as_deref().unwrap(),
        &plaintext,
        None,
    )
    .unwrap();
    assert_eq!(obj.into_vec().unwrap(), reference);
    assert_eq!(tag, ref_tag);
}

/// Forcing the in-memory pool to fail must deterministically fall through
/// to the file-backed path, pacing first with a delay proportional to the
/// distance from the threshold.
#[test]
fn memory_failure_falls_back_to_file_with_pacing() {
    let key = vec![0x42; 16];
    let plaintext = vec![0x17u8; 100];
    let parms = parms_with_iv();
    let policy = StreamPolicy {
        // threshold = 200_000 bytes; predicted output is 100 bytes
        xmit_rate: 1_000_000,
        max_temp_files_per_sec: 5,
        // the in-memory pool rejects everything
        mem_ceiling: 0,
        ..Default::default()
    };

    let started = Instant::now();
    let (obj, tag) = stream::convert(
        CipherSuite::Aes128Gcm,
        Direction::Encrypt,
        &key,
        &parms,
        StreamObject::from_vec(plaintext.clone()),
        &policy,
    )
    .expect("fallback conversion failed");
    let elapsed = started.elapsed();

    assert!(obj.is_file_backed());
    // siesta = (200_000 - 100) / 1_000_000 s, just under 200ms
    assert!(elapsed.as_millis() >= 150, "pacing delay was not applied");

    let (reference, ref_tag) = crypto::crypt_full(
        CipherSuite::Aes128Gcm,
        Direction::Encrypt,
        &key,
        parms.iv.as_deref().unwrap(),
        parms.aad.as_deref().unwrap(),
        &plaintext,
        None,
    )
    .unwrap();
    assert_eq!(obj.into_vec().unwrap(), reference);
    assert_eq!(tag, ref_tag);
}

/// An authentication failure aborts immediately instead of burning a
/// second pass through the file path.
#[test]
fn decrypt_auth_failure_does_not_retry() {
    let key = vec![0x42; 32];
    let plaintext = vec![0x55u8; 64];
    let parms = parms_with_iv();
    let policy = StreamPolicy::default();

    let (ct_obj, tag) = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Encrypt,
        &key,
        &parms,
        StreamObject::from_vec(plaintext),
        &policy,
    )
    .unwrap();
    let mut tag = tag.unwrap();
    tag[0] ^= 0x01;

    let mut dec_parms = parms_with_iv();
    dec_parms.icv = Some(tag);
    let err = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Decrypt,
        &key,
        &dec_parms,
        StreamObject::from_vec(ct_obj.into_vec().unwrap()),
        &policy,
    )
    .unwrap_err();
    assert!(matches!(err, SecError::AuthFailed));
}

#[test]
fn missing_iv_is_rejected() {
    let key = vec![0x42; 32];
    let policy = StreamPolicy::default();
    let err = stream::convert(
        CipherSuite::Aes256Gcm,
        Direction::Encrypt,
        &key,
        &CipherParms::default(),
        StreamObject::from_vec(vec![1, 2, 3]),
        &policy,
    )
    .unwrap_err();
    assert!(matches!(err, SecError::MissingParm("iv")));
}
