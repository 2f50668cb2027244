use crate::{Credential, CredentialSigner, CredentialVerifier, StepId};
use latticed_base::Bitmap;
use rand::rngs::OsRng;

fn sample_credential() -> Credential {
    let mut bitmap = Bitmap::alloc(8);
    bitmap.set(0);
    bitmap.set(1);
    Credential {
        job_id: 123,
        step_id: StepId::BatchScript,
        uid: 1000,
        gid: 1000,
        node_list: "node[00-01]".to_string(),
        core_bitmaps_per_node: vec![bitmap.pack()],
        memory_per_node: vec![8192],
        expiration_unix_ms: 10_000,
    }
}

#[test]
fn sign_and_verify_round_trips() {
    let signer = CredentialSigner::generate(&mut OsRng);
    let verifier = CredentialVerifier::new(signer.verifying_key());
    let signed = signer.sign(sample_credential()).unwrap();
    verifier.verify(&signed).unwrap();
}

#[test]
fn tampered_credential_fails_verification() {
    let signer = CredentialSigner::generate(&mut OsRng);
    let verifier = CredentialVerifier::new(signer.verifying_key());
    let mut signed = signer.sign(sample_credential()).unwrap();
    signed.credential.uid = 0;
    assert!(verifier.verify(&signed).is_err());
}

#[test]
fn wrong_key_fails_verification() {
    let signer = CredentialSigner::generate(&mut OsRng);
    let other = CredentialSigner::generate(&mut OsRng);
    let verifier = CredentialVerifier::new(other.verifying_key());
    let signed = signer.sign(sample_credential()).unwrap();
    assert!(verifier.verify(&signed).is_err());
}

#[test]
fn core_bitmap_round_trips_through_credential() {
    let cred = sample_credential();
    let bitmap = cred.core_bitmap(0).unwrap();
    assert!(bitmap.test(0));
    assert!(bitmap.test(1));
    assert!(!bitmap.test(2));
}
