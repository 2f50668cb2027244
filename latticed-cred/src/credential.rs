//! The signed job credential node daemons verify before trusting a
//! launch request, per spec §3/§4.F's field list. Signing stands in
//! for Slurm's munge/OpenSSL collaborator (explicitly out of scope,
//! spec §1) with `ed25519-dalek`, the registry's idiomatic asymmetric
//! signing crate.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use latticed_base::{access_denied, invalid_input, Bitmap, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StepId {
    BatchScript,
    Interactive,
    Extern,
    Id(u32),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub job_id: u64,
    pub step_id: StepId,
    pub uid: u32,
    pub gid: u32,
    pub node_list: String,
    pub core_bitmaps_per_node: Vec<(u64, u64, Vec<u64>)>,
    pub memory_per_node: Vec<u64>,
    pub expiration_unix_ms: u64,
}

impl Credential {
    pub fn core_bitmap(&self, node_idx: usize) -> Result<Bitmap> {
        let (bit_count, word_count, words) = self
            .core_bitmaps_per_node
            .get(node_idx)
            .ok_or_else(|| invalid_input("node index out of range for credential"))?
            .clone();
        Bitmap::unpack(bit_count, word_count, words)
    }

    fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedCredential {
    pub credential: Credential,
    pub signature: Vec<u8>,
}

pub struct CredentialSigner {
    key: SigningKey,
}

impl CredentialSigner {
    pub fn from_bytes(seed: &[u8; 32]) -> CredentialSigner {
        CredentialSigner { key: SigningKey::from_bytes(seed) }
    }

    pub fn generate(rng: &mut impl rand::RngCore) -> CredentialSigner {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        CredentialSigner { key: SigningKey::from_bytes(&seed) }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign(&self, credential: Credential) -> Result<SignedCredential> {
        let bytes = credential.signing_bytes()?;
        let signature = self.key.sign(&bytes);
        Ok(SignedCredential { credential, signature: signature.to_vec() })
    }
}

pub struct CredentialVerifier {
    key: VerifyingKey,
}

impl CredentialVerifier {
    pub fn new(key: VerifyingKey) -> CredentialVerifier {
        CredentialVerifier { key }
    }

    pub fn verify(&self, signed: &SignedCredential) -> Result<()> {
        let bytes = signed.credential.signing_bytes()?;
        let sig_bytes: [u8; 64] = signed
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| invalid_input("signature is not 64 bytes"))?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.key
            .verify(&bytes, &signature)
            .map_err(|_| access_denied("credential signature verification failed"))
    }
}
