use anchor_lang::prelude::*;
use arcium_anchor::prelude::ArgBuilder;
use entropy_oracle::EntropyRequest;

use crate::ErrorCode;

/// Key material supplied alongside a client-encrypted operand.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputProof {
    /// Client x25519 public key used to derive the shared cipher secret.
    pub encryption_key: [u8; 32],
    pub nonce: u128,
}

impl InputProof {
    /// Rejects the all-zero x25519 key, which yields a zero shared secret.
    pub fn verify(&self) -> Result<()> {
        require!(self.encryption_key != [0u8; 32], ErrorCode::InvalidProof);
        Ok(())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct SealedValue {
    pub encryption_key: [u8; 32],
    pub nonce: u128,
    pub ciphertext: [u8; 32],
    /// Account allowed to use this value in computations.
    pub grantee: Pubkey,
}

impl SealedValue {
    /// Imports a client ciphertext after checking its proof, granting it to `grantee`.
    pub fn import(ciphertext: [u8; 32], proof: &InputProof, grantee: Pubkey) -> Result<Self> {
        proof.verify()?;
        Ok(Self {
            encryption_key: proof.encryption_key,
            nonce: proof.nonce,
            ciphertext,
            grantee,
        })
    }

    /// Entropy posted by the oracle, granted to whoever requested it.
    pub fn from_entropy_request(request: &EntropyRequest) -> Result<Self> {
        let entropy = request
            .entropy()
            .ok_or_else(|| error!(ErrorCode::EntropyNotReady))?;
        Ok(Self {
            encryption_key: entropy.encryption_key,
            nonce: entropy.nonce,
            ciphertext: entropy.ciphertext,
            grantee: request.requester,
        })
    }

    pub fn grant_for(&self, holder: &Pubkey) -> Result<Granted<'_>> {
        require_keys_eq!(self.grantee, *holder, ErrorCode::PermissionDenied);
        Ok(Granted { value: self })
    }
}

/// A sealed value whose grant has been checked for the computing account.
#[derive(Debug, Clone, Copy)]
pub struct Granted<'a> {
    value: &'a SealedValue,
}

impl Granted<'_> {
    /// Appends this value as an `Enc<Shared, u64>` circuit argument.
    pub fn bind(&self, args: ArgBuilder) -> ArgBuilder {
        args.x25519_pubkey(self.value.encryption_key)
            .plaintext_u128(self.value.nonce)
            .encrypted_u64(self.value.ciphertext)
    }

    pub fn value(&self) -> &SealedValue {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::error::Error;
    use entropy_oracle::{EntropyStatus, SealedEntropy};

    fn proof() -> InputProof {
        InputProof {
            encryption_key: [5u8; 32],
            nonce: 77,
        }
    }

    fn oracle_request(requester: Pubkey, entropy: Option<SealedEntropy>) -> EntropyRequest {
        EntropyRequest {
            oracle_config: Pubkey::new_unique(),
            id: 3,
            requester,
            tag: [0u8; 32],
            fee_paid: 0,
            status: match entropy {
                Some(_) => EntropyStatus::Fulfilled,
                None => EntropyStatus::Pending,
            },
            entropy,
            bump: 250,
        }
    }

    #[test]
    fn import_keeps_key_material() {
        let grantee = Pubkey::new_unique();
        let value = SealedValue::import([1u8; 32], &proof(), grantee).unwrap();
        assert_eq!(value.encryption_key, [5u8; 32]);
        assert_eq!(value.nonce, 77);
        assert_eq!(value.ciphertext, [1u8; 32]);
        assert_eq!(value.grantee, grantee);
    }

    #[test]
    fn zero_key_proof_rejected() {
        let bad = InputProof {
            encryption_key: [0u8; 32],
            nonce: 1,
        };
        assert_eq!(
            SealedValue::import([1u8; 32], &bad, Pubkey::new_unique()).unwrap_err(),
            Error::from(ErrorCode::InvalidProof)
        );
    }

    #[test]
    fn grant_only_for_grantee() {
        let holder = Pubkey::new_unique();
        let value = SealedValue::import([2u8; 32], &proof(), holder).unwrap();

        let granted = value.grant_for(&holder).unwrap();
        assert_eq!(granted.value(), &value);

        assert_eq!(
            value.grant_for(&Pubkey::new_unique()).unwrap_err(),
            Error::from(ErrorCode::PermissionDenied)
        );
    }

    #[test]
    fn unfulfilled_entropy_is_not_ready() {
        let request = oracle_request(Pubkey::new_unique(), None);
        assert_eq!(
            SealedValue::from_entropy_request(&request).unwrap_err(),
            Error::from(ErrorCode::EntropyNotReady)
        );
    }

    #[test]
    fn entropy_granted_to_requester_only() {
        let requester = Pubkey::new_unique();
        let sealed = SealedEntropy {
            encryption_key: [8u8; 32],
            nonce: 9,
            ciphertext: [4u8; 32],
        };
        let entropy =
            SealedValue::from_entropy_request(&oracle_request(requester, Some(sealed))).unwrap();
        assert_eq!(entropy.ciphertext, [4u8; 32]);
        assert!(entropy.grant_for(&requester).is_ok());
        assert_eq!(
            entropy.grant_for(&Pubkey::new_unique()).unwrap_err(),
            Error::from(ErrorCode::PermissionDenied)
        );
    }
}
