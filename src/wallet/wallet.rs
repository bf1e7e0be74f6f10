use crate::core::{OutPoint, TXInput, TXOutput, Transaction};
use crate::error::{BlockchainError, Result, TxError};
use crate::utils::{base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, new_key_pair};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// Key pair held by a spender. The ledger itself never sees the private
/// half; it only verifies what `sign_transaction` produced.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        Self::from_pkcs8(&pkcs8)
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Wallet> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|e| {
                BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
            })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet {
            pkcs8: pkcs8.to_vec(),
            public_key,
        })
    }

    pub fn get_address(&self) -> String {
        convert_address(&self.get_pub_key_hash())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }

    pub fn get_pub_key_hash(&self) -> Vec<u8> {
        hash_pub_key(&self.public_key)
    }

    /// Signs every input over the transaction id. The id does not cover the
    /// unlocking data, so one signature pass is enough.
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<()> {
        let txid = tx.id();
        let signature = ecdsa_p256_sha256_sign_digest(&self.pkcs8, txid.as_bytes())?;
        for input in tx.get_vin_mut() {
            input.set_unlock(self.public_key.clone(), signature.clone());
        }
        Ok(())
    }

    /// Builds and signs a payment of `amount` to `to_pub_key_hash`, spending
    /// from `spendable` in the given order and returning change to this
    /// wallet. Whatever is left over beyond `amount + fee` is change.
    pub fn create_payment(
        &self,
        spendable: &[(OutPoint, TXOutput)],
        to_pub_key_hash: &[u8],
        amount: u64,
        fee: u64,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(TxError::MalformedTransaction(
                "payment amount must be positive".to_string(),
            )));
        }
        let required = amount
            .checked_add(fee)
            .ok_or(BlockchainError::InsufficientFunds {
                required: u64::MAX,
                available: 0,
            })?;

        let own = self.get_pub_key_hash();
        let mut accumulated = 0u64;
        let mut inputs = vec![];
        for (outpoint, output) in spendable {
            if accumulated >= required {
                break;
            }
            if !output.is_locked_with_key(&own) {
                continue;
            }
            accumulated = accumulated.saturating_add(output.get_value());
            inputs.push(TXInput::new(*outpoint));
        }

        if accumulated < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available: accumulated,
            });
        }

        let mut outputs = vec![TXOutput::new(amount, to_pub_key_hash.to_vec())];
        let change = accumulated - required;
        if change > 0 {
            outputs.push(TXOutput::new(change, own));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_transaction(&mut tx)?;
        Ok(tx)
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    checksum(body).as_slice() == actual_checksum
}

/// Base58 address for a public key hash: version byte, hash, 4 byte checksum
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    base58_encode(payload.as_slice())
}

pub fn address_to_pub_key_hash(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Hash256;
    use crate::utils::ecdsa_p256_sha256_sign_verify;

    #[test]
    fn test_address_round_trip() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
        assert_eq!(address_to_pub_key_hash(&address).unwrap(), wallet.get_pub_key_hash());
        assert_eq!(wallet.get_pub_key_hash().len(), 20);
    }

    #[test]
    fn test_corrupted_address_is_rejected() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();
        let last = address.pop().unwrap();
        address.push(if last == '2' { '3' } else { '2' });
        assert!(!validate_address(&address));
        assert!(address_to_pub_key_hash(&address).is_err());
        assert!(!validate_address("not base58 0OIl"));
    }

    #[test]
    fn test_reload_from_pkcs8() {
        let wallet = Wallet::new().unwrap();
        let again = Wallet::from_pkcs8(wallet.get_pkcs8()).unwrap();
        assert_eq!(again.get_address(), wallet.get_address());
        assert!(Wallet::from_pkcs8(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_create_payment_with_change() {
        let wallet = Wallet::new().unwrap();
        let own = wallet.get_pub_key_hash();
        let spendable = vec![
            (OutPoint::new(Hash256::digest(b"a"), 0), TXOutput::new(30, own.clone())),
            (OutPoint::new(Hash256::digest(b"b"), 0), TXOutput::new(30, own.clone())),
            (OutPoint::new(Hash256::digest(b"c"), 0), TXOutput::new(30, own.clone())),
        ];

        let tx = wallet.create_payment(&spendable, &[7u8; 20], 45, 2).unwrap();
        assert_eq!(tx.get_vin().len(), 2);
        assert_eq!(tx.get_vout()[0].get_value(), 45);
        assert_eq!(tx.get_vout()[1].get_value(), 13);
        assert!(tx.get_vout()[1].is_locked_with_key(&own));

        let input = &tx.get_vin()[0];
        assert_eq!(hash_pub_key(input.get_pub_key()), own);
        assert!(ecdsa_p256_sha256_sign_verify(
            input.get_pub_key(),
            input.get_signature(),
            tx.id().as_bytes()
        ));
    }

    #[test]
    fn test_create_payment_insufficient_funds() {
        let wallet = Wallet::new().unwrap();
        let spendable = vec![(
            OutPoint::new(Hash256::digest(b"a"), 0),
            TXOutput::new(10, wallet.get_pub_key_hash()),
        )];
        let err = wallet
            .create_payment(&spendable, &[7u8; 20], 10, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::InsufficientFunds {
                required: 11,
                available: 10
            }
        ));
    }
}
