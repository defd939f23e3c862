//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
// validation module kept internal; only types are re-exported publicly

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};

    fn signed_transfer(keypair: &KeyPair, amount: u64, fee: u64, nonce: u64) -> Transaction {
        let mut tx = TransferTx::new(
            keypair.address(),
            address_from_string("recipient"),
            amount,
            fee,
            nonce,
        );
        let message = tx.signable_message();
        let signature = keypair.sign(&message).unwrap();
        tx.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
        Transaction::Transfer(tx)
    }

    #[test]
    fn test_transfer_admission_success() {
        let keypair = KeyPair::generate().unwrap();
        let tx = signed_transfer(&keypair, 100, 5, 0);
        assert!(tx.validate_admission().is_ok());
        assert!(tx.validate_signature().is_ok());
    }

    #[test]
    fn test_unsigned_transaction_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let tx = Transaction::Transfer(TransferTx::new(
            keypair.address(),
            address_from_string("recipient"),
            100,
            5,
            0,
        ));
        let result = tx.validate_admission();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not signed"));
    }

    #[test]
    fn test_empty_sender_rejected() {
        let mut tx = TransferTx::new([0u8; 32], address_from_string("recipient"), 100, 5, 0);
        tx.sign(vec![0u8; 64], vec![0u8; 33]);
        let result = Transaction::Transfer(tx).validate_admission();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Sender address cannot be empty"));
    }

    #[test]
    fn test_zero_amount_transfer_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = TransferTx::new(keypair.address(), address_from_string("recipient"), 0, 5, 0);
        tx.sign(vec![0u8; 64], vec![0u8; 33]);
        assert!(Transaction::Transfer(tx).validate_admission().is_err());
    }

    #[test]
    fn test_empty_transfer_recipient_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = TransferTx::new(keypair.address(), [0u8; 32], 100, 5, 0);
        tx.sign(vec![0u8; 64], vec![0u8; 33]);
        assert!(Transaction::Transfer(tx).validate_admission().is_err());
    }

    #[test]
    fn test_stake_requires_validator() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = StakeTx::new(keypair.address(), String::new(), 100, 1, 0);
        tx.sign(vec![0u8; 64], vec![0u8; 33]);
        let result = Transaction::Stake(tx).validate_admission();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Stake validator cannot be empty"));
    }

    #[test]
    fn test_tampered_signature_fails_verification() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = TransferTx::new(
            keypair.address(),
            address_from_string("recipient"),
            100,
            5,
            0,
        );
        tx.sign(vec![0u8; 64], keypair.public_key_bytes().to_vec());
        let tx = Transaction::Transfer(tx);
        assert!(tx.validate_admission().is_ok());
        assert!(tx.validate_signature().is_err());
    }

    #[test]
    fn test_id_is_stable_content_hash() {
        let keypair = KeyPair::generate().unwrap();
        let a = signed_transfer(&keypair, 100, 5, 0);
        let b = signed_transfer(&keypair, 100, 5, 0);
        let c = signed_transfer(&keypair, 100, 5, 1);

        // Signatures are not part of the content hash; identical content
        // yields identical ids even across separate signing runs.
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().len(), 64);
    }

    #[test]
    fn test_vote_option_wire_names() {
        let yes = serde_json::to_string(&VoteOption::Yes).unwrap();
        assert_eq!(yes, "\"yes\"");
        let parsed: VoteOption = serde_json::from_str("\"abstain\"").unwrap();
        assert_eq!(parsed, VoteOption::Abstain);
    }
}
