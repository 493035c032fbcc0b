mod common;

use std::sync::Arc;

use bitcoin::{absolute, transaction, Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Witness};
use common::{acme, build_branch, build_chain, secret, xpub, Harness, OFFSET};
use identity_oracle::chain::{script, HeaderIds, Transaction};
use identity_oracle::feed::{ChainFollower, ChainSource};
use identity_oracle::keys::{verify_signature, ExtendedKeys, InstrumentId, OracleKey, RawAddress};
use identity_oracle::models::{ContractFormation, EntityField};
use identity_oracle::oracle::{
    sighash, AdminCertificateRequest, AdminTarget, Attestation, Decision, Oracle, OracleSettings,
    TransferRequest,
};
use identity_oracle::OracleError;

fn signed(attestation: Attestation) -> (identity_oracle::models::SignatureHash, Option<u64>) {
    match attestation {
        Attestation::Signed {
            sig_hash,
            expiration,
        } => (sig_hash, expiration),
        Attestation::Rejected { description } => panic!("unexpected rejection: {description}"),
    }
}

#[tokio::test]
async fn matching_entity_binds_child_key() {
    let h = Harness::new().await;
    let user = h.register_user(1, acme(), 1, 1).await;
    let xpub = user.xpubs.iter().next().unwrap().clone();
    let claimed = EntityField {
        name: "Acme Pty Ltd".to_string(),
        ..Default::default()
    };

    let attestation = h
        .oracle
        .verify_pub_key(&h.cancel, &claimed, &xpub, 7)
        .await
        .unwrap();
    let (sig_hash, expiration) = signed(attestation);

    let (block_hash, block_height) = h.sig_block();
    let child = xpub.child_key(7).unwrap().public_key();
    assert!(sig_hash.approved);
    assert_eq!(sig_hash.block_height, block_height);
    assert_eq!(expiration, None);
    assert_eq!(
        sig_hash.hash,
        sighash::entity_pub_key(&claimed, &child, &block_hash, true)
    );

    let signature = h.oracle.sign(&sig_hash);
    assert!(verify_signature(
        &sig_hash.hash,
        &signature,
        &h.oracle.identity().public_key
    ));
}

#[tokio::test]
async fn mismatched_entity_still_signs_disapproval() {
    let h = Harness::new().await;
    let user = h.register_user(2, acme(), 1, 1).await;
    let xpub = user.xpubs.iter().next().unwrap().clone();
    let claimed = EntityField {
        name: "Beta".to_string(),
        ..Default::default()
    };

    let (sig_hash, _) = signed(
        h.oracle
            .verify_pub_key(&h.cancel, &claimed, &xpub, 0)
            .await
            .unwrap(),
    );

    let (block_hash, _) = h.sig_block();
    let child = xpub.child_key(0).unwrap().public_key();
    assert!(!sig_hash.approved);
    assert!(sig_hash.description.contains("Name doesn't match"));
    assert_eq!(
        sig_hash.hash,
        sighash::entity_pub_key(&claimed, &child, &block_hash, false)
    );
}

#[tokio::test]
async fn short_window_refuses_to_sign() {
    let h = Harness::with_chain(build_chain(2)).await;
    let user = h.register_user(3, acme(), 1, 1).await;

    let err = h
        .oracle
        .verify_xpub(&h.cancel, &acme(), &user.xpubs)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OracleError::InsufficientHeaders { have: 2, need: OFFSET }
    ));
}

#[tokio::test]
async fn admin_certificate_for_unknown_contract_is_not_found() {
    let h = Harness::new().await;
    let user = h.register_user(4, acme(), 1, 1).await;
    let contract = RawAddress::PublicKeyHash([9; 20]);

    let err = h
        .oracle
        .create_admin_certificate(
            &h.cancel,
            &AdminCertificateRequest {
                xpubs: user.xpubs.clone(),
                index: 0,
                target: AdminTarget::Contract(contract),
                expiration: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn admin_certificate_checks_contract_issuer() {
    let h = Harness::new().await;
    let user = h.register_user(5, acme(), 2, 2).await;
    let contract = RawAddress::PublicKeyHash([7; 20]);
    let formation = ContractFormation {
        contract_name: "Acme Shares".to_string(),
        contract_type: "Shares".to_string(),
        issuer: Some(EntityField {
            name: "Acme Pty Ltd".to_string(),
            country_code: "AUS".to_string(),
            ..Default::default()
        }),
        contract_revision: 0,
        timestamp: 1_000,
    };
    let script = formation.to_script(true).unwrap();
    assert!(h
        .contracts
        .save(&h.cancel, &contract, &formation, script.as_bytes())
        .await
        .unwrap());

    let (sig_hash, expiration) = signed(
        h.oracle
            .create_admin_certificate(
                &h.cancel,
                &AdminCertificateRequest {
                    xpubs: user.xpubs.clone(),
                    index: 3,
                    target: AdminTarget::Contract(contract.clone()),
                    expiration: Some(42),
                },
            )
            .await
            .unwrap(),
    );
    assert!(sig_hash.approved);
    assert_eq!(expiration, Some(42));

    let admin = RawAddress::from_keys(&user.xpubs.child_keys(3).unwrap(), 2).unwrap();
    let (block_hash, _) = h.sig_block();
    assert_eq!(
        sig_hash.hash,
        sighash::contract_admin_identity(
            &admin,
            &AdminTarget::Contract(contract),
            &block_hash,
            42,
            true
        )
    );
}

#[tokio::test]
async fn admin_certificate_without_issuer_is_disapproved() {
    let h = Harness::new().await;
    let user = h.register_user(6, acme(), 1, 1).await;
    let contract = RawAddress::PublicKeyHash([8; 20]);
    let formation = ContractFormation {
        contract_name: "Anonymous".to_string(),
        timestamp: 5,
        ..Default::default()
    };
    let script = formation.to_script(true).unwrap();
    h.contracts
        .save(&h.cancel, &contract, &formation, script.as_bytes())
        .await
        .unwrap();

    let (sig_hash, expiration) = signed(
        h.oracle
            .create_admin_certificate(
                &h.cancel,
                &AdminCertificateRequest {
                    xpubs: user.xpubs.clone(),
                    index: 0,
                    target: AdminTarget::Contract(contract),
                    expiration: None,
                },
            )
            .await
            .unwrap(),
    );
    assert!(!sig_hash.approved);
    assert_eq!(sig_hash.description, "Contract formation has no issuer");
    assert!(expiration.unwrap() > 0);
}

#[tokio::test]
async fn approver_rejection_short_circuits_every_attestation() {
    let h = Harness::new().await;
    let user = h.register_user(7, acme(), 1, 1).await;
    let xpub = user.xpubs.iter().next().unwrap().clone();
    h.approver.reject("identity under review");

    let rejected = |attestation: Attestation| {
        assert_eq!(
            attestation,
            Attestation::Rejected {
                description: "identity under review".to_string()
            }
        );
    };

    rejected(
        h.oracle
            .verify_pub_key(&h.cancel, &acme(), &xpub, 0)
            .await
            .unwrap(),
    );
    rejected(
        h.oracle
            .verify_xpub(&h.cancel, &acme(), &user.xpubs)
            .await
            .unwrap(),
    );
    rejected(
        h.oracle
            .create_admin_certificate(
                &h.cancel,
                &AdminCertificateRequest {
                    xpubs: user.xpubs.clone(),
                    index: 0,
                    target: AdminTarget::Entity(acme()),
                    expiration: None,
                },
            )
            .await
            .unwrap(),
    );
    rejected(
        h.oracle
            .create_receive_signature(
                &h.cancel,
                &TransferRequest {
                    contract: RawAddress::PublicKeyHash([1; 20]),
                    instrument: InstrumentId {
                        instrument_type: "SHC".to_string(),
                        code: [2; 20],
                    },
                    xpubs: user.xpubs.clone(),
                    index: 0,
                    expiration: None,
                },
            )
            .await
            .unwrap(),
    );

    let calls = h.approver.calls();
    assert_eq!(calls.iter().filter(|hook| **hook == "identity").count(), 3);
    assert_eq!(calls.last(), Some(&"transfer"));
}

#[tokio::test]
async fn oracle_without_approver_accepts_every_request() {
    let h = Harness::new().await;
    let oracle = Oracle::new(
        h.store.clone(),
        h.tracker.clone(),
        h.contracts.clone(),
        OracleKey::new(secret(0x43)),
        OracleSettings::default(),
    );

    let key = OracleKey::new(secret(12));
    let signature = key.sign(&sighash::registration(&acme()));
    let user_id = match oracle
        .register(&h.cancel, &acme(), key.public_key(), &signature)
        .await
        .unwrap()
    {
        Decision::Accepted(user_id) => user_id,
        Decision::Rejected { description } => panic!("registration rejected: {description}"),
    };

    let xpubs = ExtendedKeys::single(xpub(112));
    let signature = key.sign(&sighash::add_key_set(&user_id, &xpubs, 1));
    oracle
        .add_key_set(&h.cancel, user_id, xpubs.clone(), 1, &signature)
        .await
        .unwrap();

    let (sig_hash, _) = signed(oracle.verify_xpub(&h.cancel, &acme(), &xpubs).await.unwrap());
    assert!(sig_hash.approved);
    assert!(h.approver.calls().is_empty());
}

#[tokio::test]
async fn transfer_signature_binds_receive_address() {
    let h = Harness::new().await;
    let user = h.register_user(8, acme(), 3, 2).await;
    let request = TransferRequest {
        contract: RawAddress::PublicKeyHash([1; 20]),
        instrument: InstrumentId {
            instrument_type: "SHC".to_string(),
            code: [2; 20],
        },
        xpubs: user.xpubs.clone(),
        index: 11,
        expiration: Some(1_900_000_000_000_000_000),
    };

    let (sig_hash, expiration) = signed(
        h.oracle
            .create_receive_signature(&h.cancel, &request)
            .await
            .unwrap(),
    );

    let receive = RawAddress::from_keys(&user.xpubs.child_keys(11).unwrap(), 2).unwrap();
    let (block_hash, block_height) = h.sig_block();
    assert!(sig_hash.approved);
    assert_eq!(sig_hash.block_height, block_height);
    assert_eq!(expiration, request.expiration);
    assert_eq!(
        sig_hash.hash,
        sighash::transfer(
            &request.contract,
            &[2; 20],
            &receive,
            &block_hash,
            1_900_000_000_000_000_000,
            true
        )
    );
}

#[tokio::test]
async fn unknown_key_set_is_not_found() {
    let h = Harness::new().await;
    let stranger = ExtendedKeys::single(xpub(200));
    let err = h
        .oracle
        .verify_xpub(&h.cancel, &acme(), &stranger)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn registration_requires_matching_signature() {
    let h = Harness::new().await;
    let key = OracleKey::new(common::secret(9));
    let other = OracleKey::new(common::secret(10));
    let signature = other.sign(&sighash::registration(&acme()));

    let err = h
        .oracle
        .register(&h.cancel, &acme(), key.public_key(), &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidSignature));
}

#[tokio::test]
async fn rejected_registration_creates_no_user() {
    let h = Harness::new().await;
    h.approver.reject("sanctioned");
    let key = OracleKey::new(common::secret(11));
    let signature = key.sign(&sighash::registration(&acme()));

    let decision = h
        .oracle
        .register(&h.cancel, &acme(), key.public_key(), &signature)
        .await
        .unwrap();
    assert_eq!(
        decision,
        Decision::Rejected {
            description: "sanctioned".to_string()
        }
    );
}

#[tokio::test]
async fn key_set_registration_rules() {
    let h = Harness::new().await;
    let user = h.register_user(12, acme(), 1, 1).await;

    // Already registered.
    let signature = user
        .key
        .sign(&sighash::add_key_set(&user.user_id, &user.xpubs, 1));
    let err = h
        .oracle
        .add_key_set(&h.cancel, user.user_id, user.xpubs.clone(), 1, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::KeySetExists));

    // More signers than keys.
    let xpubs = ExtendedKeys::single(xpub(201));
    let signature = user.key.sign(&sighash::add_key_set(&user.user_id, &xpubs, 2));
    let err = h
        .oracle
        .add_key_set(&h.cancel, user.user_id, xpubs.clone(), 2, &signature)
        .await
        .unwrap_err();
    assert!(err.is_client_error());

    // Signed by someone else.
    let stranger = OracleKey::new(common::secret(13));
    let signature = stranger.sign(&sighash::add_key_set(&user.user_id, &xpubs, 1));
    let err = h
        .oracle
        .add_key_set(&h.cancel, user.user_id, xpubs, 1, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidSignature));

    assert_eq!(
        h.oracle.find_user_id(&h.cancel, &user.xpubs).await.unwrap(),
        user.user_id
    );
}

#[tokio::test]
async fn identity_update_changes_attested_entity() {
    let h = Harness::new().await;
    let user = h.register_user(14, acme(), 1, 1).await;
    let renamed = EntityField {
        name: "Acme Holdings".to_string(),
        ..acme()
    };

    let signature = user
        .key
        .sign(&sighash::update_identity(&user.user_id, &renamed));
    assert_eq!(
        h.oracle
            .update_identity(&h.cancel, user.user_id, &renamed, &signature)
            .await
            .unwrap(),
        Decision::Accepted(())
    );

    let (sig_hash, _) = signed(
        h.oracle
            .verify_xpub(&h.cancel, &acme(), &user.xpubs)
            .await
            .unwrap(),
    );
    assert!(!sig_hash.approved);
    assert_eq!(sig_hash.description, "Name doesn't match");
}

#[tokio::test]
async fn soft_deleted_user_is_not_found() {
    let h = Harness::new().await;
    let user = h.register_user(15, acme(), 1, 1).await;
    h.store.soft_delete(user.user_id).await;

    let err = h
        .oracle
        .find_user_id(&h.cancel, &user.xpubs)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn cancelled_request_reports_cancellation() {
    let h = Harness::new().await;
    let user = h.register_user(16, acme(), 1, 1).await;
    let cancel = h.cancel.child_token();
    cancel.cancel();

    let err = h
        .oracle
        .verify_xpub(&cancel, &acme(), &user.xpubs)
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::Canceled { .. }));
}

#[tokio::test]
async fn observed_formation_feeds_admin_certificate() {
    let h = Harness::new().await;
    let user = h.register_user(17, acme(), 1, 1).await;
    let formation = ContractFormation {
        contract_name: "Observed".to_string(),
        issuer: Some(acme()),
        timestamp: 9,
        ..Default::default()
    };

    let signer = OracleKey::new(common::secret(18));
    let tx = formation_tx(&signer.public_key(), formation.to_script(true).unwrap());
    assert_eq!(h.contracts.observe(&h.cancel, &tx).await.unwrap(), 1);

    let contract = RawAddress::from_public_key(&signer.public_key());
    let (sig_hash, _) = signed(
        h.oracle
            .create_admin_certificate(
                &h.cancel,
                &AdminCertificateRequest {
                    xpubs: user.xpubs.clone(),
                    index: 0,
                    target: AdminTarget::Contract(contract),
                    expiration: None,
                },
            )
            .await
            .unwrap(),
    );
    assert!(sig_hash.approved);
}

#[tokio::test]
async fn attestations_follow_a_reorganized_chain() {
    let h = Harness::new().await;
    let user = h.register_user(19, acme(), 1, 1).await;

    let (before, _) = signed(
        h.oracle
            .verify_xpub(&h.cancel, &acme(), &user.xpubs)
            .await
            .unwrap(),
    );
    let (old_hash, old_height) = h.sig_block();
    assert_eq!(before.block_height, old_height);

    // The node switches to a longer branch forking off the sig block.
    let mut forked = h.chain[..=old_height as usize].to_vec();
    forked.extend(build_branch(h.chain[old_height as usize].id(), 6, 7));
    h.feed.set_chain(forked.clone());

    let mut follower = ChainFollower::new(
        Arc::clone(&h.feed) as Arc<dyn ChainSource>,
        Arc::clone(&h.tracker),
        Arc::clone(&h.contracts),
    );
    follower.poll_once(&h.cancel).await.unwrap();

    let tip_height = (forked.len() - 1) as u32;
    let sig_height = tip_height - OFFSET as u32 + 1;
    let new_hash = forked[sig_height as usize].id();
    assert_ne!(new_hash, old_hash);

    let (after, _) = signed(
        h.oracle
            .verify_xpub(&h.cancel, &acme(), &user.xpubs)
            .await
            .unwrap(),
    );
    assert!(after.approved);
    assert_eq!(after.block_height, sig_height);
    assert_eq!(
        after.hash,
        sighash::entity_xpub(&acme(), &user.xpubs, &new_hash, true)
    );
}

/// A one-input transaction whose P2PKH unlocking script pushes a dummy
/// signature and `key`.
fn formation_tx(key: &identity_oracle::keys::PublicKey, locking_script: ScriptBuf) -> Transaction {
    let unlocking_script = script::push_only(&[&[0x30; 71][..], &key.serialize()[..]]).unwrap();
    Transaction {
        version: transaction::Version::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: unlocking_script,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: locking_script,
        }],
    }
}
