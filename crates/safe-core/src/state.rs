//! Safe transaction lifecycle.
//!
//! A [`SafeTransaction`] moves through
//! Built -> HashComputed -> PartiallySigned -> FullySigned -> Submitted ->
//! Confirmed | Reverted. Its payload cannot change after construction, and a
//! signature is only stored if it recovers to its signer over the stored
//! hash.

use crate::hashing::SafeTxHasher;
use once_cell::sync::Lazy;
use safe_types::{
	Address, Bytes, SafeSignature, SafeTransactionData, TransactionHash, B256, SIGNATURE_LENGTH,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors raised by lifecycle violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition {
		from: TransactionState,
		to: TransactionState,
	},
	#[error("Transaction hash has not been computed")]
	HashNotComputed,
	#[error("Stored hash {stored} does not match recomputed hash {recomputed}")]
	HashMismatch { stored: B256, recomputed: B256 },
	#[error("Signature from {signer} is invalid: {reason}")]
	InvalidSignature { signer: Address, reason: String },
	#[error("Owner {0} already signed")]
	DuplicateSigner(Address),
}

/// Lifecycle state of a Safe transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
	Built,
	HashComputed,
	/// Fewer signatures than the threshold.
	PartiallySigned,
	/// At least threshold signatures.
	FullySigned,
	Submitted,
	Confirmed,
	Reverted,
}

impl fmt::Display for TransactionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl TransactionState {
	/// Checks a transition against the static transition table.
	pub fn can_transition_to(self, next: TransactionState) -> bool {
		use TransactionState::*;

		static TRANSITIONS: Lazy<HashMap<TransactionState, HashSet<TransactionState>>> =
			Lazy::new(|| {
				let mut m = HashMap::new();
				m.insert(Built, HashSet::from([HashComputed]));
				m.insert(HashComputed, HashSet::from([PartiallySigned, FullySigned]));
				m.insert(PartiallySigned, HashSet::from([PartiallySigned, FullySigned]));
				m.insert(FullySigned, HashSet::from([FullySigned, Submitted]));
				m.insert(Submitted, HashSet::from([Confirmed, Reverted]));
				m.insert(Confirmed, HashSet::new()); // terminal
				m.insert(Reverted, HashSet::new()); // terminal
				m
			});

		TRANSITIONS
			.get(&self)
			.is_some_and(|allowed| allowed.contains(&next))
	}
}

/// A Safe transaction bound to a Safe, a chain and a nonce, with the owner
/// signatures collected so far.
#[derive(Debug, Clone)]
pub struct SafeTransaction {
	safe: Address,
	chain_id: u64,
	data: SafeTransactionData,
	threshold: u64,
	hash: Option<B256>,
	/// Keyed by signer so iteration yields ascending owner order, which is
	/// the order `checkNSignatures` requires.
	signatures: BTreeMap<Address, SafeSignature>,
	state: TransactionState,
	submitted_as: Option<TransactionHash>,
}

impl SafeTransaction {
	pub fn new(safe: Address, chain_id: u64, data: SafeTransactionData, threshold: u64) -> Self {
		Self {
			safe,
			chain_id,
			data,
			threshold,
			hash: None,
			signatures: BTreeMap::new(),
			state: TransactionState::Built,
			submitted_as: None,
		}
	}

	pub fn safe(&self) -> Address {
		self.safe
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	pub fn data(&self) -> &SafeTransactionData {
		&self.data
	}

	/// Signatures required by the Safe when the transaction was assembled.
	pub fn threshold(&self) -> u64 {
		self.threshold
	}

	pub fn state(&self) -> TransactionState {
		self.state
	}

	pub fn signature_count(&self) -> usize {
		self.signatures.len()
	}

	/// Signers in ascending address order.
	pub fn signers(&self) -> impl Iterator<Item = &Address> {
		self.signatures.keys()
	}

	/// Chain transaction that executed this Safe transaction, once submitted.
	pub fn submitted_as(&self) -> Option<TransactionHash> {
		self.submitted_as
	}

	pub fn safe_tx_hash(&self) -> Result<B256, StateError> {
		self.hash.ok_or(StateError::HashNotComputed)
	}

	fn transition(&mut self, next: TransactionState) -> Result<(), StateError> {
		if !self.state.can_transition_to(next) {
			return Err(StateError::InvalidTransition {
				from: self.state,
				to: next,
			});
		}
		self.state = next;
		Ok(())
	}

	/// Computes and stores the canonical hash.
	pub fn compute_hash(&mut self, hasher: &dyn SafeTxHasher) -> Result<B256, StateError> {
		self.transition(TransactionState::HashComputed)?;
		let hash = hasher.hash(self.safe, self.chain_id, &self.data);
		self.hash = Some(hash);
		Ok(hash)
	}

	/// Stores an owner signature after checking it recovers to its signer.
	pub fn add_signature(&mut self, signature: SafeSignature) -> Result<(), StateError> {
		let hash = self.safe_tx_hash()?;
		if self.signatures.contains_key(&signature.signer) {
			return Err(StateError::DuplicateSigner(signature.signer));
		}
		match signature.recover(&hash) {
			Ok(recovered) if recovered == signature.signer => {}
			Ok(recovered) => {
				return Err(StateError::InvalidSignature {
					signer: signature.signer,
					reason: format!("recovers to {}", recovered),
				})
			}
			Err(e) => {
				return Err(StateError::InvalidSignature {
					signer: signature.signer,
					reason: e.to_string(),
				})
			}
		}

		let next = if self.signatures.len() as u64 + 1 >= self.threshold {
			TransactionState::FullySigned
		} else {
			TransactionState::PartiallySigned
		};
		self.transition(next)?;
		self.signatures.insert(signature.signer, signature);
		Ok(())
	}

	/// Recomputes the hash and checks every stored signature against it.
	pub fn verify_signatures(&self, hasher: &dyn SafeTxHasher) -> Result<(), StateError> {
		let stored = self.safe_tx_hash()?;
		let recomputed = hasher.hash(self.safe, self.chain_id, &self.data);
		if stored != recomputed {
			return Err(StateError::HashMismatch { stored, recomputed });
		}

		for signature in self.signatures.values() {
			if !signature.is_valid_for(&stored) {
				return Err(StateError::InvalidSignature {
					signer: signature.signer,
					reason: "does not verify against the transaction hash".to_string(),
				});
			}
		}
		Ok(())
	}

	/// Concatenated signatures in ascending signer order, as `execTransaction`
	/// expects them.
	pub fn encoded_signatures(&self) -> Bytes {
		let mut out = Vec::with_capacity(self.signatures.len() * SIGNATURE_LENGTH);
		for signature in self.signatures.values() {
			out.extend_from_slice(&signature.data);
		}
		out.into()
	}

	pub fn mark_submitted(&mut self, hash: TransactionHash) -> Result<(), StateError> {
		self.transition(TransactionState::Submitted)?;
		self.submitted_as = Some(hash);
		Ok(())
	}

	pub fn mark_confirmed(&mut self) -> Result<(), StateError> {
		self.transition(TransactionState::Confirmed)
	}

	pub fn mark_reverted(&mut self) -> Result<(), StateError> {
		self.transition(TransactionState::Reverted)
	}
}
