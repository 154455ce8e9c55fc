//! Alloy-based EVM chain access.
//!
//! Reads go through `eth_call`. Execution is signed locally by the relayer
//! wallet and sent raw, so its hash is known before the node answers. Every
//! RPC request is bounded by the configured timeout so an unreachable
//! endpoint fails fast instead of hanging.

use crate::{logs, revert, ConnectionSettings, DeliveryError, DeliveryInterface};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::{local::PrivateKeySigner, Signer};
use alloy::sol_types::SolCall;
use alloy::transports::{RpcError, TransportErrorKind, TransportResult};
use async_trait::async_trait;
use safe_types::contracts::{IERC20, ISafe};
use safe_types::{
	truncate_hash, Address, Bytes, ConfirmationReceipt, SafeState, SafeTransactionData,
	SecretString, TransactionHash, B256, U256,
};
use std::future::IntoFuture;

/// Alloy-based chain access for a single EVM network.
pub struct AlloyDelivery {
	provider: DynProvider,
	wallet: EthereumWallet,
	relayer: Address,
	settings: ConnectionSettings,
}

impl AlloyDelivery {
	/// Creates a provider for `settings.rpc_url` and the relayer wallet.
	pub fn new(settings: ConnectionSettings, relayer: PrivateKeySigner) -> Result<Self, DeliveryError> {
		let url = settings.rpc_url.parse().map_err(|e| {
			DeliveryError::Network(format!("Invalid RPC URL '{}': {}", settings.rpc_url, e))
		})?;

		let relayer = relayer.with_chain_id(Some(settings.chain_id));
		let relayer_address = relayer.address();
		let wallet = EthereumWallet::from(relayer);

		let provider = ProviderBuilder::new().connect_http(url).erased();
		provider.client().set_poll_interval(settings.poll_interval);

		Ok(Self {
			provider,
			wallet,
			relayer: relayer_address,
			settings,
		})
	}

	/// Runs one RPC request under the configured timeout.
	async fn rpc<T, F>(&self, what: &str, request: F) -> Result<T, DeliveryError>
	where
		F: IntoFuture<Output = TransportResult<T>>,
	{
		match tokio::time::timeout(self.settings.rpc_timeout, request).await {
			Ok(result) => result.map_err(|e| classify_rpc_error(what, e)),
			Err(_) => Err(DeliveryError::Timeout(format!(
				"{} timed out after {}s",
				what,
				self.settings.rpc_timeout.as_secs()
			))),
		}
	}

	/// Performs a read-only contract call and decodes its return value.
	async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, DeliveryError> {
		let request = TransactionRequest::default()
			.to(to)
			.input(call.abi_encode().into());
		let output = self.rpc(C::SIGNATURE, self.provider.call(request)).await?;

		C::abi_decode_returns(&output)
			.map_err(|e| DeliveryError::Decode(format!("{} returned malformed data: {}", C::SIGNATURE, e)))
	}

	/// `execTransaction` request from the relayer.
	fn exec_request(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
	) -> TransactionRequest {
		let call = ISafe::execTransactionCall {
			to: tx.to,
			value: tx.value,
			data: tx.data.clone(),
			operation: tx.operation.as_u8(),
			safeTxGas: tx.safe_tx_gas,
			baseGas: tx.base_gas,
			gasPrice: tx.gas_price,
			gasToken: tx.gas_token,
			refundReceiver: tx.refund_receiver,
			signatures: signatures.clone(),
		};

		TransactionRequest::default()
			.from(self.relayer)
			.to(safe)
			.input(call.abi_encode().into())
	}

	async fn fetch_receipt(
		&self,
		hash: &TransactionHash,
		safe: Address,
	) -> Result<Option<(ConfirmationReceipt, u64)>, DeliveryError> {
		let receipt = self
			.rpc(
				"eth_getTransactionReceipt",
				self.provider.get_transaction_receipt(hash.0),
			)
			.await?;

		Ok(receipt.and_then(|receipt| {
			let block_number = receipt.block_number?;
			let logs: Vec<_> = receipt
				.inner
				.logs()
				.iter()
				.map(|log| log.inner.clone())
				.collect();
			let confirmation = logs::build_receipt(
				TransactionHash(receipt.transaction_hash),
				block_number,
				receipt.status(),
				receipt.gas_used,
				&logs,
				safe,
			);
			Some((confirmation, block_number))
		}))
	}
}

/// Maps an RPC error to a delivery error, keeping revert reasons.
fn classify_rpc_error(what: &str, err: RpcError<TransportErrorKind>) -> DeliveryError {
	if let Some(payload) = err.as_error_resp() {
		if let Some(data) = payload.as_revert_data() {
			return DeliveryError::Reverted {
				reason: revert::reason_from_revert_data(&data),
			};
		}
		if revert::is_revert_message(&payload.message) {
			return DeliveryError::Reverted {
				reason: revert::reason_from_message(&payload.message),
			};
		}
	}
	DeliveryError::Network(format!("{} failed: {}", what, err))
}

/// Classifies a failed raw send of the transaction `hash`.
///
/// An error response means the node refused the transaction. Anything else
/// leaves its fate open.
fn classify_send_error(hash: TransactionHash, err: RpcError<TransportErrorKind>) -> DeliveryError {
	if err.as_error_resp().is_none() {
		return DeliveryError::SubmissionUnknown {
			hash,
			reason: format!("eth_sendRawTransaction failed: {}", err),
		};
	}
	match classify_rpc_error("eth_sendRawTransaction", err) {
		DeliveryError::Network(msg) => DeliveryError::Rejected(msg),
		other => other,
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	async fn chain_id(&self) -> Result<u64, DeliveryError> {
		self.rpc("eth_chainId", self.provider.get_chain_id()).await
	}

	async fn code_size(&self, address: Address) -> Result<usize, DeliveryError> {
		let code = self
			.rpc("eth_getCode", self.provider.get_code_at(address))
			.await?;
		Ok(code.len())
	}

	async fn safe_state(&self, safe: Address) -> Result<SafeState, DeliveryError> {
		let (nonce, threshold, owners, version) = tokio::try_join!(
			self.read(safe, ISafe::nonceCall {}),
			self.read(safe, ISafe::getThresholdCall {}),
			self.read(safe, ISafe::getOwnersCall {}),
			self.read(safe, ISafe::VERSIONCall {}),
		)?;

		let threshold = u64::try_from(threshold)
			.map_err(|_| DeliveryError::Decode(format!("Threshold {} out of range", threshold)))?;

		Ok(SafeState {
			address: safe,
			nonce,
			threshold,
			owners,
			version,
		})
	}

	async fn safe_transaction_hash(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
	) -> Result<B256, DeliveryError> {
		let call = ISafe::getTransactionHashCall {
			to: tx.to,
			value: tx.value,
			data: tx.data.clone(),
			operation: tx.operation.as_u8(),
			safeTxGas: tx.safe_tx_gas,
			baseGas: tx.base_gas,
			gasPrice: tx.gas_price,
			gasToken: tx.gas_token,
			refundReceiver: tx.refund_receiver,
			_nonce: tx.nonce,
		};
		self.read(safe, call).await
	}

	async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, DeliveryError> {
		self.read(token, IERC20::balanceOfCall { account: holder })
			.await
	}

	async fn native_balance(&self, address: Address) -> Result<U256, DeliveryError> {
		self.rpc("eth_getBalance", self.provider.get_balance(address))
			.await
	}

	fn relayer_address(&self) -> Address {
		self.relayer
	}

	async fn gas_price(&self) -> Result<u128, DeliveryError> {
		self.rpc("eth_gasPrice", self.provider.get_gas_price()).await
	}

	async fn simulate_execution(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
	) -> Result<u64, DeliveryError> {
		let request = self.exec_request(safe, tx, signatures);

		let output = self
			.rpc("execTransaction simulation", self.provider.call(request.clone()))
			.await?;
		let success = ISafe::execTransactionCall::abi_decode_returns(&output).map_err(|e| {
			DeliveryError::Decode(format!("execTransaction returned malformed data: {}", e))
		})?;
		if !success {
			return Err(DeliveryError::Reverted {
				reason: "Safe reported the inner call as failed".to_string(),
			});
		}

		let gas = self
			.rpc("execTransaction gas estimation", self.provider.estimate_gas(request))
			.await?;
		tracing::debug!(safe = %safe, gas, "Simulated execTransaction");
		Ok(gas)
	}

	async fn execute(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
		gas_limit: u64,
	) -> Result<TransactionHash, DeliveryError> {
		let nonce = self
			.rpc(
				"eth_getTransactionCount",
				self.provider.get_transaction_count(self.relayer).pending(),
			)
			.await?;
		let fees = self
			.rpc("fee estimation", self.provider.estimate_eip1559_fees())
			.await?;

		let request = self
			.exec_request(safe, tx, signatures)
			.gas_limit(gas_limit)
			.nonce(nonce)
			.max_fee_per_gas(fees.max_fee_per_gas)
			.max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
			.with_chain_id(self.settings.chain_id);
		let envelope = request.build(&self.wallet).await.map_err(|e| {
			DeliveryError::Rejected(format!("Failed to sign execTransaction: {}", e))
		})?;
		let hash = TransactionHash(*envelope.tx_hash());

		match tokio::time::timeout(
			self.settings.rpc_timeout,
			self.provider.send_tx_envelope(envelope),
		)
		.await
		{
			Ok(Ok(_)) => {}
			Ok(Err(e)) => return Err(classify_send_error(hash, e)),
			Err(_) => {
				return Err(DeliveryError::SubmissionUnknown {
					hash,
					reason: format!(
						"eth_sendRawTransaction timed out after {}s",
						self.settings.rpc_timeout.as_secs()
					),
				})
			}
		}

		tracing::info!(
			tx_hash = %truncate_hash(&hash.0),
			nonce,
			chain_id = self.settings.chain_id,
			"Submitted execTransaction"
		);
		Ok(hash)
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		safe: Address,
		confirmations: u64,
	) -> Result<ConfirmationReceipt, DeliveryError> {
		let max_wait_time = self.settings.confirmation_timeout;
		let start_time = tokio::time::Instant::now();

		tracing::info!(
			"Waiting for {} confirmations (timeout: {}s)",
			confirmations,
			max_wait_time.as_secs()
		);

		loop {
			if start_time.elapsed() > max_wait_time {
				return Err(DeliveryError::Timeout(format!(
					"Transaction {} not confirmed after {} seconds",
					hash,
					max_wait_time.as_secs()
				)));
			}

			let Some((receipt, tx_block)) = self.fetch_receipt(hash, safe).await? else {
				tokio::time::sleep(self.settings.poll_interval).await;
				continue;
			};

			let current_block = self
				.rpc("eth_blockNumber", self.provider.get_block_number())
				.await?;
			let current_confirmations = current_block.saturating_sub(tx_block) + 1;

			if current_confirmations >= confirmations {
				return Ok(receipt);
			}

			tracing::debug!(
				"Waiting for {} more confirmations...",
				confirmations.saturating_sub(current_confirmations)
			);
			tokio::time::sleep(self.settings.poll_interval).await;
		}
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		safe: Address,
	) -> Result<Option<ConfirmationReceipt>, DeliveryError> {
		Ok(self
			.fetch_receipt(hash, safe)
			.await?
			.map(|(receipt, _)| receipt))
	}
}

/// Factory function to create an HTTP-based chain client.
pub fn create_http_delivery(
	settings: &ConnectionSettings,
	relayer_key: &SecretString,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	let relayer: PrivateKeySigner = relayer_key.with_exposed(|key| {
		key.trim()
			.parse()
			.map_err(|_| DeliveryError::Network("Invalid relayer private key format".to_string()))
	})?;

	Ok(Box::new(AlloyDelivery::new(settings.clone(), relayer)?))
}

/// Registry for the HTTP/Alloy delivery implementation.
pub struct Registry;

impl safe_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::DeliveryFactory;

	fn factory() -> Self::Factory {
		create_http_delivery
	}
}

impl crate::DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	const RELAYER_KEY: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

	fn settings(rpc_url: &str) -> ConnectionSettings {
		ConnectionSettings {
			chain_id: 169,
			rpc_url: rpc_url.to_string(),
			rpc_timeout: Duration::from_secs(5),
			poll_interval: Duration::from_secs(1),
			confirmation_timeout: Duration::from_secs(10),
		}
	}

	#[tokio::test]
	async fn test_relayer_address_from_key() {
		let delivery = create_http_delivery(
			&settings("http://127.0.0.1:8545"),
			&SecretString::from(RELAYER_KEY),
		)
		.unwrap();

		assert_eq!(
			delivery.relayer_address(),
			alloy::primitives::address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC")
		);
	}

	#[tokio::test]
	async fn test_invalid_relayer_key_rejected() {
		let result = create_http_delivery(
			&settings("http://127.0.0.1:8545"),
			&SecretString::from("0x1234"),
		);

		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_invalid_rpc_url_rejected() {
		let result = create_http_delivery(&settings("not a url"), &SecretString::from(RELAYER_KEY));

		assert!(matches!(result, Err(DeliveryError::Network(_))));
	}

	#[tokio::test]
	async fn test_unreachable_endpoint_is_network_error() {
		// Port 1 is reserved and never listening.
		let delivery = create_http_delivery(
			&settings("http://127.0.0.1:1"),
			&SecretString::from(RELAYER_KEY),
		)
		.unwrap();

		let err = delivery.chain_id().await.unwrap_err();

		assert!(matches!(err, DeliveryError::Network(_)));
	}

	#[test]
	fn test_send_without_answer_keeps_hash() {
		let hash = TransactionHash(B256::repeat_byte(0xab));
		let err = RpcError::<TransportErrorKind>::local_usage_str("connection reset");

		assert!(matches!(
			classify_send_error(hash, err),
			DeliveryError::SubmissionUnknown { hash: h, .. } if h == hash
		));
	}

	#[test]
	fn test_send_error_response_is_rejection() {
		let hash = TransactionHash(B256::repeat_byte(0xab));
		let err: RpcError<TransportErrorKind> = RpcError::ErrorResp(
			serde_json::from_str(r#"{"code":-32000,"message":"nonce too low"}"#).unwrap(),
		);

		assert!(matches!(
			classify_send_error(hash, err),
			DeliveryError::Rejected(msg) if msg.contains("nonce too low")
		));
	}

	#[test]
	fn test_classify_transport_error_as_network() {
		let err = RpcError::<TransportErrorKind>::local_usage_str("boom");

		assert!(matches!(
			classify_rpc_error("eth_call", err),
			DeliveryError::Network(msg) if msg.contains("eth_call")
		));
	}
}
