//! Solidity bindings for the contracts the relay talks to.
//!
//! Covers the subset of the Safe singleton, ERC-20 token and MultiSend
//! interfaces used to build, hash, execute and confirm a transfer.

use alloy::sol;

sol! {
	/// Safe singleton interface (v1.1.1 - v1.4.1).
	interface ISafe {
		function VERSION() external view returns (string memory);
		function nonce() external view returns (uint256);
		function getThreshold() external view returns (uint256);
		function getOwners() external view returns (address[] memory);

		function getTransactionHash(
			address to,
			uint256 value,
			bytes calldata data,
			uint8 operation,
			uint256 safeTxGas,
			uint256 baseGas,
			uint256 gasPrice,
			address gasToken,
			address refundReceiver,
			uint256 _nonce
		) external view returns (bytes32);

		function execTransaction(
			address to,
			uint256 value,
			bytes calldata data,
			uint8 operation,
			uint256 safeTxGas,
			uint256 baseGas,
			uint256 gasPrice,
			address gasToken,
			address payable refundReceiver,
			bytes memory signatures
		) external payable returns (bool success);

		event ExecutionSuccess(bytes32 txHash, uint256 payment);
		event ExecutionFailure(bytes32 txHash, uint256 payment);
	}

	/// ERC-20 subset used for the transfer and its confirmation.
	interface IERC20 {
		function balanceOf(address account) external view returns (uint256);
		function transfer(address to, uint256 amount) external returns (bool);

		event Transfer(address indexed from, address indexed to, uint256 value);
	}

	/// MultiSend batches packed calls into a single delegate call.
	interface IMultiSend {
		function multiSend(bytes memory transactions) external payable;
	}

	/// EIP-712 `SafeTx` struct as hashed by the Safe contract.
	struct SafeTx {
		address to;
		uint256 value;
		bytes data;
		uint8 operation;
		uint256 safeTxGas;
		uint256 baseGas;
		uint256 gasPrice;
		address gasToken;
		address refundReceiver;
		uint256 nonce;
	}
}
