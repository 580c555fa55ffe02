//! Safe contract ABI surface consumed by the pipeline.
//!
//! Only the owner-list reads, the wallet nonce and the execution entry point are needed.
//! `swapOwner` itself is encoded by hand in [`crate::encoder`].

use alloy_sol_types::sol;

sol! {
    interface ISafe {
        function getOwners() external view returns (address[] memory);
        function getThreshold() external view returns (uint256);
        function nonce() external view returns (uint256);
        function swapOwner(address prevOwner, address oldOwner, address newOwner) external;
        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes memory signatures
        ) external payable returns (bool success);
    }
}
