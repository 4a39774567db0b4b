//! Typed binding for the crowdfunding contract.
//!
//! The contract has no bulk enumeration function: the funder list can only
//! be walked one index at a time through `getFunder`.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::amount::Amount;
use crate::errors::Result;
use crate::ports::{CallContext, RemoteRead};

sol! {
    /// Targets deployments exposing `getAddressToAmountFunded(address)`.
    /// Builds of the contract that spell it `getAddressToAmmountFunded` have
    /// a different selector; against those every balance read reverts and
    /// totals read as zero.
    #[derive(Debug)]
    interface IFundContract {
        function fund() external payable;
        function withdraw() external;
        function getOwner() external view returns (address);
        function getFunder(uint256 index) external view returns (address);
        function getAddressToAmountFunded(address funder) external view returns (uint256);
    }
}

/// Read helpers over a [`RemoteRead`] port plus calldata for the writes.
#[derive(Clone)]
pub struct FundContract {
    reader: Arc<dyn RemoteRead>,
}

impl FundContract {
    pub fn new(reader: Arc<dyn RemoteRead>) -> Self {
        Self { reader }
    }

    /// Get the contract owner
    pub async fn owner(&self, ctx: &CallContext) -> Result<Address> {
        let call = IFundContract::getOwnerCall {};
        let raw = self.reader.read(ctx, call.abi_encode().into()).await?;
        Ok(IFundContract::getOwnerCall::abi_decode_returns(&raw, true)?._0)
    }

    /// Get the funder recorded at `index`; fails past the end of the list
    pub async fn funder(&self, ctx: &CallContext, index: u64) -> Result<Address> {
        let call = IFundContract::getFunderCall {
            index: U256::from(index),
        };
        let raw = self.reader.read(ctx, call.abi_encode().into()).await?;
        Ok(IFundContract::getFunderCall::abi_decode_returns(&raw, true)?._0)
    }

    /// Get the amount funded by `funder`
    pub async fn amount_funded(&self, ctx: &CallContext, funder: Address) -> Result<Amount> {
        let call = IFundContract::getAddressToAmountFundedCall { funder };
        let raw = self.reader.read(ctx, call.abi_encode().into()).await?;
        let wei = IFundContract::getAddressToAmountFundedCall::abi_decode_returns(&raw, true)?._0;
        Ok(Amount::from_wei(wei))
    }

    pub fn fund_calldata() -> Bytes {
        IFundContract::fundCall {}.abi_encode().into()
    }

    pub fn withdraw_calldata() -> Bytes {
        IFundContract::withdrawCall {}.abi_encode().into()
    }
}
