//! Solana SPL-token settlement.
//!
//! Transfers go from the treasury's associated token account to the
//! recipient's. When the recipient has no token account yet, an idempotent
//! create-ATA instruction paid by the treasury is prepended.

use std::str::FromStr;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};

use crate::config::{ChainConfig, TreasuryKey};
use crate::error::{ChainError, Result};
use crate::{SettlementChain, SignatureStatus, TxReference};

/// SPL Token program ID.
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// Associated Token Account program ID.
pub const ATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// SPL Token `Transfer` instruction tag.
const TOKEN_TRANSFER_TAG: u8 = 3;

/// ATA program `CreateIdempotent` instruction tag.
const ATA_CREATE_IDEMPOTENT_TAG: u8 = 1;

/// Compute the associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

/// Build an SPL Token `Transfer` of `amount` smallest units.
#[must_use]
pub fn transfer_instruction(
    source: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER_TAG);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

/// Build an instruction creating `owner`'s token account unless it exists.
#[must_use]
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(associated_token_address(owner, mint), false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT_TAG],
    }
}

/// Parse a base58 wallet address.
///
/// Only on-curve keys are accepted: an off-curve address is a program-derived
/// account, which no user wallet can sign for.
///
/// # Errors
///
/// Returns `ChainError::InvalidAddress` if the address does not parse or is off-curve.
pub fn parse_wallet(address: &str) -> Result<Pubkey> {
    let pubkey =
        Pubkey::from_str(address).map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
    if !pubkey.is_on_curve() {
        return Err(ChainError::InvalidAddress(format!(
            "{address} is not a wallet address"
        )));
    }
    Ok(pubkey)
}

/// Settlement over Solana RPC, paying out an SPL token from the treasury.
pub struct SolanaChain {
    rpc: RpcClient,
    treasury: Keypair,
    mint: Pubkey,
    commitment: CommitmentConfig,
}

impl SolanaChain {
    /// Create a client. No network calls are made until a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error if the mint address or the treasury key is invalid.
    pub fn new(config: &ChainConfig, treasury: &TreasuryKey) -> Result<Self> {
        let mint = Pubkey::from_str(&config.mint)
            .map_err(|e| ChainError::Configuration(format!("invalid mint address: {e}")))?;
        let treasury = Keypair::try_from(treasury.as_bytes())
            .map_err(|e| ChainError::InvalidKeypair(e.to_string()))?;
        let commitment = CommitmentConfig::confirmed();
        let rpc = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            config.rpc_timeout,
            commitment,
        );

        Ok(Self {
            rpc,
            treasury,
            mint,
            commitment,
        })
    }

    /// Public key of the treasury wallet.
    #[must_use]
    pub fn treasury_pubkey(&self) -> Pubkey {
        self.treasury.pubkey()
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(response.value.is_some())
    }

    /// Instructions paying `units` to `recipient`'s token account.
    async fn transfer_instructions(&self, recipient: &Pubkey, units: u64) -> Result<Vec<Instruction>> {
        let treasury = self.treasury.pubkey();
        let source = associated_token_address(&treasury, &self.mint);
        let destination = associated_token_address(recipient, &self.mint);

        let mut instructions = Vec::with_capacity(2);
        if !self.account_exists(&destination).await? {
            tracing::debug!(%recipient, %destination, "Recipient token account missing, creating");
            instructions.push(create_associated_token_account_idempotent(
                &treasury, recipient, &self.mint,
            ));
        }
        instructions.push(transfer_instruction(&source, &destination, &treasury, units));
        Ok(instructions)
    }
}

#[async_trait]
impl SettlementChain for SolanaChain {
    fn validate_address(&self, address: &str) -> Result<()> {
        parse_wallet(address).map(|_| ())
    }

    async fn submit_transfer(&self, recipient: &str, units: u64) -> Result<TxReference> {
        let recipient = parse_wallet(recipient)?;
        let instructions = self.transfer_instructions(&recipient, units).await?;

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.treasury.pubkey()),
            &[&self.treasury],
            blockhash,
        );

        let signature = self
            .rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        tracing::info!(%signature, %recipient, units, "Settlement transfer submitted");
        Ok(TxReference::new(signature.to_string()))
    }

    async fn signature_status(&self, tx: &TxReference) -> Result<SignatureStatus> {
        let signature = Signature::from_str(tx.as_str())
            .map_err(|e| ChainError::Rpc(format!("invalid signature {tx}: {e}")))?;
        let statuses = self
            .rpc
            .get_signature_statuses(&[signature])
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let status = match statuses.value.into_iter().next().flatten() {
            None => SignatureStatus::Pending,
            Some(status) => match status.err {
                Some(err) => SignatureStatus::Rejected(err.to_string()),
                None if status.satisfies_commitment(self.commitment) => SignatureStatus::Confirmed,
                None => SignatureStatus::Pending,
            },
        };
        Ok(status)
    }
}
