use anchor_lang::prelude::*;
use anchor_lang::system_program::{transfer, Transfer};

pub const ORACLE_CONFIG_SEED: &[u8] = b"oracle_config";
pub const ENTROPY_REQUEST_SEED: &[u8] = b"entropy_request";

declare_id!("9Bd7xau9qbBi8ZksCk9TmgzcGFLWaHfCgys8hKcDygYu");

/// Minimal entropy oracle. The operator quotes a flat fee and later posts, for each
/// request, a random `u64` sealed to the Arcium MXE of the requesting program.
#[program]
pub mod entropy_oracle {
    use super::*;

    pub fn initialize_oracle(ctx: Context<InitializeOracle>, fee: u64) -> Result<()> {
        let oracle_config = &mut ctx.accounts.oracle_config;
        oracle_config.authority = ctx.accounts.authority.key();
        oracle_config.fee = fee;
        oracle_config.next_request_id = 0;
        oracle_config.bump = ctx.bumps.oracle_config;

        msg!("Entropy oracle initialized with fee {}", fee);
        Ok(())
    }

    pub fn set_fee(ctx: Context<SetFee>, fee: u64) -> Result<()> {
        ctx.accounts.oracle_config.fee = fee;
        msg!("Entropy fee set to {}", fee);
        Ok(())
    }

    pub fn get_fee(ctx: Context<ReadOracleConfig>) -> Result<u64> {
        Ok(ctx.accounts.oracle_config.fee)
    }

    /// Mints a pending request for `requester`. The whole `payment` moves to the
    /// oracle config account; nothing is refunded.
    pub fn request_entropy(
        ctx: Context<RequestEntropy>,
        tag: [u8; 32],
        payment: u64,
    ) -> Result<u64> {
        ctx.accounts.oracle_config.ensure_fee(payment)?;

        transfer(
            CpiContext::new(
                ctx.accounts.system_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.payer.to_account_info(),
                    to: ctx.accounts.oracle_config.to_account_info(),
                },
            ),
            payment,
        )?;

        let request_id = ctx.accounts.oracle_config.issue_request_id()?;
        let oracle_config = ctx.accounts.oracle_config.key();
        let requester = ctx.accounts.requester.key();

        let entropy_request = &mut ctx.accounts.entropy_request;
        entropy_request.oracle_config = oracle_config;
        entropy_request.id = request_id;
        entropy_request.requester = requester;
        entropy_request.tag = tag;
        entropy_request.fee_paid = payment;
        entropy_request.status = EntropyStatus::Pending;
        entropy_request.entropy = None;
        entropy_request.bump = ctx.bumps.entropy_request;

        emit!(EntropyRequestCreated {
            request_id,
            requester,
            tag,
            fee_paid: payment,
        });
        Ok(request_id)
    }

    pub fn fulfill_entropy(
        ctx: Context<FulfillEntropy>,
        request_id: u64,
        entropy: SealedEntropy,
    ) -> Result<()> {
        let entropy_request = &mut ctx.accounts.entropy_request;
        entropy_request.fulfill(entropy)?;

        msg!("Entropy request {} fulfilled", request_id);
        emit!(EntropyFulfilled {
            request_id,
            requester: entropy_request.requester,
        });
        Ok(())
    }

    pub fn is_request_fulfilled(ctx: Context<ReadEntropyRequest>, _request_id: u64) -> Result<bool> {
        Ok(ctx.accounts.entropy_request.is_fulfilled())
    }

    pub fn get_encrypted_entropy(
        ctx: Context<ReadEntropyRequest>,
        _request_id: u64,
    ) -> Result<SealedEntropy> {
        ctx.accounts
            .entropy_request
            .entropy()
            .ok_or_else(|| error!(ErrorCode::NotFulfilled))
    }
}

#[derive(Accounts)]
pub struct InitializeOracle<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,
    #[account(
        init,
        payer = authority,
        space = 8 + OracleConfig::INIT_SPACE,
        seeds = [ORACLE_CONFIG_SEED, authority.key().as_ref()],
        bump,
    )]
    pub oracle_config: Account<'info, OracleConfig>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct SetFee<'info> {
    pub authority: Signer<'info>,
    #[account(
        mut,
        has_one = authority @ ErrorCode::Unauthorized,
    )]
    pub oracle_config: Account<'info, OracleConfig>,
}

#[derive(Accounts)]
pub struct ReadOracleConfig<'info> {
    pub oracle_config: Account<'info, OracleConfig>,
}

#[derive(Accounts)]
pub struct RequestEntropy<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// Account the entropy is granted to; consumer programs sign with their PDA.
    pub requester: Signer<'info>,
    #[account(mut)]
    pub oracle_config: Account<'info, OracleConfig>,
    #[account(
        init,
        payer = payer,
        space = 8 + EntropyRequest::INIT_SPACE,
        seeds = [
            ENTROPY_REQUEST_SEED,
            oracle_config.key().as_ref(),
            &oracle_config.next_request_id.to_le_bytes(),
        ],
        bump,
    )]
    pub entropy_request: Account<'info, EntropyRequest>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(request_id: u64)]
pub struct FulfillEntropy<'info> {
    pub authority: Signer<'info>,
    #[account(has_one = authority @ ErrorCode::Unauthorized)]
    pub oracle_config: Account<'info, OracleConfig>,
    #[account(
        mut,
        seeds = [ENTROPY_REQUEST_SEED, oracle_config.key().as_ref(), &request_id.to_le_bytes()],
        bump = entropy_request.bump,
    )]
    pub entropy_request: Account<'info, EntropyRequest>,
}

#[derive(Accounts)]
#[instruction(request_id: u64)]
pub struct ReadEntropyRequest<'info> {
    pub oracle_config: Account<'info, OracleConfig>,
    #[account(
        seeds = [ENTROPY_REQUEST_SEED, oracle_config.key().as_ref(), &request_id.to_le_bytes()],
        bump = entropy_request.bump,
    )]
    pub entropy_request: Account<'info, EntropyRequest>,
}

#[account]
#[derive(InitSpace, Debug)]
pub struct OracleConfig {
    pub authority: Pubkey,
    pub fee: u64,
    pub next_request_id: u64,
    pub bump: u8,
}

impl OracleConfig {
    pub fn ensure_fee(&self, payment: u64) -> Result<()> {
        require_gte!(payment, self.fee, ErrorCode::InsufficientFee);
        Ok(())
    }

    pub fn issue_request_id(&mut self) -> Result<u64> {
        let request_id = self.next_request_id;
        self.next_request_id = request_id
            .checked_add(1)
            .ok_or_else(|| error!(ErrorCode::RequestIdOverflow))?;
        Ok(request_id)
    }
}

/// Random `u64` sealed with Rescue under the x25519 secret shared between the
/// oracle operator and the consumer's MXE.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct SealedEntropy {
    pub encryption_key: [u8; 32],
    pub nonce: u128,
    pub ciphertext: [u8; 32],
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum EntropyStatus {
    Pending,
    Fulfilled,
}

#[account]
#[derive(InitSpace, Debug)]
pub struct EntropyRequest {
    pub oracle_config: Pubkey,
    pub id: u64,
    pub requester: Pubkey,
    pub tag: [u8; 32],
    pub fee_paid: u64,
    pub status: EntropyStatus,
    pub entropy: Option<SealedEntropy>,
    pub bump: u8,
}

impl EntropyRequest {
    pub fn is_fulfilled(&self) -> bool {
        self.status == EntropyStatus::Fulfilled
    }

    /// Sealed value, available only once the request is fulfilled.
    pub fn entropy(&self) -> Option<SealedEntropy> {
        match self.status {
            EntropyStatus::Fulfilled => self.entropy,
            EntropyStatus::Pending => None,
        }
    }

    pub fn fulfill(&mut self, entropy: SealedEntropy) -> Result<()> {
        require!(
            self.status == EntropyStatus::Pending,
            ErrorCode::AlreadyFulfilled
        );
        self.status = EntropyStatus::Fulfilled;
        self.entropy = Some(entropy);
        Ok(())
    }
}

#[event]
pub struct EntropyRequestCreated {
    pub request_id: u64,
    pub requester: Pubkey,
    pub tag: [u8; 32],
    pub fee_paid: u64,
}

#[event]
pub struct EntropyFulfilled {
    pub request_id: u64,
    pub requester: Pubkey,
}

#[error_code]
pub enum ErrorCode {
    #[msg("Payment is below the quoted entropy fee")]
    InsufficientFee,
    #[msg("Entropy request is not fulfilled yet")]
    NotFulfilled,
    #[msg("Entropy request was already fulfilled")]
    AlreadyFulfilled,
    #[msg("Signer is not the oracle authority")]
    Unauthorized,
    #[msg("Request id space exhausted")]
    RequestIdOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::error::Error;

    fn config(fee: u64) -> OracleConfig {
        OracleConfig {
            authority: Pubkey::new_unique(),
            fee,
            next_request_id: 0,
            bump: 255,
        }
    }

    fn pending_request() -> EntropyRequest {
        EntropyRequest {
            oracle_config: Pubkey::new_unique(),
            id: 0,
            requester: Pubkey::new_unique(),
            tag: [7u8; 32],
            fee_paid: 10,
            status: EntropyStatus::Pending,
            entropy: None,
            bump: 254,
        }
    }

    #[test]
    fn fee_is_a_lower_bound() {
        let oracle = config(1_000);
        assert_eq!(
            oracle.ensure_fee(999).unwrap_err(),
            Error::from(ErrorCode::InsufficientFee)
        );
        assert!(oracle.ensure_fee(1_000).is_ok());
        assert!(oracle.ensure_fee(5_000).is_ok());
    }

    #[test]
    fn request_ids_are_sequential() {
        let mut oracle = config(0);
        assert_eq!(oracle.issue_request_id().unwrap(), 0);
        assert_eq!(oracle.issue_request_id().unwrap(), 1);
        assert_eq!(oracle.next_request_id, 2);
    }

    #[test]
    fn request_id_overflow_is_rejected() {
        let mut oracle = config(0);
        oracle.next_request_id = u64::MAX;
        assert_eq!(
            oracle.issue_request_id().unwrap_err(),
            Error::from(ErrorCode::RequestIdOverflow)
        );
        assert_eq!(oracle.next_request_id, u64::MAX);
    }

    #[test]
    fn entropy_hidden_until_fulfilled() {
        let mut request = pending_request();
        assert!(!request.is_fulfilled());
        assert_eq!(request.entropy(), None);

        let sealed = SealedEntropy {
            encryption_key: [3u8; 32],
            nonce: 42,
            ciphertext: [9u8; 32],
        };
        request.fulfill(sealed).unwrap();
        assert!(request.is_fulfilled());
        assert_eq!(request.entropy(), Some(sealed));
    }

    #[test]
    fn fulfillment_happens_once() {
        let mut request = pending_request();
        request.fulfill(SealedEntropy::default()).unwrap();
        assert_eq!(
            request.fulfill(SealedEntropy::default()).unwrap_err(),
            Error::from(ErrorCode::AlreadyFulfilled)
        );
    }
}
