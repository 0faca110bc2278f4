use anchor_lang::prelude::*;
use arcium_anchor::prelude::*;
use arcium_client::idl::arcium::types::CallbackAccount;
use entropy_oracle::program::EntropyOracle;
use entropy_oracle::{OracleConfig, ENTROPY_REQUEST_SEED};

pub mod sealed;
pub mod state;

pub use sealed::{Granted, InputProof, SealedValue};
pub use state::{Comparator, Lifecycle, RequestRecord, RequestStatus};

const COMP_DEF_OFFSET_COMPARE_VALUES: u32 = comp_def_offset("compare_values");
const COMP_DEF_OFFSET_COMPARE_WITH_ENTROPY: u32 = comp_def_offset("compare_with_entropy");
pub const COMPARATOR_SEED: &[u8] = b"comparator";
pub const REQUEST_RECORD_SEED: &[u8] = b"request_record";

declare_id!("5fht6kXG4NqjHXKfWZ7GzRAo236mCiDnSEPSJ79qryeX");

#[arcium_program]
pub mod entropy_comparator {
    use super::*;

    pub fn init_compare_values_comp_def(ctx: Context<InitCompareValuesCompDef>) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    pub fn init_compare_with_entropy_comp_def(
        ctx: Context<InitCompareWithEntropyCompDef>,
    ) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    pub fn create_comparator(ctx: Context<CreateComparator>, entropy_oracle: Pubkey) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        ctx.accounts
            .comparator
            .open(authority, entropy_oracle, ctx.bumps.comparator)?;

        msg!("Comparator created against entropy oracle {}", entropy_oracle);
        Ok(())
    }

    pub fn initialize(
        ctx: Context<Initialize>,
        encrypted_a: [u8; 32],
        encrypted_b: [u8; 32],
        proof_a: InputProof,
        proof_b: InputProof,
    ) -> Result<()> {
        let comparator_key = ctx.accounts.comparator.key();
        let initializer = ctx.accounts.initializer.key();
        ctx.accounts.comparator.store_operands(
            comparator_key,
            initializer,
            (encrypted_a, &proof_a),
            (encrypted_b, &proof_b),
        )?;

        msg!("Operands stored by {}", initializer);
        emit!(ValuesInitialized {
            comparator: comparator_key,
            initializer,
        });
        Ok(())
    }

    pub fn request_entropy(ctx: Context<RequestEntropy>, tag: [u8; 32], payment: u64) -> Result<u64> {
        ctx.accounts.comparator.ensure_ready()?;
        require_keys_eq!(
            ctx.accounts.oracle_config.key(),
            ctx.accounts.comparator.entropy_oracle,
            ErrorCode::OracleMismatch
        );
        state::ensure_fee(payment, ctx.accounts.oracle_config.fee)?;
        let expected_id = ctx.accounts.oracle_config.next_request_id;

        let authority = ctx.accounts.comparator.authority;
        let bump = [ctx.accounts.comparator.bump];
        let signer_seeds: &[&[&[u8]]] = &[&[COMPARATOR_SEED, authority.as_ref(), &bump]];

        let request_id = entropy_oracle::cpi::request_entropy(
            CpiContext::new_with_signer(
                ctx.accounts.entropy_oracle_program.to_account_info(),
                entropy_oracle::cpi::accounts::RequestEntropy {
                    payer: ctx.accounts.payer.to_account_info(),
                    requester: ctx.accounts.comparator.to_account_info(),
                    oracle_config: ctx.accounts.oracle_config.to_account_info(),
                    entropy_request: ctx.accounts.oracle_request.to_account_info(),
                    system_program: ctx.accounts.system_program.to_account_info(),
                },
                signer_seeds,
            ),
            tag,
            payment,
        )?
        .get();
        state::ensure_issued_id(request_id, expected_id)?;

        let comparator_key = ctx.accounts.comparator.key();
        let caller = ctx.accounts.payer.key();
        ctx.accounts.request_record.set_inner(RequestRecord::issue(
            comparator_key,
            request_id,
            tag,
            caller,
            payment,
            ctx.bumps.request_record,
        ));
        ctx.accounts.comparator.record_request();

        msg!("Entropy request {} issued for {}", request_id, caller);
        emit!(EntropyRequested {
            comparator: comparator_key,
            request_id,
            caller,
        });
        Ok(request_id)
    }

    pub fn compare(ctx: Context<Compare>, computation_offset: u64) -> Result<()> {
        let comparator_key = ctx.accounts.comparator.key();
        let args = {
            let (lhs, rhs) = ctx.accounts.comparator.operands(&comparator_key)?;
            rhs.bind(lhs.bind(ArgBuilder::new())).build()
        };

        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        let callback_accounts = vec![CallbackAccount {
            pubkey: comparator_key,
            is_writable: false,
        }];

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            vec![CompareValuesCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &callback_accounts,
            )?],
            1,
            0,
        )?;
        Ok(())
    }

    #[arcium_callback(encrypted_ix = "compare_values")]
    pub fn compare_values_callback(
        ctx: Context<CompareValuesCallback>,
        output: SignedComputationOutputs<CompareValuesOutput>,
    ) -> Result<()> {
        let o = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(CompareValuesOutput { field_0 }) => field_0,
            Err(_) => return Err(ErrorCode::AbortedComputation.into()),
        };

        emit!(ComparisonPerformed {
            comparator: ctx.accounts.comparator.key(),
            result: o.ciphertexts[0],
            nonce: o.nonce.to_le_bytes(),
        });
        Ok(())
    }

    pub fn compare_with_entropy(
        ctx: Context<CompareWithEntropy>,
        computation_offset: u64,
        request_id: u64,
    ) -> Result<()> {
        let comparator_key = ctx.accounts.comparator.key();

        let record = {
            let info = ctx.accounts.request_record.to_account_info();
            let data = info.try_borrow_data()?;
            state::decode_record(info.owner, &data)?
        };
        let oracle_request = {
            let info = ctx.accounts.oracle_request.to_account_info();
            let data = info.try_borrow_data()?;
            state::decode_oracle_request(info.owner, &data)?
        };

        let (record, entropy) = ctx.accounts.comparator.admit_entropy_request(
            &comparator_key,
            record,
            oracle_request.as_ref(),
        )?;

        let args = {
            let (lhs, rhs) = ctx.accounts.comparator.operands(&comparator_key)?;
            let mix = entropy.grant_for(&comparator_key)?;
            mix.bind(rhs.bind(lhs.bind(ArgBuilder::new()))).build()
        };

        record.write_to(&mut ctx.accounts.request_record.try_borrow_mut_data()?)?;
        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        msg!("Entropy request {} consumed", request_id);

        let callback_accounts = vec![
            CallbackAccount {
                pubkey: comparator_key,
                is_writable: false,
            },
            CallbackAccount {
                pubkey: ctx.accounts.request_record.key(),
                is_writable: false,
            },
        ];

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            vec![CompareWithEntropyCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &callback_accounts,
            )?],
            1,
            0,
        )?;
        Ok(())
    }

    #[arcium_callback(encrypted_ix = "compare_with_entropy")]
    pub fn compare_with_entropy_callback(
        ctx: Context<CompareWithEntropyCallback>,
        output: SignedComputationOutputs<CompareWithEntropyOutput>,
    ) -> Result<()> {
        let o = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(CompareWithEntropyOutput { field_0 }) => field_0,
            Err(_) => return Err(ErrorCode::AbortedComputation.into()),
        };

        emit!(EntropyComparisonPerformed {
            comparator: ctx.accounts.comparator.key(),
            request_id: ctx.accounts.request_record.request_id,
            result: o.ciphertexts[0],
            nonce: o.nonce.to_le_bytes(),
        });
        Ok(())
    }

    pub fn is_initialized(ctx: Context<ReadComparator>) -> Result<bool> {
        Ok(ctx.accounts.comparator.is_initialized())
    }

    pub fn get_entropy_oracle(ctx: Context<ReadComparator>) -> Result<Pubkey> {
        Ok(ctx.accounts.comparator.entropy_oracle)
    }

    pub fn is_request_pending(ctx: Context<ReadRequestRecord>, _request_id: u64) -> Result<bool> {
        let info = ctx.accounts.request_record.to_account_info();
        let data = info.try_borrow_data()?;
        Ok(state::decode_record(info.owner, &data)?
            .is_some_and(|record| record.is_pending()))
    }

    pub fn get_requests_issued(ctx: Context<ReadComparator>) -> Result<u64> {
        Ok(ctx.accounts.comparator.requests_issued)
    }

    pub fn get_request_record(
        ctx: Context<ReadRequestRecord>,
        _request_id: u64,
    ) -> Result<RequestRecord> {
        let info = ctx.accounts.request_record.to_account_info();
        let data = info.try_borrow_data()?;
        state::lookup_record(info.owner, &data)
    }
}

#[derive(Accounts)]
pub struct CreateComparator<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,
    #[account(
        init,
        payer = authority,
        space = 8 + Comparator::INIT_SPACE,
        seeds = [COMPARATOR_SEED, authority.key().as_ref()],
        bump,
    )]
    pub comparator: Account<'info, Comparator>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    pub initializer: Signer<'info>,
    #[account(
        mut,
        seeds = [COMPARATOR_SEED, comparator.authority.as_ref()],
        bump = comparator.bump,
    )]
    pub comparator: Box<Account<'info, Comparator>>,
}

#[derive(Accounts)]
#[instruction(tag: [u8; 32], payment: u64)]
pub struct RequestEntropy<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(
        mut,
        seeds = [COMPARATOR_SEED, comparator.authority.as_ref()],
        bump = comparator.bump,
    )]
    pub comparator: Box<Account<'info, Comparator>>,
    #[account(mut)]
    pub oracle_config: Box<Account<'info, OracleConfig>>,
    #[account(mut)]
    /// CHECK: created and validated by the entropy oracle during the CPI.
    pub oracle_request: UncheckedAccount<'info>,
    #[account(
        init,
        payer = payer,
        space = 8 + RequestRecord::INIT_SPACE,
        seeds = [
            REQUEST_RECORD_SEED,
            comparator.key().as_ref(),
            &oracle_config.next_request_id.to_le_bytes(),
        ],
        bump,
    )]
    pub request_record: Box<Account<'info, RequestRecord>>,
    pub entropy_oracle_program: Program<'info, EntropyOracle>,
    pub system_program: Program<'info, System>,
}

#[queue_computation_accounts("compare_values", payer)]
#[derive(Accounts)]
#[instruction(computation_offset: u64)]
pub struct Compare<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(
        seeds = [COMPARATOR_SEED, comparator.authority.as_ref()],
        bump = comparator.bump,
    )]
    pub comparator: Box<Account<'info, Comparator>>,
    #[account(
        init_if_needed,
        space = 9,
        payer = payer,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(
        mut,
        address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub mempool_account: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub executing_pool: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_COMPARE_VALUES))]
    pub comp_def_account: Box<Account<'info, ComputationDefinitionAccount>>,
    #[account(
        mut,
        address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    pub cluster_account: Box<Account<'info, Cluster>>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("compare_values")]
#[derive(Accounts)]
pub struct CompareValuesCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_COMPARE_VALUES))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: checked by arcium program via callback constraints.
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: checked by the account constraint
    pub instructions_sysvar: AccountInfo<'info>,
    pub comparator: Box<Account<'info, Comparator>>,
}

#[queue_computation_accounts("compare_with_entropy", payer)]
#[derive(Accounts)]
#[instruction(computation_offset: u64, request_id: u64)]
pub struct CompareWithEntropy<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(
        seeds = [COMPARATOR_SEED, comparator.authority.as_ref()],
        bump = comparator.bump,
    )]
    pub comparator: Box<Account<'info, Comparator>>,
    #[account(
        mut,
        seeds = [REQUEST_RECORD_SEED, comparator.key().as_ref(), &request_id.to_le_bytes()],
        bump,
    )]
    /// CHECK: may not exist; decoded in the handler so unknown ids fail as InvalidRequestId.
    pub request_record: UncheckedAccount<'info>,
    #[account(
        seeds = [ENTROPY_REQUEST_SEED, comparator.entropy_oracle.as_ref(), &request_id.to_le_bytes()],
        seeds::program = entropy_oracle::ID,
        bump,
    )]
    /// CHECK: owner and layout checked in the handler.
    pub oracle_request: UncheckedAccount<'info>,
    #[account(
        init_if_needed,
        space = 9,
        payer = payer,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(
        mut,
        address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub mempool_account: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub executing_pool: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet)
    )]
    /// CHECK: checked by the arcium program.
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_COMPARE_WITH_ENTROPY))]
    pub comp_def_account: Box<Account<'info, ComputationDefinitionAccount>>,
    #[account(
        mut,
        address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet)
    )]
    pub cluster_account: Box<Account<'info, Cluster>>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("compare_with_entropy")]
#[derive(Accounts)]
pub struct CompareWithEntropyCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_COMPARE_WITH_ENTROPY))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: checked by arcium program via callback constraints.
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: checked by the account constraint
    pub instructions_sysvar: AccountInfo<'info>,
    pub comparator: Box<Account<'info, Comparator>>,
    #[account(constraint = request_record.comparator == comparator.key() @ ErrorCode::InvalidRequestId)]
    pub request_record: Box<Account<'info, RequestRecord>>,
}

#[init_computation_definition_accounts("compare_values", payer)]
#[derive(Accounts)]
pub struct InitCompareValuesCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(
        mut,
        address = derive_mxe_pda!()
    )]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_mxe_lut_pda!(mxe_account.lut_offset_slot)
    )]
    /// CHECK: checked by arcium program
    pub address_lookup_table: UncheckedAccount<'info>,
    #[account(address = LUT_PROGRAM_ID)]
    /// CHECK: LUT program
    pub lut_program: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

#[init_computation_definition_accounts("compare_with_entropy", payer)]
#[derive(Accounts)]
pub struct InitCompareWithEntropyCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(
        mut,
        address = derive_mxe_pda!()
    )]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    #[account(
        mut,
        address = derive_mxe_lut_pda!(mxe_account.lut_offset_slot)
    )]
    /// CHECK: checked by arcium program
    pub address_lookup_table: UncheckedAccount<'info>,
    #[account(address = LUT_PROGRAM_ID)]
    /// CHECK: LUT program
    pub lut_program: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct ReadComparator<'info> {
    pub comparator: Account<'info, Comparator>,
}

#[derive(Accounts)]
#[instruction(request_id: u64)]
pub struct ReadRequestRecord<'info> {
    pub comparator: Account<'info, Comparator>,
    #[account(
        seeds = [REQUEST_RECORD_SEED, comparator.key().as_ref(), &request_id.to_le_bytes()],
        bump,
    )]
    /// CHECK: may not exist; an absent record reads as not pending.
    pub request_record: UncheckedAccount<'info>,
}

#[event]
pub struct ValuesInitialized {
    pub comparator: Pubkey,
    pub initializer: Pubkey,
}

#[event]
pub struct EntropyRequested {
    pub comparator: Pubkey,
    pub request_id: u64,
    pub caller: Pubkey,
}

#[event]
pub struct ComparisonPerformed {
    pub comparator: Pubkey,
    pub result: [u8; 32],
    pub nonce: [u8; 16],
}

#[event]
pub struct EntropyComparisonPerformed {
    pub comparator: Pubkey,
    pub request_id: u64,
    pub result: [u8; 32],
    pub nonce: [u8; 16],
}

#[error_code]
pub enum ErrorCode {
    #[msg("The computation was aborted")]
    AbortedComputation,
    #[msg("Cluster not set")]
    ClusterNotSet,
    #[msg("Entropy oracle address must not be the default key")]
    ZeroOracleAddress,
    #[msg("Oracle account does not match the comparator's entropy oracle")]
    OracleMismatch,
    #[msg("Operands are already initialized")]
    AlreadyInitialized,
    #[msg("Operands are not initialized")]
    NotInitialized,
    #[msg("Encryption proof is invalid")]
    InvalidProof,
    #[msg("Payment is below the oracle fee")]
    InsufficientFee,
    #[msg("Unknown or already consumed entropy request")]
    InvalidRequestId,
    #[msg("Entropy request is not fulfilled yet")]
    EntropyNotReady,
    #[msg("Oracle returned an unexpected request id")]
    RequestIdMismatch,
    #[msg("Encrypted value is not granted to this account")]
    PermissionDenied,
}
