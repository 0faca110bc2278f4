use anchor_lang::prelude::*;
use entropy_oracle::EntropyRequest;

use crate::sealed::{Granted, InputProof, SealedValue};
use crate::ErrorCode;

/// Operand lifecycle of a comparator. `Ready` is terminal.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum Lifecycle {
    Empty,
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Operands are being stored.
    Initialize,
    /// Any operation that reads the operands.
    Use,
}

impl Lifecycle {
    pub fn on(self, event: LifecycleEvent) -> Result<Self> {
        match (self, event) {
            (Lifecycle::Empty, LifecycleEvent::Initialize) => Ok(Lifecycle::Ready),
            (Lifecycle::Empty, LifecycleEvent::Use) => err!(ErrorCode::NotInitialized),
            (Lifecycle::Ready, LifecycleEvent::Initialize) => err!(ErrorCode::AlreadyInitialized),
            (Lifecycle::Ready, LifecycleEvent::Use) => Ok(Lifecycle::Ready),
        }
    }
}

/// Per-identifier entropy request lifecycle. `Consumed` is terminal.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum RequestStatus {
    Pending,
    Consumed,
}

impl RequestStatus {
    pub fn consume(self) -> Result<Self> {
        match self {
            RequestStatus::Pending => Ok(RequestStatus::Consumed),
            RequestStatus::Consumed => err!(ErrorCode::InvalidRequestId),
        }
    }
}

pub fn ensure_fee(payment: u64, quoted_fee: u64) -> Result<()> {
    require_gte!(payment, quoted_fee, ErrorCode::InsufficientFee);
    Ok(())
}

/// The oracle must hand back the id the local record PDA was derived from.
pub fn ensure_issued_id(returned: u64, expected: u64) -> Result<()> {
    require_eq!(returned, expected, ErrorCode::RequestIdMismatch);
    Ok(())
}

#[account]
#[derive(InitSpace, Debug)]
pub struct Comparator {
    pub authority: Pubkey,
    /// Oracle config account this comparator buys entropy from. Never the default key.
    pub entropy_oracle: Pubkey,
    pub lifecycle: Lifecycle,
    pub initializer: Pubkey,
    pub value1: SealedValue,
    pub value2: SealedValue,
    pub requests_issued: u64,
    pub bump: u8,
}

impl Comparator {
    pub fn open(&mut self, authority: Pubkey, entropy_oracle: Pubkey, bump: u8) -> Result<()> {
        require_keys_neq!(
            entropy_oracle,
            Pubkey::default(),
            ErrorCode::ZeroOracleAddress
        );
        self.authority = authority;
        self.entropy_oracle = entropy_oracle;
        self.lifecycle = Lifecycle::Empty;
        self.initializer = Pubkey::default();
        self.value1 = SealedValue::default();
        self.value2 = SealedValue::default();
        self.requests_issued = 0;
        self.bump = bump;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    pub fn ensure_ready(&self) -> Result<()> {
        self.lifecycle.on(LifecycleEvent::Use)?;
        Ok(())
    }

    /// Stores both operands at once, granted to `holder` (the comparator account).
    /// The lifecycle check runs before the proofs so a second call always fails
    /// with `AlreadyInitialized`.
    pub fn store_operands(
        &mut self,
        holder: Pubkey,
        initializer: Pubkey,
        (encrypted_a, proof_a): ([u8; 32], &InputProof),
        (encrypted_b, proof_b): ([u8; 32], &InputProof),
    ) -> Result<()> {
        let next = self.lifecycle.on(LifecycleEvent::Initialize)?;
        let value1 = SealedValue::import(encrypted_a, proof_a, holder)?;
        let value2 = SealedValue::import(encrypted_b, proof_b, holder)?;

        self.value1 = value1;
        self.value2 = value2;
        self.initializer = initializer;
        self.lifecycle = next;
        Ok(())
    }

    pub fn operands(&self, holder: &Pubkey) -> Result<(Granted<'_>, Granted<'_>)> {
        self.ensure_ready()?;
        Ok((self.value1.grant_for(holder)?, self.value2.grant_for(holder)?))
    }

    pub fn record_request(&mut self) {
        self.requests_issued = self.requests_issued.saturating_add(1);
    }

    /// Runs every guard of an entropy-mixed comparison without touching storage.
    ///
    /// Returns the record already moved to `Consumed` and the oracle entropy
    /// with its grant checked for `holder`. The caller persists the record only
    /// if it goes on to queue the computation.
    pub fn admit_entropy_request(
        &self,
        holder: &Pubkey,
        record: Option<RequestRecord>,
        oracle_request: Option<&EntropyRequest>,
    ) -> Result<(RequestRecord, SealedValue)> {
        self.ensure_ready()?;

        let mut record = record
            .filter(|record| record.comparator == *holder)
            .ok_or_else(|| error!(ErrorCode::InvalidRequestId))?;
        record.consume()?;

        let oracle_request = oracle_request
            .filter(|request| {
                request.id == record.request_id && request.oracle_config == self.entropy_oracle
            })
            .ok_or_else(|| error!(ErrorCode::InvalidRequestId))?;

        let entropy = SealedValue::from_entropy_request(oracle_request)?;
        entropy.grant_for(holder)?;
        Ok((record, entropy))
    }
}

#[account]
#[derive(InitSpace, Debug, PartialEq, Eq)]
pub struct RequestRecord {
    pub comparator: Pubkey,
    pub request_id: u64,
    pub tag: [u8; 32],
    pub requester: Pubkey,
    pub fee_paid: u64,
    pub status: RequestStatus,
    pub bump: u8,
}

impl RequestRecord {
    pub fn issue(
        comparator: Pubkey,
        request_id: u64,
        tag: [u8; 32],
        requester: Pubkey,
        fee_paid: u64,
        bump: u8,
    ) -> Self {
        Self {
            comparator,
            request_id,
            tag,
            requester,
            fee_paid,
            status: RequestStatus::Pending,
            bump,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn consume(&mut self) -> Result<()> {
        self.status = self.status.consume()?;
        Ok(())
    }

    /// Overwrites an existing record account's data with this record.
    pub fn write_to(&self, mut data: &mut [u8]) -> Result<()> {
        self.try_serialize(&mut data)
    }
}

/// Decodes a request record, treating absent or foreign accounts as unknown ids.
pub fn decode_record(owner: &Pubkey, data: &[u8]) -> Result<Option<RequestRecord>> {
    if owner != &crate::ID || data.is_empty() {
        return Ok(None);
    }
    RequestRecord::try_deserialize(&mut &data[..]).map(Some)
}

pub fn lookup_record(owner: &Pubkey, data: &[u8]) -> Result<RequestRecord> {
    decode_record(owner, data)?.ok_or_else(|| error!(ErrorCode::InvalidRequestId))
}

pub fn decode_oracle_request(owner: &Pubkey, data: &[u8]) -> Result<Option<EntropyRequest>> {
    if owner != &entropy_oracle::ID || data.is_empty() {
        return Ok(None);
    }
    EntropyRequest::try_deserialize(&mut &data[..]).map(Some)
}
