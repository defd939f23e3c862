//! Governance proposals and voting
//!
//! Proposals live in memory and are rebuilt from stored blocks at startup.
//! Voting is one address, one vote; tallies close against block height.

use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::transaction::{GovernanceProposalTx, GovernanceVoteTx, VoteOption};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProposalStatus {
    Pending,
    Active,
    Passed,
    Failed,
    Executed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VoteTally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer: Address,
    pub title: String,
    pub description: String,
    pub start_block: u64,
    pub end_block: u64,
    pub status: ProposalStatus,
    pub votes: VoteTally,
}

#[derive(Default)]
pub struct GovernanceModule {
    proposals: HashMap<String, Proposal>,
    voters: HashMap<String, HashSet<Address>>,
}

impl GovernanceModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Active proposal from a submission. The id is a content
    /// hash of proposer, title, and submission time, so every node applying
    /// the same transaction derives the same id.
    pub fn submit_proposal(&mut self, tx: &GovernanceProposalTx, current_height: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tx.from);
        hasher.update(tx.title.as_bytes());
        hasher.update(tx.timestamp.to_le_bytes());
        let id = hex::encode(hasher.finalize());

        let proposal = Proposal {
            id: id.clone(),
            proposer: tx.from,
            title: tx.title.clone(),
            description: tx.description.clone(),
            start_block: current_height,
            end_block: tx.end_block,
            status: ProposalStatus::Active,
            votes: VoteTally::default(),
        };
        self.proposals.insert(id.clone(), proposal);
        id
    }

    /// Records a vote. Rejected when the proposal is missing or no longer
    /// Active, or when the voter already voted on it.
    pub fn cast_vote(&mut self, tx: &GovernanceVoteTx) -> Result<()> {
        let proposal = self
            .proposals
            .get_mut(&tx.proposal_id)
            .ok_or_else(|| ChainError::ProposalNotFound(tx.proposal_id.clone()))?;

        if proposal.status != ProposalStatus::Active {
            return Err(ChainError::InvalidTransaction(format!(
                "Proposal {} is not open for voting",
                tx.proposal_id
            )));
        }

        let voters = self.voters.entry(tx.proposal_id.clone()).or_default();
        if !voters.insert(tx.from) {
            return Err(ChainError::InvalidTransaction(format!(
                "Address {} already voted on proposal {}",
                hex::encode(tx.from),
                tx.proposal_id
            )));
        }

        match tx.option {
            VoteOption::Yes => proposal.votes.yes += 1,
            VoteOption::No => proposal.votes.no += 1,
            VoteOption::Abstain => proposal.votes.abstain += 1,
        }
        Ok(())
    }

    /// Closes every Active proposal whose voting window ended before
    /// `current_height`. Runs once per accepted block, before that block's
    /// transactions apply, so a vote can never land in the same height that
    /// tallies it.
    pub fn tally_votes(&mut self, current_height: u64) {
        for proposal in self.proposals.values_mut() {
            if proposal.status == ProposalStatus::Active && proposal.end_block < current_height {
                proposal.status = if proposal.votes.yes > proposal.votes.no {
                    ProposalStatus::Passed
                } else {
                    ProposalStatus::Failed
                };
            }
        }
    }

    pub fn get_proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        let mut all: Vec<Proposal> = self.proposals.values().cloned().collect();
        all.sort_by_key(|p| p.start_block);
        all
    }
}
