//! Sequential outreach pipeline.
//!
//! One contact at a time: publish a `processing` placeholder, run the research
//! call, then replace the placeholder with the terminal result. A stop request
//! is honoured before the next contact starts; a quota failure ends the batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::ai::ResearchProvider;
use crate::contacts::{derive_identity, Identity};
use crate::extract::{extract_company_name, extract_drafted_email, is_quota_error, normalize_error};
use crate::models::{Contact, OutreachResult, Profile, RunOutcome, Status};
use crate::prompts::outreach_prompt;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No contacts to process. Provide a CSV or list with at least one email address.")]
    NoContacts,

    #[error("Profile is incomplete: a name and resume text are required. See 'coffeechat profile'.")]
    IncompleteProfile,
}

/// Cooperative stop signal shared between the pipeline and whoever drives it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receives every published result along with its position in the run.
pub trait PipelineObserver {
    fn on_publish(&mut self, position: usize, result: &OutreachResult);
}

impl<F: FnMut(usize, &OutreachResult)> PipelineObserver for F {
    fn on_publish(&mut self, position: usize, result: &OutreachResult) {
        (*self)(position, result)
    }
}

/// The running results sequence. Entries are appended as contacts start and
/// replaced by email when they finish.
#[derive(Debug, Default)]
pub struct ResultBoard {
    results: Vec<OutreachResult>,
}

impl ResultBoard {
    fn begin(&mut self, result: OutreachResult) -> usize {
        self.results.push(result);
        self.results.len() - 1
    }

    /// Replace the in-flight entry for this email. Addresses may repeat in a
    /// batch, but only one entry is ever `processing`.
    fn publish(&mut self, result: OutreachResult) -> Option<usize> {
        let position = self
            .results
            .iter()
            .position(|r| r.email == result.email && r.status == Status::Processing)?;
        self.results[position] = result;
        Some(position)
    }

    fn into_results(self) -> Vec<OutreachResult> {
        self.results
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub results: Vec<OutreachResult>,
    /// The contact whose call hit the quota, if any.
    pub interrupted: Option<Contact>,
    /// Contacts that were never started.
    pub remaining: Vec<Contact>,
}

impl RunReport {
    /// Contacts worth queueing for a later resume.
    pub fn resumable(&self) -> Vec<Contact> {
        self.interrupted
            .iter()
            .chain(self.remaining.iter())
            .cloned()
            .collect()
    }
}

pub struct Pipeline<'a> {
    provider: &'a dyn ResearchProvider,
    stop: StopFlag,
}

impl<'a> Pipeline<'a> {
    /// Clears any stop left over from an earlier batch. Requests made after
    /// this point, even before `run` starts, are honoured.
    pub fn new(provider: &'a dyn ResearchProvider, stop: StopFlag) -> Self {
        stop.reset();
        Self { provider, stop }
    }

    pub fn run(
        &self,
        profile: &Profile,
        contacts: &[Contact],
        observer: &mut dyn PipelineObserver,
    ) -> Result<RunReport, PipelineError> {
        check_preconditions(profile, contacts)?;

        let mut board = ResultBoard::default();
        tracing::info!(
            contacts = contacts.len(),
            model = self.provider.model_name(),
            "starting outreach run"
        );

        for (idx, contact) in contacts.iter().enumerate() {
            if self.stop.is_requested() {
                tracing::info!(processed = idx, remaining = contacts.len() - idx, "stop requested");
                return Ok(RunReport {
                    outcome: RunOutcome::Cancelled,
                    results: board.into_results(),
                    interrupted: None,
                    remaining: contacts[idx..].to_vec(),
                });
            }

            let identity = derive_identity(&contact.email);
            let placeholder = OutreachResult::processing(&contact.email, &identity.domain);
            let position = board.begin(placeholder.clone());
            observer.on_publish(position, &placeholder);

            let result = research_contact(self.provider, profile, &contact.email, &identity);
            let quota_hit = result.error.as_deref().is_some_and(is_quota_error);

            if let Some(position) = board.publish(result.clone()) {
                observer.on_publish(position, &result);
            }

            if quota_hit {
                tracing::warn!(
                    email = %contact.email,
                    remaining = contacts.len() - idx - 1,
                    "quota exhausted, halting run"
                );
                return Ok(RunReport {
                    outcome: RunOutcome::QuotaExhausted,
                    results: board.into_results(),
                    interrupted: Some(contact.clone()),
                    remaining: contacts[idx + 1..].to_vec(),
                });
            }
        }

        tracing::info!(contacts = contacts.len(), "outreach run completed");
        Ok(RunReport {
            outcome: RunOutcome::Completed,
            results: board.into_results(),
            interrupted: None,
            remaining: Vec::new(),
        })
    }
}

/// A batch needs at least one contact and a profile with name and resume.
pub fn check_preconditions(profile: &Profile, contacts: &[Contact]) -> Result<(), PipelineError> {
    if contacts.is_empty() {
        return Err(PipelineError::NoContacts);
    }
    if !profile.is_ready() {
        return Err(PipelineError::IncompleteProfile);
    }
    Ok(())
}

/// Research one recipient and turn the reply (or failure) into a terminal result.
pub fn research_contact(
    provider: &dyn ResearchProvider,
    profile: &Profile,
    email: &str,
    identity: &Identity,
) -> OutreachResult {
    let prompt = outreach_prompt(identity, profile);

    match provider.research(&prompt) {
        Ok(research) => {
            let company_name = extract_company_name(&research.text, &identity.domain);
            let drafted_email = extract_drafted_email(&research.text);
            tracing::debug!(email, company = %company_name, "research completed");
            OutreachResult {
                email: email.to_string(),
                company_name,
                drafted_email,
                research: research.text,
                sources: research.sources,
                status: Status::Completed,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(email, error = %e, "research failed");
            OutreachResult::failed(email, &identity.domain, normalize_error(&e.to_string()))
        }
    }
}
