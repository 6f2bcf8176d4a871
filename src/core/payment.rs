use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{FunnelRules, Money};

/// Outbound "submit payment" signal handed to the payment collaborator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub amount: Money,
    pub fee: Money,
    pub total: Money,
}

impl PaymentSubmission {
    pub fn new(rules: &FunnelRules, amount: Money) -> Self {
        let fee = rules.fee_for(amount);
        Self {
            amount,
            fee,
            total: amount.saturating_add(fee),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum PaymentOutcome {
    Succeeded,
    Declined { reason: String },
}

pub trait PaymentGateway {
    fn submit(&mut self, submission: &PaymentSubmission) -> PaymentOutcome;
}

/// Gateway stand-in that accepts every submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubGateway;

impl PaymentGateway for StubGateway {
    fn submit(&mut self, submission: &PaymentSubmission) -> PaymentOutcome {
        info!(
            amount = %submission.amount,
            fee = %submission.fee,
            "payment submitted to stub gateway"
        );
        PaymentOutcome::Succeeded
    }
}

/// The one file an investor attaches as proof of a bank transfer. Only presence and name matter.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub name: String,
}

impl AttachedFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Receives the submitted transfer confirmation.
pub trait UploadSink {
    fn confirmation_submitted(&mut self, file: &AttachedFile);
}

#[derive(Debug, Default, Clone)]
pub struct LoggingUploadSink {
    pub submitted: Vec<String>,
}

impl UploadSink for LoggingUploadSink {
    fn confirmation_submitted(&mut self, file: &AttachedFile) {
        info!(file = %file.name, "transfer confirmation submitted");
        self.submitted.push(file.name.clone());
    }
}
