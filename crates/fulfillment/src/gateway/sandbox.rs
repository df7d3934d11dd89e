//! In-process stand-in for a gateway's HTTP API.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use domain::Money;

use super::{GatewayError, IntentMetadata};

#[derive(Debug, Clone)]
struct RecordedIntent {
    amount: Money,
    currency: String,
    metadata: IntentMetadata,
}

#[derive(Debug, Default)]
struct SandboxState {
    intents: HashMap<String, RecordedIntent>,
    refunds: HashMap<String, String>,
    next_id: u32,
    fail_on_intent: bool,
    fail_on_refund: bool,
}

/// Records intents and refunds the way a provider would, with switches to
/// make either call fail.
#[derive(Debug, Clone)]
pub struct SandboxBackend {
    intent_prefix: &'static str,
    refund_prefix: &'static str,
    state: Arc<RwLock<SandboxState>>,
}

impl SandboxBackend {
    /// Creates a backend issuing ids like `{intent_prefix}000001`.
    pub fn new(intent_prefix: &'static str, refund_prefix: &'static str) -> Self {
        Self {
            intent_prefix,
            refund_prefix,
            state: Arc::default(),
        }
    }

    /// Configures intent creation to fail.
    pub fn set_fail_on_intent(&self, fail: bool) {
        self.state.write().unwrap().fail_on_intent = fail;
    }

    /// Configures refunds to fail.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of intents created.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns true if a refund was issued for the transaction.
    pub fn has_refund_for(&self, gateway_transaction_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .refunds
            .values()
            .any(|t| t == gateway_transaction_id)
    }

    /// Returns the amount, currency and metadata recorded for an intent.
    pub fn intent(&self, gateway_transaction_id: &str) -> Option<(Money, String, IntentMetadata)> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(gateway_transaction_id)
            .map(|i| (i.amount, i.currency.clone(), i.metadata))
    }

    pub(super) fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_intent {
            return Err(GatewayError::Declined("Card declined".to_string()));
        }
        if !amount.is_positive() {
            return Err(GatewayError::Declined(format!("Invalid amount {amount}")));
        }

        state.next_id += 1;
        let id = format!("{}{:06}", self.intent_prefix, state.next_id);
        state.intents.insert(
            id.clone(),
            RecordedIntent {
                amount,
                currency: currency.to_string(),
                metadata,
            },
        );
        Ok(id)
    }

    pub(super) fn create_refund(
        &self,
        gateway_transaction_id: &str,
        amount: Money,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(GatewayError::Unavailable("Refund service down".to_string()));
        }
        let Some(intent) = state.intents.get(gateway_transaction_id) else {
            return Err(GatewayError::Declined(format!(
                "No such payment: {gateway_transaction_id}"
            )));
        };
        if amount > intent.amount {
            return Err(GatewayError::Declined(format!(
                "Refund {amount} exceeds captured {}",
                intent.amount
            )));
        }
        if state.refunds.values().any(|t| t == gateway_transaction_id) {
            return Err(GatewayError::Declined(format!(
                "Payment {gateway_transaction_id} already refunded"
            )));
        }

        state.next_id += 1;
        let refund_id = format!("{}{:06}", self.refund_prefix, state.next_id);
        state
            .refunds
            .insert(refund_id.clone(), gateway_transaction_id.to_string());
        Ok(refund_id)
    }
}
