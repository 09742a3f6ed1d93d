use std::sync::Arc;

use tracing::debug;

use crate::budget::{BudgetPermit, Budgets};
use crate::llm::{ChatMessage, CompletionClient, RequestError, TokenCounter, render_prompt};

/// A request that has cleared all three budgets and may be sent.
///
/// Holds the request and connection permits until the call completes.
pub struct Admission {
    messages: [ChatMessage; 2],
    n_tokens: usize,
    _request: BudgetPermit,
    _connection: BudgetPermit,
}

/// Issues completion requests under the shared token, request and connection budgets
pub struct RequestExecutor {
    client: Arc<dyn CompletionClient>,
    counter: Arc<dyn TokenCounter>,
    budgets: Budgets,
}

impl RequestExecutor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        counter: Arc<dyn TokenCounter>,
        budgets: Budgets,
    ) -> Self {
        Self {
            client,
            counter,
            budgets,
        }
    }

    /// Render the prompt and wait for admission: tokens, then a request, then a connection
    pub async fn admit(
        &self,
        system_message: &str,
        prompt_template: &str,
        chunk_text: &str,
    ) -> Result<Admission, RequestError> {
        let prompt = render_prompt(prompt_template, chunk_text)?;
        let n_tokens =
            self.counter.count_tokens(system_message) + self.counter.count_tokens(&prompt);

        let _tokens = self.budgets.tokens.acquire(n_tokens as u64).await?;
        let request = self.budgets.requests.acquire(1).await?;
        let connection = self.budgets.connections.acquire(1).await?;

        Ok(Admission {
            messages: [ChatMessage::system(system_message), ChatMessage::user(prompt)],
            n_tokens,
            _request: request,
            _connection: connection,
        })
    }

    /// Issue an admitted request; its permits are released when the call returns
    pub async fn send(&self, admission: Admission) -> Result<String, RequestError> {
        debug!("Sending request of {} prompt tokens", admission.n_tokens);
        let response = self.client.complete(&admission.messages).await;
        drop(admission);
        response
    }

    /// Admit and send in one step
    pub async fn complete(
        &self,
        system_message: &str,
        prompt_template: &str,
        chunk_text: &str,
    ) -> Result<String, RequestError> {
        let admission = self.admit(system_message, prompt_template, chunk_text).await?;
        self.send(admission).await
    }
}
