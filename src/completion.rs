use std::sync::Arc;

use crate::{
    errors::CompletionError,
    types::{BoxFuture, Conversation, Message, Model},
};

/// Sends a transcript to a language model and returns one assistant reply.
///
/// Implementations must not retry internally; the orchestrator treats any
/// error as fatal for the invocation.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        model: &'a Model,
        conversation: &'a Conversation,
    ) -> BoxFuture<'a, Result<Message, CompletionError>>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for Arc<C> {
    fn complete<'a>(
        &'a self,
        model: &'a Model,
        conversation: &'a Conversation,
    ) -> BoxFuture<'a, Result<Message, CompletionError>> {
        (**self).complete(model, conversation)
    }
}

/// Adapt a synchronous function into a [`CompletionClient`].
///
/// ```ignore
/// let echo = sync_completion(|_model, convo| {
///     Ok(Message::assistant(format!("```sql\nSELECT {}\n```", convo.len())))
/// });
/// ```
pub fn sync_completion<F>(f: F) -> SyncCompletion<F>
where
    F: Fn(&Model, &Conversation) -> Result<Message, CompletionError> + Send + Sync,
{
    SyncCompletion(f)
}

/// See [`sync_completion`].
pub struct SyncCompletion<F>(F);

impl<F> CompletionClient for SyncCompletion<F>
where
    F: Fn(&Model, &Conversation) -> Result<Message, CompletionError> + Send + Sync,
{
    fn complete<'a>(
        &'a self,
        model: &'a Model,
        conversation: &'a Conversation,
    ) -> BoxFuture<'a, Result<Message, CompletionError>> {
        let result = (self.0)(model, conversation);
        Box::pin(async move { result })
    }
}
