//! The cleanup-handler framework (spec §4.2, §9): a typed `Handler<I, O>`
//! composes into teardown -- each handler declares the output kind it tidies
//! up (mode `shared`, since many handlers may clean different slices of the
//! same kind) and is invoked once a parent of type `I` enters teardown. A
//! handler that returns `None` for its output kind opts out of being a
//! deleter and instead acts as a gating pre-check: the teardown controller
//! still waits for it, but it never itself writes the output kind, matching
//! spec's "a handler may opt out of any output, making it a gating
//! pre-check rather than a deleter."

use async_trait::async_trait;
use resource_store::{Result, TypeName};

use crate::controller::OutputDecl;

/// One step of a teardown sequence: given the input resource being torn
/// down, clean up (or gate on) its associated `O`.
#[async_trait]
pub trait Handler<I, O>: Send + Sync {
    /// The output kind this handler is responsible for, or `None` if it
    /// only gates (spec §4.2: "opt out of any output").
    fn output_kind(&self) -> Option<TypeName>;

    /// Runs the cleanup step. Returns `Ok(true)` once this handler's work is
    /// done and the caller's teardown may proceed past it, `Ok(false)` if
    /// cleanup is still in progress and the parent's finalizer must remain.
    async fn cleanup(&self, input: &I) -> Result<bool>;

    #[doc(hidden)]
    fn _marker(&self) -> std::marker::PhantomData<O> {
        std::marker::PhantomData
    }
}

/// Runs an ordered chain of [`Handler`]s over the same input, short-
/// circuiting (returning `false`) at the first one that is not yet done.
/// Declares the union of every member handler's output kind as `Shared`
/// for the caller to register with a [`crate::runtime::Runtime`].
pub struct Chain<I, O> {
    handlers: Vec<Box<dyn Handler<I, O>>>,
}

impl<I, O> Chain<I, O> {
    pub fn new(handlers: Vec<Box<dyn Handler<I, O>>>) -> Self {
        Self { handlers }
    }

    pub fn output_decls(&self) -> Vec<OutputDecl> {
        self.handlers
            .iter()
            .filter_map(Handler::output_kind)
            .map(OutputDecl::shared)
            .collect()
    }

    /// Runs every handler in order; stops at the first incomplete one so
    /// later handlers never observe a half-cleaned-up earlier stage.
    pub async fn run(&self, input: &I) -> Result<bool> {
        for handler in &self.handlers {
            if !handler.cleanup(input).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Gate {
        ran: Arc<AtomicUsize>,
        done: bool,
    }

    #[async_trait]
    impl Handler<u32, ()> for Gate {
        fn output_kind(&self) -> Option<TypeName> {
            None
        }

        async fn cleanup(&self, _input: &u32) -> Result<bool> {
            self.ran.fetch_add(1, Ordering::SeqCst);
            Ok(self.done)
        }
    }

    #[tokio::test]
    async fn short_circuits_on_first_incomplete_handler() {
        let first_ran = Arc::new(AtomicUsize::new(0));
        let second_ran = Arc::new(AtomicUsize::new(0));
        let chain: Chain<u32, ()> = Chain::new(vec![
            Box::new(Gate { ran: first_ran.clone(), done: false }),
            Box::new(Gate { ran: second_ran.clone(), done: true }),
        ]);

        let complete = chain.run(&1).await.unwrap();
        assert!(!complete);
        assert_eq!(first_ran.load(Ordering::SeqCst), 1);
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn runs_every_handler_when_all_complete() {
        let first_ran = Arc::new(AtomicUsize::new(0));
        let second_ran = Arc::new(AtomicUsize::new(0));
        let chain: Chain<u32, ()> = Chain::new(vec![
            Box::new(Gate { ran: first_ran.clone(), done: true }),
            Box::new(Gate { ran: second_ran.clone(), done: true }),
        ]);

        let complete = chain.run(&1).await.unwrap();
        assert!(complete);
        assert_eq!(first_ran.load(Ordering::SeqCst), 1);
        assert_eq!(second_ran.load(Ordering::SeqCst), 1);
    }
}
