//! Interceptor Chain
//!
//! Commands are executed by passing them through an ordered list of stages.
//! Each stage may act before and after the rest of the chain, or answer
//! without calling it.
//!
//! ## Stages
//! - **Entry Wrapping**: locks the key, checks the entry out of the container
//!   and commits it back once the rest of the chain succeeded.
//! - **Distribution**: forwards writes to the primary owner; on the primary,
//!   replicates performed writes to backup owners and invalidates L1 copies.
//! - **Call**: performs the command against the invocation context.

pub mod call;
pub mod distribution;
pub mod entry_wrapping;

pub use call::CallInterceptor;
pub use distribution::DistributionInterceptor;
pub use entry_wrapping::EntryWrappingInterceptor;

use std::sync::Arc;

use crate::commands::CommandResult;
use crate::context::InvocationContext;
use crate::error::{GridError, Result};
use crate::remoting::{BoxFuture, Invocation};

pub trait Interceptor: Send + Sync {
    fn visit<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<CommandResult>>;
}

/// The stages after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    pub fn invoke<'b>(
        self,
        ctx: &'b mut InvocationContext,
        invocation: &'b Invocation,
    ) -> BoxFuture<'b, Result<CommandResult>>
    where
        'a: 'b,
    {
        match self.rest.split_first() {
            Some((stage, rest)) => stage.visit(ctx, invocation, Next { rest }),
            None => Box::pin(async {
                Err(GridError::InvalidCommand(
                    "interceptor chain ended without a terminal stage".to_string(),
                ))
            }),
        }
    }
}

pub struct InterceptorChain {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(stages: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { stages }
    }

    pub async fn invoke(
        &self,
        ctx: &mut InvocationContext,
        invocation: &Invocation,
    ) -> Result<CommandResult> {
        Next {
            rest: &self.stages,
        }
        .invoke(ctx, invocation)
        .await
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests;
