//! Recursive materialization of remote values.
//!
//! Remote objects arrive as opaque handles whose properties need one
//! round-trip each. The materializer walks that graph into a local tree,
//! bounded by a depth limit, by the set of handles on the current path and
//! by a per-event fetch budget.
//!
//! Cycle detection compares handle ids. V8 hands out a fresh `objectId` for
//! every `Runtime.getProperties` result, so a live self-reference usually
//! carries a new id on each level and is stopped by the depth limit and the
//! fetch budget rather than by the path check.

use std::collections::HashSet;

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;

use crate::{
    MaterializedValue, RemoteValueRef,
    config::MaterializerConfig,
    traits::{PropertyDescriptor, Session, TransportError},
};

/// Why a handle resolved to `Unresolvable`.
#[derive(Debug, Error)]
enum MaterializeFault {
    #[error("handle already being expanded on this path")]
    Cycle,
    #[error("depth limit {0} reached")]
    DepthExceeded(usize),
    #[error("fetch budget of {0} exhausted")]
    BudgetExhausted(usize),
    #[error("property fetch timed out")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// State shared by every argument of one event.
#[derive(Debug, Default)]
struct Walk {
    /// Handles currently being expanded.
    path: HashSet<String>,
    fetches: usize,
}

/// Converts remote value references into local values.
///
/// Never fails: any fault is contained to the handle that caused it,
/// which becomes `MaterializedValue::Unresolvable`.
#[derive(Debug, Clone, Default)]
pub struct ValueMaterializer {
    config: MaterializerConfig,
}

impl ValueMaterializer {
    /// Create a materializer with the given bounds.
    #[must_use]
    pub const fn new(config: MaterializerConfig) -> Self {
        Self { config }
    }

    /// The configured bounds.
    #[must_use]
    pub const fn config(&self) -> &MaterializerConfig {
        &self.config
    }

    /// Materialize a single value.
    pub async fn materialize<S>(&self, session: &S, value: RemoteValueRef) -> MaterializedValue
    where
        S: Session + ?Sized,
    {
        let mut walk = Walk::default();
        self.resolve(session, value, 0, &mut walk).await
    }

    /// Materialize event arguments sequentially, preserving their order.
    ///
    /// The fetch budget covers all arguments together.
    pub async fn materialize_all<S>(
        &self,
        session: &S,
        values: Vec<RemoteValueRef>,
    ) -> Vec<MaterializedValue>
    where
        S: Session + ?Sized,
    {
        let mut walk = Walk::default();
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(self.resolve(session, value, 0, &mut walk).await);
        }
        out
    }

    fn resolve<'a, S>(
        &'a self,
        session: &'a S,
        value: RemoteValueRef,
        depth: usize,
        walk: &'a mut Walk,
    ) -> BoxFuture<'a, MaterializedValue>
    where
        S: Session + ?Sized,
    {
        async move {
            match value {
                RemoteValueRef::Primitive(scalar) => scalar.into(),
                RemoteValueRef::Description(text) => MaterializedValue::String(text),
                RemoteValueRef::Undefined => MaterializedValue::Null,
                RemoteValueRef::ObjectHandle(id) => {
                    match self.expand(session, &id, depth, walk).await {
                        Ok(value) => value,
                        Err(fault) => {
                            tracing::debug!(object_id = %id, depth, "Unresolvable handle: {fault}");
                            MaterializedValue::Unresolvable
                        }
                    }
                }
            }
        }
        .boxed()
    }

    async fn expand<S>(
        &self,
        session: &S,
        id: &str,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<MaterializedValue, MaterializeFault>
    where
        S: Session + ?Sized,
    {
        if depth >= self.config.max_depth {
            return Err(MaterializeFault::DepthExceeded(self.config.max_depth));
        }
        if walk.path.contains(id) {
            return Err(MaterializeFault::Cycle);
        }
        if walk.fetches >= self.config.max_fetches {
            return Err(MaterializeFault::BudgetExhausted(self.config.max_fetches));
        }

        walk.fetches += 1;
        let properties = self.fetch(session, id).await?;

        walk.path.insert(id.to_string());
        let mut entries = Vec::with_capacity(properties.len());
        for PropertyDescriptor {
            name,
            enumerable,
            value,
        } in properties
        {
            // Accessors carry no value; non-enumerables are not own data.
            let Some(value) = value.filter(|_| enumerable) else {
                continue;
            };
            let resolved = self.resolve(session, value, depth + 1, walk).await;
            entries.push((name, resolved));
        }
        walk.path.remove(id);

        Ok(MaterializedValue::Mapping(entries))
    }

    async fn fetch<S>(
        &self,
        session: &S,
        id: &str,
    ) -> Result<Vec<PropertyDescriptor>, MaterializeFault>
    where
        S: Session + ?Sized,
    {
        tokio::time::timeout(self.config.fetch_timeout, session.get_own_properties(id))
            .await
            .map_err(|_| MaterializeFault::Timeout)?
            .map_err(MaterializeFault::from)
    }
}
