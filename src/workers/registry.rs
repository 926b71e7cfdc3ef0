use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::SyncError;
use crate::jobs::Job;

type Constructor<C> = Arc<dyn Fn(&C) -> Result<Box<dyn Job>, SyncError> + Send + Sync>;

/// A registered job type: a name, a priority tier and a way to build an instance for one run.
pub struct JobKind<C> {
    pub name: String,
    pub priority: u32,
    construct: Constructor<C>,
}

impl<C> Clone for JobKind<C> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), priority: self.priority, construct: self.construct.clone() }
    }
}

impl<C> fmt::Debug for JobKind<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobKind").field("name", &self.name).field("priority", &self.priority).finish()
    }
}

impl<C> JobKind<C> {
    pub fn instantiate(&self, ctx: &C) -> Result<Box<dyn Job>, SyncError> {
        (self.construct)(ctx)
    }
}

/// Collects job kinds in declaration order. [`build`](Self::build) rejects duplicate names.
pub struct RegistryBuilder<C> {
    kinds: Vec<JobKind<C>>,
}

impl<C> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self { kinds: Vec::new() }
    }
}

impl<C: 'static> RegistryBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, J>(mut self, name: impl Into<String>, priority: u32, construct: F) -> Self
    where
        F: Fn(&C) -> Result<J, SyncError> + Send + Sync + 'static,
        J: Job + 'static,
    {
        let construct: Constructor<C> = Arc::new(move |ctx: &C| construct(ctx).map(|job| Box::new(job) as Box<dyn Job>));
        self.kinds.push(JobKind { name: name.into(), priority, construct });
        self
    }

    pub fn build(self) -> Result<Registry<C>, SyncError> {
        let mut seen = HashSet::new();
        let mut tiers: BTreeMap<u32, Vec<JobKind<C>>> = BTreeMap::new();
        for kind in self.kinds {
            if !seen.insert(kind.name.clone()) {
                return Err(SyncError::Other(format!("job kind '{}' registered twice", kind.name).into()));
            }
            tiers.entry(kind.priority).or_default().push(kind);
        }
        Ok(Registry { tiers })
    }
}

/// Read-only `priority -> [JobKind]` table. Tiers iterate in ascending priority; kinds within
/// a tier keep their registration order.
pub struct Registry<C> {
    tiers: BTreeMap<u32, Vec<JobKind<C>>>,
}

impl<C> Registry<C> {
    pub fn tiers(&self) -> impl Iterator<Item = (u32, &[JobKind<C>])> {
        self.tiers.iter().map(|(priority, kinds)| (*priority, kinds.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tiers.values().flatten().map(|k| k.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChangeEntry;
    use async_trait::async_trait;

    struct Nop;

    #[async_trait]
    impl Job for Nop {
        fn check(&mut self, _: &[ChangeEntry]) -> Result<bool, SyncError> {
            Ok(false)
        }
        async fn start(&mut self) -> Result<(), SyncError> {
            Ok(())
        }
    }

    #[test]
    fn tiers_ascend_and_keep_order() {
        let registry = RegistryBuilder::<()>::new()
            .register("late", 3, |_: &()| Ok(Nop))
            .register("first", 0, |_: &()| Ok(Nop))
            .register("also_late", 3, |_: &()| Ok(Nop))
            .build()
            .unwrap();
        let tiers: Vec<(u32, Vec<&str>)> = registry.tiers().map(|(p, kinds)| (p, kinds.iter().map(|k| k.name.as_str()).collect())).collect();
        assert_eq!(tiers, vec![(0, vec!["first"]), (3, vec!["late", "also_late"])]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = RegistryBuilder::<()>::new().register("a", 0, |_: &()| Ok(Nop)).register("a", 1, |_: &()| Ok(Nop)).build();
        assert!(result.is_err());
    }
}
