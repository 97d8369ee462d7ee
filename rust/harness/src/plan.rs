//! Selector resolution.
//!
//! Expands command-line selectors (job names, group names) into an ordered,
//! duplicate-free list of jobs.

use reid_config::{JobDescriptor, Registry};

/// Jobs to run, in execution order, plus tokens that matched nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub jobs: Vec<&'static JobDescriptor>,
    pub unresolved: Vec<String>,
}

impl ResolvedPlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Selectors of the planned jobs, in order.
    pub fn selectors(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.jobs.iter().map(|job| job.selector)
    }
}

/// Resolve selectors against `registry`.
///
/// Group names win over job selectors with the same name. Duplicates keep
/// their first position; unknown tokens are collected and skipped.
pub fn resolve<S: AsRef<str>>(registry: &Registry, selectors: &[S]) -> ResolvedPlan {
    let mut plan = ResolvedPlan::default();

    for token in selectors {
        let token = token.as_ref();

        if let Some(group) = registry.group(token) {
            tracing::debug!("Expanding group '{}': {:?}", group.name, group.members);
            for member in group.members {
                match registry.lookup(member) {
                    Some(job) => push_unique(&mut plan.jobs, job),
                    None => tracing::warn!(
                        "Group '{}' references unknown job '{}'",
                        group.name,
                        member
                    ),
                }
            }
        } else if let Some(job) = registry.lookup(token) {
            tracing::debug!("Adding experiment '{}'", job.selector);
            push_unique(&mut plan.jobs, job);
        } else if !plan.unresolved.iter().any(|u| u == token) {
            plan.unresolved.push(token.to_string());
        }
    }

    plan
}

fn push_unique(jobs: &mut Vec<&'static JobDescriptor>, job: &'static JobDescriptor) {
    if !jobs.iter().any(|j| j.selector == job.selector) {
        jobs.push(job);
    }
}
