//! Job and group descriptors, and the read-only registry over them.

use serde::Serialize;

/// One experiment that can be launched by the harness.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Short name used on the command line.
    pub selector: &'static str,
    /// Config file stem, resolved to `<config_dir>/<config_ref>.yaml`.
    pub config_ref: &'static str,
    /// Name used for the output directory and in reports.
    pub display_name: &'static str,
    pub description: &'static str,
}

impl JobDescriptor {
    #[must_use]
    pub const fn new(
        selector: &'static str,
        config_ref: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            selector,
            config_ref,
            display_name,
            description,
        }
    }

    /// File name of the external config, e.g. `arch_osnet.yaml`.
    #[must_use]
    pub fn config_file_name(&self) -> String {
        format!("{}.yaml", self.config_ref)
    }
}

/// A named, ordered list of job selectors.
///
/// Membership is flat: members are always job selectors, never other groups.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub members: &'static [&'static str],
}

impl GroupDescriptor {
    #[must_use]
    pub const fn new(
        name: &'static str,
        description: &'static str,
        members: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            description,
            members,
        }
    }
}

/// Immutable lookup over a job table and a group table.
#[derive(Clone, Copy, Debug)]
pub struct Registry {
    jobs: &'static [JobDescriptor],
    groups: &'static [GroupDescriptor],
}

impl Registry {
    #[must_use]
    pub const fn new(
        jobs: &'static [JobDescriptor],
        groups: &'static [GroupDescriptor],
    ) -> Self {
        Self { jobs, groups }
    }

    /// The experiment tables compiled into the harness.
    #[must_use]
    pub const fn builtin() -> Self {
        Self::new(crate::JOBS, crate::GROUPS)
    }

    #[must_use]
    pub fn lookup(&self, selector: &str) -> Option<&'static JobDescriptor> {
        self.jobs.iter().find(|job| job.selector == selector)
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&'static GroupDescriptor> {
        self.groups.iter().find(|group| group.name == name)
    }

    #[must_use]
    pub fn jobs(&self) -> &'static [JobDescriptor] {
        self.jobs
    }

    #[must_use]
    pub fn groups(&self) -> &'static [GroupDescriptor] {
        self.groups
    }

    /// Selectors of every job, in table order.
    pub fn selectors(&self) -> impl Iterator<Item = &'static str> {
        self.jobs.iter().map(|job| job.selector)
    }

    /// Check that the tables are internally consistent.
    ///
    /// Selectors and group names must be unique and every group member must
    /// name a registered job.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (i, job) in self.jobs.iter().enumerate() {
            if self.jobs[..i].iter().any(|j| j.selector == job.selector) {
                return Err(RegistryError::DuplicateSelector(job.selector));
            }
        }

        for (i, group) in self.groups.iter().enumerate() {
            if self.groups[..i].iter().any(|g| g.name == group.name) {
                return Err(RegistryError::DuplicateGroup(group.name));
            }
            if let Some(member) = group
                .members
                .iter()
                .copied()
                .find(|member| self.lookup(member).is_none())
            {
                return Err(RegistryError::UnknownMember {
                    group: group.name,
                    member,
                });
            }
        }

        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Inconsistencies in the job or group tables.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate job selector '{0}'")]
    DuplicateSelector(&'static str),
    #[error("duplicate group name '{0}'")]
    DuplicateGroup(&'static str),
    #[error("group '{group}' references unknown job '{member}'")]
    UnknownMember {
        group: &'static str,
        member: &'static str,
    },
}
