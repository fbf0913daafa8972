//! Packaging pipeline orchestration.
//!
//! A run resolves the identities of one component type, checks every
//! configured input up front, and then takes each identity through version
//! reservation, staging, and signing. Failures after the up-front checks are
//! confined to the identity that raised them and recorded in the
//! [`RunReport`].

use crate::component::resolver::materialize_manifests;
use crate::component::{ComponentDescriptor, ComponentIdentity, ComponentType, Resolver};
use crate::component_id::ComponentId;
use crate::config::{PackagerConfig, resolve_binary};
use crate::error::{PackagerError, Result};
use crate::packer::{ArchivePackager, CommandExecutor, SystemCommandExecutor, check_private_key};
use crate::registry::{DynamoDbStore, RegistryClient, VersionStore};
use crate::stager::Stager;
use crate::version::ComponentVersion;
use camino::Utf8PathBuf;
use log::{info, warn};
use std::panic;
use std::thread;

/// What happened to one identity.
#[derive(Debug)]
pub enum VariantOutcome {
    /// The archive was written.
    Packaged {
        /// Version written into the manifest.
        version: ComponentVersion,
        /// Archive location.
        archive: Utf8PathBuf,
    },
    /// The identity failed; other identities were unaffected.
    Failed {
        /// Why it failed.
        error: PackagerError,
    },
    /// The identity was not attempted because an earlier one failed in
    /// fail-fast mode.
    Skipped,
}

/// Outcome for one identity.
#[derive(Debug)]
pub struct IdentityReport {
    /// The identity.
    pub identity: ComponentIdentity,
    /// Its registry key.
    pub id: ComponentId,
    /// What happened.
    pub outcome: VariantOutcome,
}

/// Outcomes for every identity of a run, in resolution order.
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<IdentityReport>,
}

impl RunReport {
    /// Build a report from outcomes already in resolution order.
    #[must_use]
    pub const fn from_entries(entries: Vec<IdentityReport>) -> Self {
        Self { entries }
    }

    /// Per-identity outcomes.
    #[must_use]
    pub fn entries(&self) -> &[IdentityReport] {
        &self.entries
    }

    /// Whether any identity failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry.outcome, VariantOutcome::Failed { .. }))
    }

    /// Number of archives written.
    #[must_use]
    pub fn packaged_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, VariantOutcome::Packaged { .. }))
            .count()
    }
}

/// An identity together with the paths computed for it.
#[derive(Debug)]
struct Plan {
    descriptor: ComponentDescriptor,
    private_key: Utf8PathBuf,
    archive: Utf8PathBuf,
}

impl Plan {
    fn report(&self, outcome: VariantOutcome) -> IdentityReport {
        IdentityReport {
            identity: self.descriptor.identity.clone(),
            id: self.descriptor.id.clone(),
            outcome,
        }
    }
}

/// Runs packaging for a component type.
#[derive(Debug)]
pub struct Pipeline<S, E> {
    config: PackagerConfig,
    registry: RegistryClient<S>,
    executor: E,
}

impl<S, E> Pipeline<S, E>
where
    S: VersionStore + Sync,
    E: CommandExecutor,
{
    /// Create a pipeline.
    #[must_use]
    pub const fn new(config: PackagerConfig, registry: RegistryClient<S>, executor: E) -> Self {
        Self {
            config,
            registry,
            executor,
        }
    }

    /// The registry client.
    #[must_use]
    pub const fn registry(&self) -> &RegistryClient<S> {
        &self.registry
    }

    /// The command executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Package every identity of `component_type`.
    ///
    /// # Errors
    ///
    /// Returns an error, before any registry or filesystem writes, when
    /// resolution fails or the packager binary or a private key is missing.
    /// Also returns an error if the version table cannot be prepared.
    /// Failures of individual identities are reported in the [`RunReport`].
    pub fn run(&self, component_type: ComponentType) -> Result<RunReport> {
        let resolver = Resolver::new(
            self.config.source_root.clone(),
            self.config.build_root.clone(),
        );
        let stager = Stager::new(self.config.build_root.clone());
        let plans = self.plan(&resolver.resolve(component_type)?, &stager);
        let binary = self.preflight(&plans)?;
        let packager = ArchivePackager::new(&self.executor, binary);

        self.registry.ensure_table()?;
        let descriptors: Vec<ComponentDescriptor> =
            plans.iter().map(|plan| plan.descriptor.clone()).collect();
        materialize_manifests(&descriptors)?;

        info!("packaging {} identities of {component_type}", plans.len());
        let entries = if self.config.fail_fast {
            self.run_sequentially(&plans, &stager, &packager)
        } else {
            self.run_concurrently(&plans, &stager, &packager)
        };
        Ok(RunReport { entries })
    }

    fn plan(&self, descriptors: &[ComponentDescriptor], stager: &Stager) -> Vec<Plan> {
        descriptors
            .iter()
            .map(|descriptor| Plan {
                private_key: self.config.key_material.private_key_for(&descriptor.identity),
                archive: stager.archive_path(&descriptor.identity),
                descriptor: descriptor.clone(),
            })
            .collect()
    }

    /// Check configured inputs and return the resolved packager binary.
    fn preflight(&self, plans: &[Plan]) -> Result<Utf8PathBuf> {
        let binary = resolve_binary(&self.config.packager_binary)?;
        for plan in plans {
            check_private_key(&plan.private_key)?;
        }
        Ok(binary)
    }

    /// Reserve every version concurrently, then stage and pack in order.
    fn run_concurrently(
        &self,
        plans: &[Plan],
        stager: &Stager,
        packager: &ArchivePackager<&E>,
    ) -> Vec<IdentityReport> {
        let registry = &self.registry;
        let reservations: Vec<Result<ComponentVersion>> = thread::scope(|scope| {
            let handles: Vec<_> = plans
                .iter()
                .map(|plan| scope.spawn(move || registry.next_version(&plan.descriptor.id)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| panic::resume_unwind(payload))
                })
                .collect()
        });

        plans
            .iter()
            .zip(reservations)
            .map(|(plan, reservation)| {
                let outcome = match reservation {
                    Ok(version) => build(plan, version, stager, packager),
                    Err(error) => failed(plan, error),
                };
                plan.report(outcome)
            })
            .collect()
    }

    /// Take each identity through the whole pipeline, stopping at the first
    /// failure.
    fn run_sequentially(
        &self,
        plans: &[Plan],
        stager: &Stager,
        packager: &ArchivePackager<&E>,
    ) -> Vec<IdentityReport> {
        let mut entries = Vec::with_capacity(plans.len());
        let mut stopped = false;
        for plan in plans {
            if stopped {
                entries.push(plan.report(VariantOutcome::Skipped));
                continue;
            }
            let outcome = match self.registry.next_version(&plan.descriptor.id) {
                Ok(version) => build(plan, version, stager, packager),
                Err(error) => failed(plan, error),
            };
            stopped = matches!(outcome, VariantOutcome::Failed { .. });
            entries.push(plan.report(outcome));
        }
        entries
    }
}

/// Package `component_type` against the configured remote registry, signing
/// with the configured browser.
///
/// # Errors
///
/// Returns the configuration errors of [`Pipeline::run`], and
/// [`PackagerError::MissingCredentials`] when the registry cannot be
/// authenticated against.
pub fn package(config: PackagerConfig, component_type: ComponentType) -> Result<RunReport> {
    let store = config.registry.store()?;
    let registry = RegistryClient::new(store, config.registry.retry);
    let pipeline: Pipeline<DynamoDbStore, SystemCommandExecutor> =
        Pipeline::new(config, registry, SystemCommandExecutor);
    pipeline.run(component_type)
}

fn build<E: CommandExecutor>(
    plan: &Plan,
    version: ComponentVersion,
    stager: &Stager,
    packager: &ArchivePackager<E>,
) -> VariantOutcome {
    let packed = stager
        .stage(&plan.descriptor, &version)
        .and_then(|staged| packager.pack(&staged.dir, &plan.private_key, &plan.archive));
    match packed {
        Ok(archive) => {
            info!("{} {version} -> {}", plan.descriptor.identity, archive.path);
            VariantOutcome::Packaged {
                version,
                archive: archive.path,
            }
        }
        Err(error) => failed(plan, error),
    }
}

fn failed(plan: &Plan, error: PackagerError) -> VariantOutcome {
    warn!("{} failed: {error}", plan.descriptor.identity);
    VariantOutcome::Failed { error }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
