//! Existence-check-then-create
//!
//! Every resource the bootstrap owns is created through [`ensure`]: probe first,
//! create only when the probe reports the resource absent. Re-running a stage whose
//! resources already exist therefore performs no mutation.

use std::future::Future;
use tracing::info;

use aksboot_utils::BootstrapError;

/// What [`ensure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned<T> {
    AlreadyExists(T),
    Created(T),
}

impl<T> Provisioned<T> {
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::AlreadyExists(v) | Self::Created(v) => v,
        }
    }

    #[must_use]
    pub fn get(&self) -> &T {
        match self {
            Self::AlreadyExists(v) | Self::Created(v) => v,
        }
    }
}

/// Make sure `resource` exists.
///
/// `probe` returns `Ok(Some(_))` when the resource is there, `Ok(None)` when the
/// provider reports it missing and `Err` for anything else. `create` runs only in the
/// missing case and its failure is returned unchanged.
pub async fn ensure<T, P, PF, C, CF>(
    resource: &str,
    probe: P,
    create: C,
) -> Result<Provisioned<T>, BootstrapError>
where
    P: FnOnce() -> PF,
    PF: Future<Output = Result<Option<T>, BootstrapError>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T, BootstrapError>>,
{
    if let Some(existing) = probe().await? {
        info!(resource = %resource, "already exists, skipping");
        return Ok(Provisioned::AlreadyExists(existing));
    }

    info!(resource = %resource, "not found, creating");
    let created = create().await?;
    info!(resource = %resource, "created");
    Ok(Provisioned::Created(created))
}
