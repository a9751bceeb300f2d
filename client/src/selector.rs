//! Picks the process-wide library server.
//!
//! The choice is a pure function of the configured [`Environment`]: exactly
//! `"production"` selects the REST backend, anything else the mock one. The
//! chosen backend must serve every [`Capability`] before it is handed out,
//! and [`init`] stores it once for the lifetime of the process.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use strum::Display;
use thiserror::Error;

use crate::server::{Capability, LibraryServer};

static SERVER: OnceCell<Arc<dyn LibraryServer>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub const PRODUCTION_MARKER: &'static str = "production";

    /// Case-sensitive, exact comparison against [`Self::PRODUCTION_MARKER`].
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(Self::PRODUCTION_MARKER) => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn variant(self) -> Variant {
        match self {
            Environment::Production => Variant::Rest,
            Environment::Development => Variant::Mock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    Mock,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{variant} backend does not implement required capabilities: {}", join_names(.missing))]
pub struct ContractViolation {
    pub variant: Variant,
    pub missing: Vec<Capability>,
}

fn join_names(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(Capability::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),

    #[error("library server has already been initialized")]
    AlreadyInitialized,
}

/// Fails with every capability `server` cannot serve.
pub fn verify(variant: Variant, server: &dyn LibraryServer) -> Result<(), ContractViolation> {
    let missing = server.capabilities().missing();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ContractViolation { variant, missing })
    }
}

/// Chooses between the two candidates and returns the chosen `Arc` itself.
pub fn select(
    environment: Environment,
    mock: Arc<dyn LibraryServer>,
    rest: Arc<dyn LibraryServer>,
) -> Result<Arc<dyn LibraryServer>, ContractViolation> {
    let variant = environment.variant();
    let server = match variant {
        Variant::Mock => mock,
        Variant::Rest => rest,
    };
    verify(variant, server.as_ref())?;
    tracing::info!(%variant, "Library server selected");
    Ok(server)
}

/// Runs [`select`] and stores the result as the process-wide server. Can only
/// succeed once; there is no way to reselect afterwards.
pub fn init(
    environment: Environment,
    mock: Arc<dyn LibraryServer>,
    rest: Arc<dyn LibraryServer>,
) -> Result<Arc<dyn LibraryServer>, SelectError> {
    if SERVER.get().is_some() {
        return Err(SelectError::AlreadyInitialized);
    }
    let server = select(environment, mock, rest)?;
    SERVER
        .set(server.clone())
        .map_err(|_| SelectError::AlreadyInitialized)?;
    Ok(server)
}

/// The server stored by [`init`], if it has run.
pub fn server() -> Option<Arc<dyn LibraryServer>> {
    SERVER.get().cloned()
}
