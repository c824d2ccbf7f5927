//! Probe, diff, and apply logic for package resources.
//!
//! A package's actual state is binary: installed or not. The diff installs only when needed;
//! this module never uninstalls.

use super::{ActualState, ApplyError, Change, Delta, ProbeError};
use crate::system::Host;

pub(super) fn probe(name: &str, host: &Host) -> Result<ActualState, ProbeError> {
    let installed = host
        .packages
        .is_installed(name)
        .map_err(|source| ProbeError::Package {
            name: name.to_string(),
            source,
        })?;
    Ok(ActualState::Package { installed })
}

pub(super) fn diff(name: &str, actual: &ActualState) -> Delta {
    match actual {
        ActualState::Package { installed: true } => Delta::Unchanged,
        ActualState::Package { installed: false } => Delta::Create {
            change: Change::InstallPackage {
                name: name.to_string(),
            },
            summary: format!("install {name}"),
        },
        state => unreachable!("package diffed against {state:?}"),
    }
}

pub(super) fn install(name: &str, host: &Host) -> Result<(), ApplyError> {
    host.packages
        .install(name)
        .map_err(|source| ApplyError::Package {
            name: name.to_string(),
            source,
        })
}
