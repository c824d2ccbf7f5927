//! The package manager capability consumed by package resources.

use log::debug;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::process::{Command, Output};

/// Blocking access to the system's package database and installer.
pub trait PackageManager {
    /// Returns whether the package named `name` is currently installed.
    fn is_installed(&self, name: &str) -> Result<bool, PackageError>;

    /// Installs the package named `name`. Only called for packages that are not installed.
    fn install(&self, name: &str) -> Result<(), PackageError>;
}

/// An error from the underlying package tooling.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// The package command could not be run at all.
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The package command ran and reported failure.
    #[error("`{command}` failed: {output}")]
    Failed { command: String, output: String },
}

/// A [PackageManager] backed by pacman.
///
/// The set of installed packages (including package groups) is queried once per run and cached;
/// installs update the cache. Installation can be routed through an elevation command such as
/// `sudo -n`, since package installation usually requires privileges the calling process lacks.
#[derive(Debug, Default)]
pub struct Pacman {
    elevate: Vec<String>,
    installed: RefCell<Option<HashSet<String>>>,
}

impl Pacman {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a [Pacman] that prefixes install invocations with `command`, e.g. `"sudo -n"`.
    pub fn elevated(command: &str) -> Self {
        // Try to use shlex to properly split the string. If that fails, naively split on
        // whitespace.
        let elevate = shlex::split(command)
            .unwrap_or_else(|| command.split_whitespace().map(str::to_string).collect());
        Pacman {
            elevate,
            installed: RefCell::new(None),
        }
    }

    /// Loads the installed set: explicitly installed packages plus package groups, since a
    /// declared name may refer to either.
    fn load_installed(&self) -> Result<HashSet<String>, PackageError> {
        let output = run(&["pacman".to_string(), "--query".to_string(), "--quiet".to_string()])?;
        let mut installed: HashSet<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();

        let output = run(&[
            "pacman".to_string(),
            "--query".to_string(),
            "--groups".to_string(),
        ])?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            // Each line is "<group> <package>".
            if let Some((group, _)) = line.split_once(' ') {
                installed.insert(group.to_string());
            }
        }

        Ok(installed)
    }
}

impl PackageManager for Pacman {
    fn is_installed(&self, name: &str) -> Result<bool, PackageError> {
        let mut cache = self.installed.borrow_mut();
        if cache.is_none() {
            *cache = Some(self.load_installed()?);
        }
        Ok(cache.as_ref().unwrap().contains(name))
    }

    fn install(&self, name: &str) -> Result<(), PackageError> {
        let mut argv = self.elevate.clone();
        argv.extend([
            "pacman".to_string(),
            "--sync".to_string(),
            "--noconfirm".to_string(),
            name.to_string(),
        ]);
        run(&argv)?;

        if let Some(installed) = self.installed.borrow_mut().as_mut() {
            installed.insert(name.to_string());
        }
        Ok(())
    }
}

/// Runs `argv`, returning its output on success and a [PackageError] otherwise.
fn run(argv: &[String]) -> Result<Output, PackageError> {
    let command = display(argv);
    debug!("running `{command}`");

    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .map_err(|source| PackageError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(PackageError::Failed {
            command,
            output: text.trim_end().to_string(),
        });
    }
    Ok(output)
}

fn display(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}
